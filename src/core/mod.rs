//! Núcleo do kernel: boot, configuração, interrupções, crash e SMP.

pub mod config;
pub mod crash;
pub mod entry;
pub mod handoff;
pub mod interrupts;
pub mod logging;
pub mod smp;
pub mod symbols;
pub mod time;

#[cfg(feature = "self_test")]
pub mod test;
