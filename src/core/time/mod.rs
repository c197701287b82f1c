//! Relógios do kernel.
//!
//! O HPET fornece o relógio monotônico usado para deadlines de sleep e
//! timestamps de diagnóstico. O timer do APIC (preempção) vive em
//! `arch::x86_64::apic::timer`.

pub mod hpet;

/// Nanossegundos desde o boot (0 enquanto o HPET não subiu).
pub fn uptime_ns() -> u64 {
    hpet::uptime_ns()
}

/// Milissegundos desde o boot.
pub fn uptime_ms() -> u64 {
    uptime_ns() / 1_000_000
}
