//! # Hardware Abstraction Layer (HAL)
//!
//! Única ponte entre o kernel core (lógica agnóstica) e o hardware real.
//! Toda instrução privilegiada (cpuid, rdmsr/wrmsr, invlpg, in/out,
//! sti/cli, pause, hlt, rdtsc, barreiras) vive atrás deste módulo; o
//! resto do kernel é neutro de arquitetura.

// Seleção de Arquitetura: x86_64
#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "x86_64")]
pub use x86_64 as platform;

// Re-export global para o kernel usar: arch::Cpu::halt();
pub use platform::cpu::Cpu;
