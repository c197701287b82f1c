//! Anvil Kernel Library.
//!
//! Ponto central de exportação dos módulos do Kernel.
//! Define a estrutura hierárquica do sistema operacional.

#![no_std]
#![feature(alloc_error_handler)]
#![feature(naked_functions)]

// Habilitar alocação dinâmica (necessário para Vec/Box/Arc)
extern crate alloc;

// --- Módulos de Baixo Nível (Hardware) ---
pub mod arch; // HAL (CPU, GDT, IDT, APIC, ACPI)
pub mod drivers; // Drivers Específicos (Serial)

// --- Módulos Centrais (Lógica do Kernel) ---
pub mod core; // Boot, Config, Interrupts, Crash, SMP, Symbols
pub mod klib; // Utilitários Internos (Bitmap, Align, Test Framework)
pub mod mm; // Gerenciamento de Memória (PMM, VMM, Stack Guard, Heap)
pub mod sync; // Primitivas de Sincronização (Spinlock)
pub mod sys; // Definições de Sistema (Errno, Tipos)

// --- Subsistemas Avançados ---
pub mod fs; // Tabela de File Descriptors
pub mod sched; // Tasking e Scheduler
pub mod syscall; // Interface com Userspace

pub mod panic;

// Re-exportar BootInfo para acesso fácil no binário
pub use crate::core::handoff::BootInfo;
