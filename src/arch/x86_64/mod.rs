//! Implementação x86_64 da HAL.
//!
//! | Módulo       | Responsabilidade |
//! |--------------|------------------|
//! | `cpu`        | CPUID, MSRs, interrupções, CR3, TSC, barreiras, SSE. |
//! | `gdt`        | Global Descriptor Table + TSS por core. |
//! | `idt`        | Interrupt Descriptor Table (256 vetores). |
//! | `interrupts` | Stubs assembly e TrapFrame; funil único de despacho. |
//! | `ports`      | IO Ports legado (`inb`/`outb`). |
//! | `apic`       | Local APIC, I/O APIC e timer do APIC. |
//! | `acpi`       | RSDP/RSDT/XSDT, MADT, HPET. |
//! | `syscall`    | MSRs SYSCALL/SYSRET e entrada assembly. |

pub mod acpi;
pub mod apic;
pub mod cpu;
pub mod gdt;
pub mod idt;
pub mod interrupts;
pub mod ports;
pub mod syscall;
