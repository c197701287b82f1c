//! Controladores de interrupção APIC (Local APIC, I/O APIC, timer).

pub mod ioapic;
pub mod lapic;
pub mod timer;

use crate::arch::x86_64::acpi::madt::MadtInfo;

/// MADT decodificada, compartilhada entre LAPIC/IOAPIC/SMP.
static MADT: spin::Once<MadtInfo> = spin::Once::new();

/// Publica a MADT decodificada (chamado uma vez no boot).
pub fn set_madt(info: MadtInfo) {
    MADT.call_once(|| info);
}

/// MADT decodificada, se o boot chegou a publicá-la.
pub fn madt() -> Option<&'static MadtInfo> {
    MADT.get()
}
