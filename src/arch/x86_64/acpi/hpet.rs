//! Tabela ACPI do HPET (High Precision Event Timer).

use super::SdtHeader;

/// Generic Address Structure (ACPI).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct Gas {
    pub address_space_id: u8,
    pub register_bit_width: u8,
    pub register_bit_offset: u8,
    pub reserved: u8,
    pub address: u64,
}

/// Tabela "HPET".
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct HpetTable {
    pub header: SdtHeader,
    pub hardware_rev_id: u8,
    /// Bits 0-4: comparadores; bit 5: counter de 64 bits; bit 7: legacy replacement.
    pub info: u8,
    pub pci_vendor_id: u16,
    pub address: Gas,
    pub hpet_number: u8,
    pub minimum_tick: u16,
    pub page_protection: u8,
}
