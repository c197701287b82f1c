//! Parsing da Multiple APIC Description Table (MADT).
//!
//! A MADT descreve os controladores de interrupção da máquina: Local
//! APICs (um por core lógico), I/O APICs, Interrupt Source Overrides
//! (remapeamentos de IRQs ISA) e fontes de NMI.

use alloc::vec::Vec;

use super::SdtHeader;

/// Campos específicos da MADT após o cabeçalho SDT.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct MadtHeader {
    pub header: SdtHeader,
    /// Endereço físico base dos Local APICs.
    pub local_apic_address: u32,
    /// Bit 0 = PCAT_COMPAT (PICs 8259 presentes).
    pub flags: u32,
}

/// Cabeçalho genérico de cada registro variável.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct MadtEntryHeader {
    pub entry_type: u8,
    pub record_length: u8,
}

/// Tipo 0: Processor Local APIC.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct MadtLocalApic {
    pub header: MadtEntryHeader,
    pub acpi_processor_id: u8,
    pub apic_id: u8,
    /// Bit 0 = Processor Enabled, Bit 1 = Online Capable.
    pub flags: u32,
}

/// Tipo 1: I/O APIC.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct MadtIoApic {
    pub header: MadtEntryHeader,
    pub io_apic_id: u8,
    pub reserved: u8,
    pub io_apic_address: u32,
    pub gsi_base: u32,
}

/// Tipo 2: Interrupt Source Override (ISO).
/// Mapeia IRQs ISA (0 = timer, 1 = teclado, ...) para GSIs.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct MadtIso {
    pub header: MadtEntryHeader,
    pub bus_source: u8,
    pub irq_source: u8,
    pub gsi: u32,
    /// Bit 1 = active low, Bit 3 = level triggered.
    pub flags: u16,
}

/// Tipo 4: Local APIC NMI.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct MadtNmi {
    pub header: MadtEntryHeader,
    /// 0xFF = todos os processadores.
    pub acpi_processor_id: u8,
    pub flags: u16,
    /// Entrada LINT# (0 ou 1).
    pub lint: u8,
}

/// Conteúdo da MADT já decodificado.
pub struct MadtInfo {
    /// Endereço físico dos Local APICs (0 = ausente).
    pub local_apic_address: u64,
    pub lapics: Vec<MadtLocalApic>,
    pub ioapics: Vec<MadtIoApic>,
    pub isos: Vec<MadtIso>,
    pub nmis: Vec<MadtNmi>,
}

impl MadtInfo {
    /// Número de cores lógicos habilitados.
    pub fn cpu_count(&self) -> usize {
        self.lapics.iter().filter(|l| l.flags & 1 != 0).count()
    }
}

/// Decodifica a MADT a partir do cabeçalho SDT.
pub fn parse(header: *const SdtHeader) -> MadtInfo {
    let mut info = MadtInfo {
        local_apic_address: 0,
        lapics: Vec::new(),
        ioapics: Vec::new(),
        isos: Vec::new(),
        nmis: Vec::new(),
    };

    // SAFETY: o chamador validou assinatura e checksum da tabela.
    unsafe {
        let madt = header as *const MadtHeader;
        info.local_apic_address = (*madt).local_apic_address as u64;

        let total_len = (*header).length as usize;
        let mut offset = core::mem::size_of::<MadtHeader>();
        let base = header as *const u8;

        while offset + core::mem::size_of::<MadtEntryHeader>() <= total_len {
            let entry = base.add(offset) as *const MadtEntryHeader;
            let record_length = (*entry).record_length as usize;
            if record_length < 2 || offset + record_length > total_len {
                crate::kwarn!("(ACPI) Registro MADT truncado em offset=", offset as u64);
                break;
            }

            match (*entry).entry_type {
                0 => info
                    .lapics
                    .push(core::ptr::read_unaligned(entry as *const MadtLocalApic)),
                1 => info
                    .ioapics
                    .push(core::ptr::read_unaligned(entry as *const MadtIoApic)),
                2 => info
                    .isos
                    .push(core::ptr::read_unaligned(entry as *const MadtIso)),
                4 => info
                    .nmis
                    .push(core::ptr::read_unaligned(entry as *const MadtNmi)),
                _ => {}
            }

            offset += record_length;
        }
    }

    crate::kdebug!("(ACPI) MADT: cores=", info.cpu_count() as u64);
    crate::kdebug!("(ACPI) MADT: ioapics=", info.ioapics.len() as u64);
    crate::kdebug!("(ACPI) MADT: isos=", info.isos.len() as u64);
    info
}
