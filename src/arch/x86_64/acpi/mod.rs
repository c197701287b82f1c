//! ACPI: descoberta do RSDP e navegação RSDT/XSDT.
//!
//! O bootloader normalmente entrega o ponteiro do RSDP no BootInfo.
//! Quando não entrega, escaneamos a EBDA e a janela 0xE0000-0x100000
//! procurando a assinatura "RSD PTR ".

pub mod hpet;
pub mod madt;

use crate::mm::addr::phys_to_virt;

/// Root System Description Pointer (revisão 0; revisão 2 estende).
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct Rsdp {
    pub signature: [u8; 8], // "RSD PTR "
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub revision: u8,
    pub rsdt_address: u32,
    // Revisão >= 2:
    pub length: u32,
    pub xsdt_address: u64,
    pub extended_checksum: u8,
    pub reserved: [u8; 3],
}

/// Cabeçalho comum de toda System Description Table.
#[repr(C, packed)]
#[derive(Debug, Clone, Copy)]
pub struct SdtHeader {
    pub signature: [u8; 4],
    pub length: u32,
    pub revision: u8,
    pub checksum: u8,
    pub oem_id: [u8; 6],
    pub oem_table_id: [u8; 8],
    pub oem_revision: u32,
    pub creator_id: u32,
    pub creator_revision: u32,
}

/// Soma de verificação ACPI: todos os bytes da tabela somam 0 (mod 256).
fn checksum_ok(ptr: *const u8, length: usize) -> bool {
    let mut sum: u8 = 0;
    let mut i = 0;
    while i < length {
        sum = sum.wrapping_add(unsafe { core::ptr::read(ptr.add(i)) });
        i += 1;
    }
    sum == 0
}

/// Procura a assinatura "RSD PTR " em uma janela física.
unsafe fn scan_for_rsdp(start: u64, end: u64) -> Option<*const Rsdp> {
    let mut addr = start;
    while addr < end {
        let ptr = phys_to_virt::<u8>(addr);
        if core::slice::from_raw_parts(ptr, 8) == b"RSD PTR " {
            let rsdp = ptr as *const Rsdp;
            // Revisão 0 valida os primeiros 20 bytes
            if checksum_ok(ptr, 20) {
                crate::ktrace!("(ACPI) RSDP encontrado em=", addr);
                return Some(rsdp);
            }
        }
        addr += 16;
    }
    None
}

/// Localiza o RSDP: ponteiro do bootloader ou varredura manual
/// (EBDA via segmento em 0x40E, depois 0xE0000-0x100000).
pub fn find_rsdp(loader_rsdp: u64) -> Option<*const Rsdp> {
    if loader_rsdp != 0 {
        return Some(phys_to_virt::<Rsdp>(loader_rsdp) as *const Rsdp);
    }

    crate::kwarn!("(ACPI) RSDP nao fornecido pelo bootloader, procurando manualmente");

    unsafe {
        // Segmento da EBDA guardado pela BIOS em 0x40E (shift de 4)
        let ebda_base = (core::ptr::read(phys_to_virt::<u16>(0x40E)) as u64) << 4;
        if ebda_base != 0 {
            // Só o primeiro KiB da EBDA é garantido
            if let Some(rsdp) = scan_for_rsdp(ebda_base, ebda_base + 0x400) {
                return Some(rsdp);
            }
        }

        scan_for_rsdp(0xE0000, 0x100000)
    }
}

/// Itera o RSDT (ponteiros de 32 bits) ou XSDT (64 bits) procurando uma
/// tabela pela assinatura. Valida o checksum da tabela encontrada.
pub fn find_table(rsdp: *const Rsdp, signature: &[u8; 4]) -> Option<*const SdtHeader> {
    // SAFETY: o RSDP foi validado; as tabelas estão em memória ACPI mapeada.
    unsafe {
        let revision = (*rsdp).revision;
        let use_xsdt = revision >= 2 && (*rsdp).xsdt_address != 0;

        let (sdt_phys, entry_size) = if use_xsdt {
            ((*rsdp).xsdt_address, 8usize)
        } else {
            ((*rsdp).rsdt_address as u64, 4usize)
        };

        let sdt = phys_to_virt::<SdtHeader>(sdt_phys);
        let total_len = (*sdt).length as usize;
        if total_len < core::mem::size_of::<SdtHeader>() {
            crate::kerror!("(ACPI) RSDT/XSDT com tamanho invalido=", total_len as u64);
            return None;
        }
        let entries = (total_len - core::mem::size_of::<SdtHeader>()) / entry_size;
        let entries_base = (sdt as *const u8).add(core::mem::size_of::<SdtHeader>());

        let mut i = 0usize;
        while i < entries {
            let entry_phys = if use_xsdt {
                core::ptr::read_unaligned(entries_base.add(i * 8) as *const u64)
            } else {
                core::ptr::read_unaligned(entries_base.add(i * 4) as *const u32) as u64
            };

            let header = phys_to_virt::<SdtHeader>(entry_phys);
            let entry_signature = (*header).signature;
            if entry_signature == *signature {
                if !checksum_ok(header as *const u8, (*header).length as usize) {
                    crate::kwarn!("(ACPI) Tabela com checksum invalido, ignorando");
                    i += 1;
                    continue;
                }
                return Some(header);
            }
            i += 1;
        }
        None
    }
}
