//! Driver do I/O APIC: redirecionamento de IRQs legadas para vetores.
//!
//! O acesso é indireto: escreve-se o índice do registrador em `base + 0x00`
//! e lê/escreve-se o dado em `base + 0x10`. Cada entrada de redirecionamento
//! ocupa um par de registradores de 32 bits a partir do índice 0x10.

use crate::arch::x86_64::acpi::madt::MadtInfo;
use crate::arch::x86_64::cpu::Cpu;
use crate::mm::addr::phys_to_virt;

/// Registrador de versão (bits 16-23 = máxima entrada de redirecionamento).
const IOAPIC_REG_VERSION: u32 = 0x01;

/// Primeiro registrador da tabela de redirecionamento.
const IOAPIC_REG_REDIRECT_BASE: u32 = 0x10;

/// Base dos vetores de IRQ na IDT.
const IRQ_VECTOR_BASE: u8 = 0x20;

fn io_read(base: u64, register: u32) -> u32 {
    Cpu::memory_fence();
    // SAFETY: base MMIO vinda da MADT.
    unsafe {
        core::ptr::write_volatile(phys_to_virt::<u32>(base) as *mut u32, register);
        Cpu::memory_fence();
        let value = core::ptr::read_volatile(phys_to_virt::<u32>(base + 16));
        Cpu::memory_fence();
        value
    }
}

fn io_write(base: u64, register: u32, value: u32) {
    Cpu::memory_fence();
    // SAFETY: base MMIO vinda da MADT.
    unsafe {
        core::ptr::write_volatile(phys_to_virt::<u32>(base) as *mut u32, register);
        Cpu::memory_fence();
        core::ptr::write_volatile(phys_to_virt::<u32>(base + 16) as *mut u32, value);
        Cpu::memory_fence();
    }
}

/// Número de entradas de redirecionamento de um I/O APIC.
fn max_redirect(base: u64) -> u32 {
    ((io_read(base, IOAPIC_REG_VERSION) >> 16) & 0xFF) + 1
}

/// Escreve uma entrada de redirecionamento para um GSI.
///
/// `flags` vem do ISO da MADT (bit 1 = active low, bit 3 = level).
/// `status == false` escreve a entrada mascarada (bit 16).
fn raw_redirect(madt: &MadtInfo, vector: u8, gsi: u32, flags: u16, apic_id: u32, status: bool) {
    // Achar o I/O APIC cuja janela de GSIs cobre este GSI
    let mut target = None;
    for ioapic in madt.ioapics.iter() {
        let base = ioapic.io_apic_address as u64;
        let gsi_base = ioapic.gsi_base;
        if gsi_base <= gsi && gsi < gsi_base + max_redirect(base) {
            target = Some((base, gsi_base));
            break;
        }
    }

    let Some((base, gsi_base)) = target else {
        crate::kerror!("(IOAPIC) Nenhum I/O APIC cobre o GSI=", gsi as u64);
        return;
    };

    let mut value: u64 = vector as u64;
    if flags & 2 != 0 {
        value |= 1 << 13; // polaridade: active low
    }
    if flags & 8 != 0 {
        value |= 1 << 15; // trigger: level
    }
    if !status {
        value |= 1 << 16; // mask
    }
    // Destino físico nos bits 56-63
    value |= (apic_id as u64) << 56;

    let register = IOAPIC_REG_REDIRECT_BASE + 2 * (gsi - gsi_base);
    io_write(base, register, value as u32);
    io_write(base, register + 1, (value >> 32) as u32);
}

/// Redireciona uma IRQ legada, aplicando overrides (ISO) da MADT.
pub fn redirect_irq(madt: &MadtInfo, apic_id: u32, irq: u8, status: bool) {
    for iso in madt.isos.iter() {
        if iso.irq_source == irq {
            crate::kdebug!("(IOAPIC) ISO: IRQ remapeada, gsi=", iso.gsi as u64);
            raw_redirect(
                madt,
                iso.irq_source + IRQ_VECTOR_BASE,
                iso.gsi,
                iso.flags,
                apic_id,
                status,
            );
            return;
        }
    }

    // Sem override: mapeamento 1:1
    raw_redirect(madt, irq + IRQ_VECTOR_BASE, irq as u32, 0, apic_id, status);
}

/// Redireciona as 16 IRQs legadas para o core `apic_id`.
pub fn redirect_irqs(madt: &MadtInfo, apic_id: u32) {
    crate::kdebug!("(IOAPIC) Redirecionando IRQs 0-15 para apic_id=", apic_id as u64);
    let mut irq = 0u8;
    while irq < 16 {
        redirect_irq(madt, apic_id, irq, true);
        irq += 1;
    }
}
