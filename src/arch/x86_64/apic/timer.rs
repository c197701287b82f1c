//! Timer do Local APIC, calibrado contra o PIT.
//!
//! Sequência de calibração: um one-shot de 10 ms no PIT (canal 2, gate na
//! porta 0x61) mede quantos ticks do timer do APIC cabem em 10 ms. Com
//! isso programamos o modo periódico com baseline de 1 ms no vetor 32 e
//! aposentamos o PIC legado (mascarado de vez).

use super::lapic::{LocalApic, APIC_LVT_TIMER, APIC_TCCR, APIC_TDCR, APIC_TICR};
use crate::arch::x86_64::ports::{inb, outb};

/// Vetor do timer (IRQ0 remapeada).
pub const TIMER_VECTOR: u8 = 0x20;

/// Frequência base do PIT em Hz.
const PIT_FREQUENCY: u32 = 1193180;

/// Ticks do APIC medidos em 10 ms (por core, mas a frequência é a mesma).
static TICKS_IN_10MS: core::sync::atomic::AtomicU32 = core::sync::atomic::AtomicU32::new(0);

/// Ticks por 10 ms medidos na calibração (0 = ainda não calibrado).
pub fn ticks_in_10ms() -> u32 {
    TICKS_IN_10MS.load(core::sync::atomic::Ordering::Relaxed)
}

/// Calibra o timer do APIC e o programa em modo periódico (1 ms).
///
/// Também mascara os PICs 8259 — a partir daqui só o APIC interrompe.
pub fn calibrate_and_start(lapic: &LocalApic) -> u32 {
    // Divide por 16
    lapic.write(APIC_TDCR, 0x3);

    // PIT canal 2, one-shot de 10 ms
    let duration_us: u32 = 10000;
    let ticks = PIT_FREQUENCY / (duration_us / 100);

    let gate = (inb(0x61) & 0xFD) | 1;
    outb(0x61, gate);
    outb(0x43, 0xB2); // canal 2, lobyte/hibyte, modo one-shot
    outb(0x40, (ticks & 0xFF) as u8);
    inb(0x60);
    outb(0x40, (ticks >> 8) as u8);

    // Contador do APIC no máximo
    lapic.write(APIC_TICR, 0xFFFF_FFFF);

    // Rearmar o gate do PIT e esperar o one-shot expirar
    let mut gate = inb(0x61) & 0xFC;
    outb(0x61, gate);
    gate |= 1;
    outb(0x61, gate);
    while (inb(0x61) & 0x20) == 0 {
        core::hint::spin_loop();
    }

    // Mascarar o timer enquanto lemos o resultado
    lapic.write(APIC_LVT_TIMER, 1 << 16);

    // Silenciar o PIT (canal 0 parado) e mascarar os PICs
    outb(0x43, 0x28);
    outb(0x40, 0x0);
    outb(0x21, 0xFF);
    outb(0xA1, 0xFF);

    let measured = 0xFFFF_FFFFu32 - lapic.read(APIC_TCCR);
    TICKS_IN_10MS.store(measured, core::sync::atomic::Ordering::Relaxed);

    // Periódico (bit 17), vetor 32, baseline de 1 ms
    lapic.write(APIC_LVT_TIMER, (1 << 17) | TIMER_VECTOR as u32);
    lapic.write(APIC_TDCR, 0x3);
    lapic.write(APIC_TICR, measured / 10);

    crate::kinfo!("(APIC) Timer calibrado, ticks em 10ms=", measured as u64);
    measured
}
