//! Driver do HPET (High Precision Event Timer).
//!
//! Usamos apenas o contador principal como relógio monotônico. O período
//! do clock vem dos bits 32-63 do registrador de capacidades (em
//! femtossegundos por tick).

use core::ptr::NonNull;

use volatile::VolatilePtr;

use crate::arch::x86_64::acpi::hpet::HpetTable;
use crate::mm::addr::phys_to_virt;
use crate::mm::vmm::{kernel_space, PtFlags};

// Offsets dos registradores
const REG_CAPABILITIES: u64 = 0x00;
const REG_CONFIGURATION: u64 = 0x10;
const REG_MAIN_COUNTER: u64 = 0xF0;

pub struct Hpet {
    base: u64,
    /// Femtossegundos por tick do contador.
    period_fs: u32,
    /// Valor do contador no init (origem do uptime).
    boot_counter: u64,
}

static HPET: spin::Once<Hpet> = spin::Once::new();

impl Hpet {
    fn reg(&self, offset: u64) -> VolatilePtr<'_, u64> {
        // SAFETY: base MMIO mapeada no init; offset dentro do bloco.
        unsafe {
            VolatilePtr::new(NonNull::new_unchecked(phys_to_virt::<u64>(
                self.base + offset,
            )))
        }
    }

    /// Valor cru do contador principal.
    pub fn counter(&self) -> u64 {
        self.reg(REG_MAIN_COUNTER).read()
    }

    /// Nanossegundos desde o init do HPET.
    pub fn uptime_ns(&self) -> u64 {
        let ticks = self.counter().saturating_sub(self.boot_counter);
        // fs → ns
        ticks.saturating_mul(self.period_fs as u64) / 1_000_000
    }

    /// Espera ocupada por `microseconds`.
    pub fn sleep_us(&self, microseconds: u64) {
        // µs → ticks: us * 1e9 fs / period
        let ticks = microseconds.saturating_mul(1_000_000_000) / self.period_fs as u64;
        let target = self.counter() + ticks;
        while self.counter() < target {
            crate::arch::Cpu::relax();
        }
    }
}

/// Inicializa o HPET a partir da tabela ACPI.
pub fn init(table: *const HpetTable) {
    // SAFETY: tabela validada pelo caminho ACPI.
    let address = unsafe { (*table).address.address };
    if address == 0 {
        crate::kwarn!("(HPET) Tabela sem endereco de registradores");
        return;
    }

    // Registradores MMIO: RW, cache desabilitado
    kernel_space().remap(address, address, PtFlags::RW | PtFlags::PCD);

    let hpet = HPET.call_once(|| {
        let hpet = Hpet {
            base: address,
            period_fs: 0,
            boot_counter: 0,
        };
        let period_fs = (hpet.reg(REG_CAPABILITIES).read() >> 32) as u32;

        // Parar, zerar e habilitar o contador
        hpet.reg(REG_CONFIGURATION).write(0);
        hpet.reg(REG_MAIN_COUNTER).write(0);
        hpet.reg(REG_CONFIGURATION).write(1);

        Hpet {
            base: address,
            period_fs,
            boot_counter: 0,
        }
    });

    crate::kinfo!("(HPET) Relogio habilitado, base=", address);
    crate::kinfo!("(HPET) Periodo (fs)=", hpet.period_fs as u64);
}

/// Handle para o HPET (None antes do init).
pub fn get() -> Option<&'static Hpet> {
    HPET.get()
}

/// Nanossegundos desde o boot (0 sem HPET).
pub fn uptime_ns() -> u64 {
    match HPET.get() {
        Some(hpet) => hpet.uptime_ns(),
        None => 0,
    }
}
