//! Virtual Memory Manager: address spaces e page tables de 4 níveis.
//!
//! Cada `AddressSpace` possui uma PML4 própria. A metade de kernel
//! (entradas 256..512) é compartilhada entre todos os spaces: as
//! entradas da PML4 do kernel são copiadas cruas, apontando para as
//! mesmas tabelas. A metade de usuário é privada.
//!
//! Uma entrada é um `u64` cru com acessores tipados; a travessia usa a
//! janela física linear (`phys_to_virt`), nunca ponteiros entre spaces.

mod space;

pub use space::AddressSpace;

use bitflags::bitflags;

bitflags! {
    /// Flags de entrada de page table (x86_64).
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PtFlags: u64 {
        /// Present
        const P = 1 << 0;
        /// Read/Write
        const RW = 1 << 1;
        /// User/Supervisor
        const US = 1 << 2;
        /// Write-Through
        const PWT = 1 << 3;
        /// Cache Disable
        const PCD = 1 << 4;
        /// Accessed
        const A = 1 << 5;
        /// Dirty
        const D = 1 << 6;
        /// Page Size (PD/PDPT) ou PAT (PT)
        const PS = 1 << 7;
        /// Global
        const G = 1 << 8;
        const AVL0 = 1 << 9;
        const AVL1 = 1 << 10;
        const AVL2 = 1 << 11;
        /// Page Attribute Table (páginas grandes)
        const PAT = 1 << 12;
        const AVL3 = 1 << 52;
        const AVL4 = 1 << 53;
        const AVL5 = 1 << 54;
        const AVL6 = 1 << 55;
        const AVL7 = 1 << 56;
        const AVL8 = 1 << 57;
        const AVL9 = 1 << 58;
        /// Protection Keys (bits 59-62)
        const PK0 = 1 << 59;
        const PK1 = 1 << 60;
        const PK2 = 1 << 61;
        const PK3 = 1 << 62;
        /// Execute Disable
        const XD = 1 << 63;
    }
}

/// Máscara do endereço físico dentro de uma entrada.
const ADDR_MASK: u64 = 0x000F_FFFF_FFFF_F000;

/// Uma entrada de page table: u64 cru com acessores tipados.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PtEntry(u64);

impl PtEntry {
    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }

    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Endereço físico apontado (base do frame ou da próxima tabela).
    pub const fn addr(self) -> u64 {
        self.0 & ADDR_MASK
    }

    pub fn set_addr(&mut self, phys: u64) {
        self.0 = (self.0 & !ADDR_MASK) | (phys & ADDR_MASK);
    }

    pub const fn flags(self) -> PtFlags {
        PtFlags::from_bits_truncate(self.0)
    }

    pub fn insert_flags(&mut self, flags: PtFlags) {
        self.0 |= flags.bits();
    }

    pub fn remove_flags(&mut self, flags: PtFlags) {
        self.0 &= !flags.bits();
    }

    pub const fn is_present(self) -> bool {
        self.0 & 1 != 0
    }

    /// Entrada é uma folha grande (PS em PD/PDPT)?
    pub const fn is_huge(self) -> bool {
        self.0 & (1 << 7) != 0
    }
}

/// Tamanho de mapeamento.
///
/// `None` é o sentinela retornado por `optimized_map_range` com
/// `fail_on_modulo` quando o comprimento não é múltiplo do tamanho.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapSize {
    None,
    Size4K,
    Size2M,
    Size1G,
}

impl MapSize {
    pub const fn bytes(self) -> u64 {
        match self {
            MapSize::None => 0,
            MapSize::Size4K => crate::mm::PAGE_SIZE,
            MapSize::Size2M => crate::mm::PAGE_SIZE_2M,
            MapSize::Size1G => crate::mm::PAGE_SIZE_1G,
        }
    }
}

/// Espaço de endereçamento do kernel (adotado do bootloader).
static KERNEL_SPACE: spin::Once<AddressSpace> = spin::Once::new();

/// Adota a PML4 ativa (criada pelo bootloader) como o address space do
/// kernel. Chamado uma vez, depois do PMM.
pub fn init() {
    let root = crate::arch::Cpu::read_page_table() & ADDR_MASK;
    KERNEL_SPACE.call_once(|| AddressSpace::adopt(root));
    crate::kinfo!("(VMM) Address space do kernel adotado, PML4=", root);
}

/// O address space do kernel.
///
/// # Panics
/// Antes de `vmm::init`.
pub fn kernel_space() -> &'static AddressSpace {
    KERNEL_SPACE
        .get()
        .expect("VMM usado antes de vmm::init")
}
