//! Wrappers type-safe para endereços e a janela física linear.
//!
//! O bootloader entrega o kernel com a memória física acessível por uma
//! janela linear (identity map nos primeiros GiB, ou um offset de
//! higher-half informado no BootInfo). Toda travessia de page table e
//! acesso MMIO passa por `phys_to_virt`.

use core::sync::atomic::{AtomicU64, Ordering};

/// Offset virtual da janela física (0 = identity map).
static PHYS_WINDOW_OFFSET: AtomicU64 = AtomicU64::new(0);

/// Configura o offset da janela física (chamado no boot, antes do PMM).
pub fn set_phys_window(offset: u64) {
    PHYS_WINDOW_OFFSET.store(offset, Ordering::Relaxed);
}

/// Converte um endereço físico em ponteiro utilizável pelo kernel.
///
/// A validade do ponteiro depende da janela física cobrir o endereço;
/// isso é garantido pelo contrato com o bootloader.
#[inline]
pub fn phys_to_virt<T>(phys: u64) -> *mut T {
    (phys + PHYS_WINDOW_OFFSET.load(Ordering::Relaxed)) as *mut T
}

/// Endereço físico.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysAddr(u64);

impl PhysAddr {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Alinha para baixo na página.
    pub const fn page_base(self) -> Self {
        Self(self.0 & !0xFFF)
    }
}

/// Endereço virtual.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtAddr(u64);

impl VirtAddr {
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Índices de page table (PML4, PDPT, PD, PT).
    pub const fn table_indices(self) -> (usize, usize, usize, usize) {
        let a = self.0;
        (
            ((a >> 39) & 0x1FF) as usize,
            ((a >> 30) & 0x1FF) as usize,
            ((a >> 21) & 0x1FF) as usize,
            ((a >> 12) & 0x1FF) as usize,
        )
    }
}
