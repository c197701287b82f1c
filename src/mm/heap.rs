//! Heap do kernel.
//!
//! `linked_list_allocator` como `#[global_allocator]`, servindo Vec/Box/
//! Arc. A região vive em `KERNEL_HEAP_BASE`, com backing de frames do
//! PMM mapeados página a página no espaço do kernel — a metade alta é
//! compartilhada, então todo processo enxerga o heap do kernel.

use linked_list_allocator::LockedHeap;

use crate::mm::vmm::{kernel_space, MapSize, PtFlags};
use crate::mm::{pmm, KERNEL_HEAP_BASE, PAGE_SIZE};

/// Tamanho inicial do heap (8 MiB).
const HEAP_SIZE: u64 = 8 * 1024 * 1024;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Mapeia a região do heap e inicializa o alocador.
pub fn init() {
    let space = kernel_space();
    let pages = HEAP_SIZE / PAGE_SIZE;

    let mut i = 0u64;
    while i < pages {
        let frame = pmm::request_page();
        space.map(
            KERNEL_HEAP_BASE + i * PAGE_SIZE,
            frame,
            PtFlags::RW | PtFlags::G | PtFlags::XD,
            MapSize::Size4K,
        );
        i += 1;
    }

    // SAFETY: região recém-mapeada, exclusiva do alocador.
    unsafe {
        ALLOCATOR
            .lock()
            .init(KERNEL_HEAP_BASE as *mut u8, HEAP_SIZE as usize);
    }

    crate::kinfo!("(Heap) Heap do kernel em=", KERNEL_HEAP_BASE);
    crate::kinfo!("(Heap) Tamanho (bytes)=", HEAP_SIZE);
}
