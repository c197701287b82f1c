//! Stack Guard: stacks de kernel e de usuário.
//!
//! Kernel stacks são contíguas, de tamanho fixo e nunca crescem. User
//! stacks são ancoradas em `USER_STACK_BASE` e crescem para baixo: o
//! page-fault handler chama `expand` quando o acesso cai na janela de
//! guarda logo abaixo do fundo atual.

use alloc::vec::Vec;

use crate::mm::addr::phys_to_virt;
use crate::mm::vmm::{AddressSpace, MapSize, PtFlags};
use crate::mm::{pmm, to_pages, PAGE_SIZE, STACK_SIZE, USER_STACK_BASE, USER_STACK_SIZE};

/// Um par (frame físico, página virtual) de backing da stack.
#[derive(Debug, Clone, Copy)]
pub struct AllocatedPage {
    pub phys: u64,
    pub virt: u64,
}

/// Stack de uma thread.
pub struct StackGuard {
    stack_bottom: u64,
    stack_top: u64,
    phys_bottom: u64,
    phys_top: u64,
    size: u64,
    user_mode: bool,
    expanded: bool,
    allocated: Vec<AllocatedPage>,
}

impl StackGuard {
    /// Aloca uma stack nova.
    ///
    /// - Kernel: região física contígua de `STACK_SIZE`, zerada, acessada
    ///   pela janela física (sem mapeamento extra).
    /// - Usuário: frames mapeados em `USER_STACK_BASE` com RW|US no
    ///   espaço do processo.
    pub fn new(user: bool, space: &AddressSpace) -> Self {
        if user {
            let pages = to_pages(USER_STACK_SIZE);
            let frames = pmm::request_pages(pages as usize);
            zero_region(frames, USER_STACK_SIZE);

            let mut allocated = Vec::new();
            let mut i = 0u64;
            while i < pages {
                let virt = USER_STACK_BASE + i * PAGE_SIZE;
                let phys = frames + i * PAGE_SIZE;
                space.map(virt, phys, PtFlags::RW | PtFlags::US, MapSize::Size4K);
                allocated.push(AllocatedPage { phys, virt });
                i += 1;
            }

            crate::ktrace!("(Stack) User stack alocada, frames=", frames);
            Self {
                stack_bottom: USER_STACK_BASE,
                stack_top: USER_STACK_BASE + USER_STACK_SIZE,
                phys_bottom: frames,
                phys_top: frames + USER_STACK_SIZE,
                size: USER_STACK_SIZE,
                user_mode: true,
                expanded: false,
                allocated,
            }
        } else {
            let pages = to_pages(STACK_SIZE);
            let frames = pmm::request_pages(pages as usize);
            zero_region(frames, STACK_SIZE);

            let mut allocated = Vec::new();
            let mut i = 0u64;
            while i < pages {
                let phys = frames + i * PAGE_SIZE;
                allocated.push(AllocatedPage { phys, virt: phys });
                i += 1;
            }

            crate::ktrace!("(Stack) Kernel stack alocada em=", frames);
            Self {
                stack_bottom: frames,
                stack_top: frames + STACK_SIZE,
                phys_bottom: frames,
                phys_top: frames + STACK_SIZE,
                size: STACK_SIZE,
                user_mode: false,
                expanded: false,
                allocated,
            }
        }
    }

    /// Topo da stack (valor inicial de RSP).
    pub fn top(&self) -> u64 {
        self.stack_top
    }

    /// Fundo atual da stack.
    pub fn bottom(&self) -> u64 {
        self.stack_bottom
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_user(&self) -> bool {
        self.user_mode
    }

    pub fn is_expanded(&self) -> bool {
        self.expanded
    }

    /// Base física (só faz sentido enquanto a stack não expandiu).
    pub fn phys_bottom(&self) -> Option<u64> {
        if self.expanded {
            None
        } else {
            Some(self.phys_bottom)
        }
    }

    /// Topo físico (só faz sentido enquanto a stack não expandiu).
    pub fn phys_top(&self) -> Option<u64> {
        if self.expanded {
            None
        } else {
            Some(self.phys_top)
        }
    }

    /// Páginas de backing (para teardown/fork).
    pub fn allocated_pages(&self) -> &[AllocatedPage] {
        &self.allocated
    }

    /// Chamado pelo page-fault handler. Se `fault_addr` cai na janela de
    /// guarda (um grânulo abaixo do fundo atual, até o topo), estende a
    /// stack em um grânulo e retorna `true` — o handler então reexecuta a
    /// instrução. Fora da janela não é falta de stack: retorna `false`.
    pub fn expand(&mut self, space: &AddressSpace, fault_addr: u64) -> bool {
        if !self.user_mode {
            // Kernel stacks não crescem.
            return false;
        }

        if fault_addr < self.stack_bottom - USER_STACK_SIZE || fault_addr > self.stack_top {
            return false;
        }

        let pages = to_pages(USER_STACK_SIZE);
        let frames = pmm::request_pages(pages as usize);
        zero_region(frames, USER_STACK_SIZE);

        let new_bottom = self.stack_bottom - USER_STACK_SIZE;
        let mut i = 0u64;
        while i < pages {
            let virt = new_bottom + i * PAGE_SIZE;
            let phys = frames + i * PAGE_SIZE;
            space.map(virt, phys, PtFlags::RW | PtFlags::US, MapSize::Size4K);
            self.allocated.push(AllocatedPage { phys, virt });
            i += 1;
        }

        self.stack_bottom = new_bottom;
        self.size += USER_STACK_SIZE;
        self.expanded = true;

        crate::kinfo!("(Stack) Stack expandida, novo fundo=", new_bottom);
        true
    }

    /// Replica a stack do pai nesta stack (fork): cresce até o mesmo
    /// tamanho e copia o conteúdo página a página.
    pub fn fork_from(&mut self, parent: &StackGuard, space: &AddressSpace) {
        while self.size < parent.size {
            // Crescer pelo mesmo caminho do fault, um grânulo por vez
            let guard_addr = self.stack_bottom - 1;
            if !self.expand(space, guard_addr) {
                crate::kerror!("(Stack) fork_from: falha ao igualar tamanho");
                return;
            }
        }

        for page in parent.allocated.iter() {
            let Some(child_phys) = space.get_physical(page.virt) else {
                crate::kwarn!("(Stack) fork_from: pagina sem backing, virt=", page.virt);
                continue;
            };
            // SAFETY: ambos os frames pertencem às stacks envolvidas.
            unsafe {
                core::ptr::copy_nonoverlapping(
                    phys_to_virt::<u8>(page.phys),
                    phys_to_virt::<u8>(child_phys),
                    PAGE_SIZE as usize,
                );
            }
        }
    }

    /// Devolve os frames da stack ao PMM (reaping da thread).
    pub fn release(&mut self) {
        for page in self.allocated.iter() {
            pmm::free_page(page.phys);
        }
        self.allocated.clear();
    }
}

fn zero_region(phys: u64, len: u64) {
    // SAFETY: região recém-alocada do PMM, exclusiva.
    unsafe {
        core::ptr::write_bytes(phys_to_virt::<u8>(phys), 0, len as usize);
    }
}
