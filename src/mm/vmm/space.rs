//! AddressSpace: operações sobre uma hierarquia PML4 → PDPT → PD → PT.

use super::{MapSize, PtEntry, PtFlags};
use crate::arch::Cpu;
use crate::mm::addr::{phys_to_virt, VirtAddr};
use crate::mm::{pmm, PAGE_SIZE, PAGE_SIZE_1G, PAGE_SIZE_2M};
use crate::sync::Spinlock;

/// Flags propagadas para níveis intermediários: um leaf User/Writable só
/// funciona se todos os níveis acima permitirem.
const INTERMEDIATE_MASK: PtFlags = PtFlags::RW.union(PtFlags::US);

/// Um espaço de endereçamento (uma PML4).
pub struct AddressSpace {
    /// Endereço físico da PML4.
    root: u64,
    /// Spaces adotados (o do kernel) não liberam tabelas no drop.
    owned: bool,
    /// Serializa os mutadores. `check`/`get_physical` leem entradas de
    /// 64 bits alinhadas sem o lock.
    lock: Spinlock<()>,
}

impl AddressSpace {
    /// Adota uma PML4 existente (a do bootloader).
    pub fn adopt(root: u64) -> Self {
        Self {
            root,
            owned: false,
            lock: Spinlock::new(()),
        }
    }

    /// Cria um espaço novo: metade de usuário vazia, metade de kernel
    /// compartilhada (entradas da PML4 copiadas cruas).
    pub fn new() -> Self {
        let root = pmm::request_page();
        zero_table(root);

        let kernel_root = super::kernel_space().root;
        // SAFETY: ambas as tabelas são páginas válidas da janela física.
        unsafe {
            let src = phys_to_virt::<u64>(kernel_root);
            let dst = phys_to_virt::<u64>(root);
            let mut i = 256;
            while i < 512 {
                core::ptr::write_volatile(dst.add(i), core::ptr::read_volatile(src.add(i)));
                i += 1;
            }
        }

        Self {
            root,
            owned: true,
            lock: Spinlock::new(()),
        }
    }

    /// Endereço físico da PML4 (valor de CR3).
    pub fn root(&self) -> u64 {
        self.root
    }

    /// Troca a CPU atual para este espaço.
    ///
    /// # Safety
    /// A metade de kernel deve estar presente (garantido por construção).
    pub unsafe fn activate(&self) {
        Cpu::write_page_table(self.root);
    }

    // -----------------------------------------------------------------
    // Leitura (lock-free)
    // -----------------------------------------------------------------

    /// Caminha até a folha de `va`. Retorna (entrada, tamanho da folha).
    fn walk(&self, va: u64) -> Option<(PtEntry, MapSize)> {
        let (i4, i3, i2, i1) = VirtAddr::new(va).table_indices();

        let pml4e = read_entry(self.root, i4);
        if !pml4e.is_present() {
            return None;
        }

        let pdpte = read_entry(pml4e.addr(), i3);
        if !pdpte.is_present() {
            return None;
        }
        if pdpte.is_huge() {
            return Some((pdpte, MapSize::Size1G));
        }

        let pde = read_entry(pdpte.addr(), i2);
        if !pde.is_present() {
            return None;
        }
        if pde.is_huge() {
            return Some((pde, MapSize::Size2M));
        }

        let pte = read_entry(pde.addr(), i1);
        if !pte.is_present() {
            return None;
        }
        Some((pte, MapSize::Size4K))
    }

    /// Todos os níveis presentes e a folha contém `flag`?
    pub fn check(&self, va: u64, flag: PtFlags) -> bool {
        match self.walk(va) {
            Some((leaf, _)) => leaf.flags().contains(flag),
            None => false,
        }
    }

    /// Endereço físico correspondente a `va`, se mapeado.
    pub fn get_physical(&self, va: u64) -> Option<u64> {
        let (leaf, size) = self.walk(va)?;
        let offset = va & (size.bytes() - 1);
        Some(leaf.addr() + offset)
    }

    // -----------------------------------------------------------------
    // Mutação (sob o lock do espaço)
    // -----------------------------------------------------------------

    /// Mapeia `va` → `pa` com `flags | P`, alocando tabelas intermediárias
    /// (zeradas) conforme necessário, e invalida a TLB de `va`.
    pub fn map(&self, va: u64, pa: u64, flags: PtFlags, size: MapSize) {
        let _guard = self.lock.lock("vmm::map");
        self.map_locked(va, pa, flags, size);
    }

    fn map_locked(&self, va: u64, pa: u64, flags: PtFlags, size: MapSize) {
        let (i4, i3, i2, i1) = VirtAddr::new(va).table_indices();
        let intermediate = (flags & INTERMEDIATE_MASK) | PtFlags::P;

        let pdpt = ensure_table(self.root, i4, intermediate);

        if let MapSize::Size1G = size {
            write_leaf(pdpt, i3, pa, flags | PtFlags::P | PtFlags::PS);
            Cpu::invlpg(va);
            return;
        }

        let pd = ensure_table(pdpt, i3, intermediate);

        if let MapSize::Size2M = size {
            write_leaf(pd, i2, pa, flags | PtFlags::P | PtFlags::PS);
            Cpu::invlpg(va);
            return;
        }

        let pt = ensure_table(pd, i2, intermediate);
        write_leaf(pt, i1, pa, flags | PtFlags::P);
        Cpu::invlpg(va);
    }

    /// Mapeia uma faixa, iterando pelo tamanho de página.
    pub fn map_range(&self, va: u64, pa: u64, length: u64, flags: PtFlags, size: MapSize) {
        let step = size.bytes();
        if step == 0 {
            crate::kwarn!("(VMM) map_range com MapSize::None");
            return;
        }
        let _guard = self.lock.lock("vmm::map_range");
        let mut offset = 0u64;
        while offset < length {
            self.map_locked(va + offset, pa + offset, flags, size);
            offset += step;
        }
    }

    /// Mapeia uma faixa escolhendo o melhor tamanho de página.
    ///
    /// - `fit`: descasca guloso 1 GiB → 2 MiB → 4 KiB.
    /// - `fail_on_modulo`: recusa comprimentos não múltiplos do tamanho
    ///   escolhido e retorna `MapSize::None`.
    ///
    /// 1 GiB só entra em jogo quando a CPU reporta suporte.
    pub fn optimized_map_range(
        &self,
        va: u64,
        pa: u64,
        length: u64,
        flags: PtFlags,
        fit: bool,
        fail_on_modulo: bool,
    ) -> MapSize {
        let has_1g = Cpu::has_1gib_pages();

        if fit {
            let mut va = va;
            let mut pa = pa;
            let mut remaining = length;

            if has_1g {
                while remaining >= PAGE_SIZE_1G {
                    self.map(va, pa, flags, MapSize::Size1G);
                    va += PAGE_SIZE_1G;
                    pa += PAGE_SIZE_1G;
                    remaining -= PAGE_SIZE_1G;
                }
            }
            while remaining >= PAGE_SIZE_2M {
                self.map(va, pa, flags, MapSize::Size2M);
                va += PAGE_SIZE_2M;
                pa += PAGE_SIZE_2M;
                remaining -= PAGE_SIZE_2M;
            }
            while remaining >= PAGE_SIZE {
                self.map(va, pa, flags, MapSize::Size4K);
                va += PAGE_SIZE;
                pa += PAGE_SIZE;
                remaining -= PAGE_SIZE;
            }
            return MapSize::Size4K;
        }

        let mut size = MapSize::Size4K;
        if has_1g && length >= PAGE_SIZE_1G {
            size = MapSize::Size1G;
            if length % PAGE_SIZE_1G != 0 {
                crate::kwarn!("(VMM) Comprimento nao e multiplo de 1 GiB");
                if fail_on_modulo {
                    return MapSize::None;
                }
            }
        } else if length >= PAGE_SIZE_2M {
            size = MapSize::Size2M;
            if length % PAGE_SIZE_2M != 0 {
                crate::kwarn!("(VMM) Comprimento nao e multiplo de 2 MiB");
                if fail_on_modulo {
                    return MapSize::None;
                }
            }
        }

        self.map_range(va, pa, length, flags, size);
        size
    }

    /// Desfaz o mapeamento de `va`: limpa o bit Present da folha e
    /// invalida a TLB. Entradas ausentes são aviso, não falha.
    pub fn unmap(&self, va: u64, size: MapSize) {
        let _guard = self.lock.lock("vmm::unmap");
        self.unmap_locked(va, size);
    }

    fn unmap_locked(&self, va: u64, size: MapSize) {
        let (i4, i3, i2, i1) = VirtAddr::new(va).table_indices();

        let pml4e = read_entry(self.root, i4);
        if !pml4e.is_present() {
            crate::kwarn!("(VMM) unmap: PML4E ausente para va=", va);
            return;
        }

        let pdpt = pml4e.addr();
        if let MapSize::Size1G = size {
            clear_present(pdpt, i3, va);
            return;
        }

        let pdpte = read_entry(pdpt, i3);
        if !pdpte.is_present() {
            crate::kwarn!("(VMM) unmap: PDPTE ausente para va=", va);
            return;
        }
        if pdpte.is_huge() {
            // Folha de 1 GiB no caminho: ela É o mapeamento de va
            clear_present(pdpt, i3, va);
            return;
        }

        let pd = pdpte.addr();
        if let MapSize::Size2M = size {
            clear_present(pd, i2, va);
            return;
        }

        let pde = read_entry(pd, i2);
        if !pde.is_present() {
            crate::kwarn!("(VMM) unmap: PDE ausente para va=", va);
            return;
        }
        if pde.is_huge() {
            // Folha de 2 MiB no caminho (identity map do bootloader)
            clear_present(pd, i2, va);
            return;
        }

        clear_present(pde.addr(), i1, va);
    }

    /// Desfaz uma faixa de mapeamentos.
    pub fn unmap_range(&self, va: u64, length: u64, size: MapSize) {
        let step = size.bytes();
        if step == 0 {
            return;
        }
        let _guard = self.lock.lock("vmm::unmap_range");
        let mut offset = 0u64;
        while offset < length {
            self.unmap_locked(va + offset, size);
            offset += step;
        }
    }

    /// Remapeia: unmap seguido de map.
    pub fn remap(&self, va: u64, pa: u64, flags: PtFlags) {
        let _guard = self.lock.lock("vmm::remap");
        self.unmap_locked(va, MapSize::Size4K);
        self.map_locked(va, pa, flags, MapSize::Size4K);
    }

    /// Duplica este espaço: o filho observa os mesmos mapeamentos de
    /// usuário do pai neste instante.
    ///
    /// A metade de kernel compartilha tabelas; a metade de usuário ganha
    /// tabelas intermediárias novas com as folhas copiadas cruas (mesmos
    /// frames físicos). Mudanças posteriores no pai não aparecem no filho.
    pub fn fork(&self) -> AddressSpace {
        let _guard = self.lock.lock("vmm::fork");

        let child_root = pmm::request_page();
        zero_table(child_root);

        // SAFETY: tabelas válidas pela janela física.
        unsafe {
            let src = phys_to_virt::<u64>(self.root);
            let dst = phys_to_virt::<u64>(child_root);

            // Kernel: compartilhado
            let mut i = 256usize;
            while i < 512 {
                core::ptr::write_volatile(dst.add(i), core::ptr::read_volatile(src.add(i)));
                i += 1;
            }

            // Usuário: cópia profunda das tabelas
            let mut i = 0usize;
            while i < 256 {
                let entry = PtEntry::from_raw(core::ptr::read_volatile(src.add(i)));
                if entry.is_present() {
                    let mut child = entry;
                    child.set_addr(copy_subtree(entry.addr(), 3));
                    core::ptr::write_volatile(dst.add(i), child.raw());
                }
                i += 1;
            }
        }

        AddressSpace {
            root: child_root,
            owned: true,
            lock: Spinlock::new(()),
        }
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        // Liberar as tabelas da metade de usuário (os frames-alvo
        // pertencem a quem os alocou: stacks, imagens, heap do processo).
        let mut i = 0usize;
        while i < 256 {
            let entry = read_entry(self.root, i);
            if entry.is_present() {
                free_subtree(entry.addr(), 3);
            }
            i += 1;
        }
        pmm::free_page(self.root);
    }
}

// ---------------------------------------------------------------------------
// Helpers de tabela
// ---------------------------------------------------------------------------

fn zero_table(phys: u64) {
    // SAFETY: página recém-alocada, exclusiva.
    unsafe {
        let ptr = phys_to_virt::<u64>(phys);
        let mut i = 0;
        while i < 512 {
            core::ptr::write_volatile(ptr.add(i), 0);
            i += 1;
        }
    }
}

fn read_entry(table_phys: u64, index: usize) -> PtEntry {
    // SAFETY: leitura alinhada de 64 bits dentro de uma tabela válida.
    unsafe { PtEntry::from_raw(core::ptr::read_volatile(phys_to_virt::<u64>(table_phys).add(index))) }
}

fn write_entry(table_phys: u64, index: usize, entry: PtEntry) {
    // SAFETY: escrita alinhada de 64 bits dentro de uma tabela válida.
    unsafe { core::ptr::write_volatile(phys_to_virt::<u64>(table_phys).add(index), entry.raw()) }
}

/// Garante a existência da tabela do próximo nível, propagando flags
/// permissivas para a entrada intermediária.
///
/// Uma folha grande no caminho é substituída por uma tabela nova (o
/// mapeamento grande é descartado com aviso — quem quer granularidade
/// fina dentro de uma huge page precisa remapear o restante).
fn ensure_table(table_phys: u64, index: usize, intermediate: PtFlags) -> u64 {
    let mut entry = read_entry(table_phys, index);
    if !entry.is_present() || entry.is_huge() {
        if entry.is_huge() {
            crate::kwarn!("(VMM) Huge page substituida por tabela, entrada=", index as u64);
        }
        let next = pmm::request_page();
        zero_table(next);
        entry = PtEntry::zero();
        entry.set_addr(next);
        entry.insert_flags(intermediate);
        write_entry(table_phys, index, entry);
        next
    } else {
        entry.insert_flags(intermediate);
        write_entry(table_phys, index, entry);
        entry.addr()
    }
}

fn write_leaf(table_phys: u64, index: usize, pa: u64, flags: PtFlags) {
    let mut entry = PtEntry::zero();
    entry.set_addr(pa);
    entry.insert_flags(flags);
    write_entry(table_phys, index, entry);
}

fn clear_present(table_phys: u64, index: usize, va: u64) {
    let mut entry = read_entry(table_phys, index);
    if !entry.is_present() {
        crate::kwarn!("(VMM) unmap: folha ausente para va=", va);
        return;
    }
    entry.remove_flags(PtFlags::P);
    write_entry(table_phys, index, entry);
    Cpu::invlpg(va);
}

/// Cópia profunda de uma subárvore de tabelas (fork).
/// `level`: 3 = PDPT, 2 = PD, 1 = PT. Folhas copiadas cruas.
fn copy_subtree(table_phys: u64, level: u8) -> u64 {
    let new_table = pmm::request_page();
    zero_table(new_table);

    let mut i = 0usize;
    while i < 512 {
        let entry = read_entry(table_phys, i);
        if entry.is_present() {
            if level == 1 || entry.is_huge() {
                write_entry(new_table, i, entry);
            } else {
                let mut child = entry;
                child.set_addr(copy_subtree(entry.addr(), level - 1));
                write_entry(new_table, i, child);
            }
        }
        i += 1;
    }
    new_table
}

/// Libera as tabelas intermediárias de uma subárvore (drop do espaço).
fn free_subtree(table_phys: u64, level: u8) {
    if level > 1 {
        let mut i = 0usize;
        while i < 512 {
            let entry = read_entry(table_phys, i);
            if entry.is_present() && !entry.is_huge() {
                free_subtree(entry.addr(), level - 1);
            }
            i += 1;
        }
    }
    pmm::free_page(table_phys);
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}
