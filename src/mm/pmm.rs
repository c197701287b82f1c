//! Alocador físico de frames (bitmap).
//!
//! 1 bit por frame de 4 KiB. Bit=1 significa frame em uso ou reservado;
//! bit=0 significa livre. Um cursor de busca avança junto com as
//! alocações e é rebobinado quando um frame abaixo dele é liberado.
//!
//! Contadores (bytes): `total`, `free`, `used`, `reserved`. As transições
//! acompanham exatamente os flips de bits: um set redundante não move
//! contador nenhum.
//!
//! Política de OOM: diagnóstico com os três contadores e parada da CPU.
//! O caminho de boot não tem como degradar sem memória física.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::core::handoff::{BootInfo, MemoryMapEntry, MemoryType};
use crate::klib::align::align_up;
use crate::klib::bitmap::Bitmap;
use crate::mm::addr::phys_to_virt;
use crate::mm::PAGE_SIZE;
use crate::sync::Spinlock;

// Contadores globais (bytes), legíveis sem o lock.
static TOTAL_MEMORY: AtomicU64 = AtomicU64::new(0);
static FREE_MEMORY: AtomicU64 = AtomicU64::new(0);
static USED_MEMORY: AtomicU64 = AtomicU64::new(0);
static RESERVED_MEMORY: AtomicU64 = AtomicU64::new(0);

/// Instância global, protegida por spinlock próprio.
static PHYSICAL: Spinlock<PhysicalAllocator> = Spinlock::new(PhysicalAllocator::new());

/// Estado do alocador. Os contadores do bitmap global vivem nos statics
/// acima; instâncias standalone (self-tests) carregam os seus próprios.
pub struct PhysicalAllocator {
    bitmap: Bitmap,
    /// Cursor de busca (índice de frame). Nunca aponta além do último bit
    /// válido; rebobinado por free/unreserve abaixo dele.
    bitmap_index: u64,
    total: u64,
    free: u64,
    used: u64,
    reserved: u64,
    /// Instância global publica os contadores nos statics.
    publish: bool,
}

impl PhysicalAllocator {
    pub const fn new() -> Self {
        Self {
            bitmap: Bitmap::empty(),
            bitmap_index: 0,
            total: 0,
            free: 0,
            used: 0,
            reserved: 0,
            publish: false,
        }
    }

    fn sync_counters(&self) {
        if self.publish {
            TOTAL_MEMORY.store(self.total, Ordering::Relaxed);
            FREE_MEMORY.store(self.free, Ordering::Relaxed);
            USED_MEMORY.store(self.used, Ordering::Relaxed);
            RESERVED_MEMORY.store(self.reserved, Ordering::Relaxed);
        }
    }

    /// Soma dos contadores móveis (para os invariantes dos self-tests).
    pub fn counters(&self) -> (u64, u64, u64, u64) {
        (self.total, self.free, self.used, self.reserved)
    }

    // -------------------------------------------------------------------
    // Operações de página única
    // -------------------------------------------------------------------

    /// Marca um frame como usado (free → used).
    pub fn lock_page(&mut self, address: u64) {
        let index = address / PAGE_SIZE;
        if self.bitmap.get(index as usize) {
            return;
        }
        if self.bitmap.set(index as usize, true) {
            self.free = self.free.saturating_sub(PAGE_SIZE);
            self.used += PAGE_SIZE;
            self.sync_counters();
        }
    }

    /// Marca `count` frames como usados.
    pub fn lock_pages(&mut self, address: u64, count: u64) {
        let mut i = 0;
        while i < count {
            self.lock_page(address + i * PAGE_SIZE);
            i += 1;
        }
    }

    /// Libera um frame (used → free). Endereço nulo é aviso, não crash.
    pub fn free_page(&mut self, address: u64) {
        if address == 0 {
            crate::kwarn!("(PMM) free_page com endereco nulo");
            return;
        }
        let index = address / PAGE_SIZE;
        if !self.bitmap.get(index as usize) {
            return;
        }
        if self.bitmap.set(index as usize, false) {
            self.free += PAGE_SIZE;
            self.used = self.used.saturating_sub(PAGE_SIZE);
            if self.bitmap_index > index {
                self.bitmap_index = index;
            }
            self.sync_counters();
        }
    }

    /// Libera `count` frames.
    pub fn free_pages(&mut self, address: u64, count: u64) {
        if address == 0 || count == 0 {
            crate::kwarn!("(PMM) free_pages com endereco nulo ou count zero");
            return;
        }
        let mut i = 0;
        while i < count {
            self.free_page(address + i * PAGE_SIZE);
            i += 1;
        }
    }

    /// Reserva um frame (free → reserved).
    pub fn reserve_page(&mut self, address: u64) {
        let index = address / PAGE_SIZE;
        if self.bitmap.get(index as usize) {
            return;
        }
        if self.bitmap.set(index as usize, true) {
            self.free = self.free.saturating_sub(PAGE_SIZE);
            self.reserved += PAGE_SIZE;
            self.sync_counters();
        }
    }

    /// Reserva `count` frames.
    pub fn reserve_pages(&mut self, address: u64, count: u64) {
        let mut i = 0;
        while i < count {
            self.reserve_page(address + i * PAGE_SIZE);
            i += 1;
        }
    }

    /// Devolve um frame reservado (reserved → free).
    pub fn unreserve_page(&mut self, address: u64) {
        let index = address / PAGE_SIZE;
        if !self.bitmap.get(index as usize) {
            return;
        }
        if self.bitmap.set(index as usize, false) {
            self.free += PAGE_SIZE;
            self.reserved = self.reserved.saturating_sub(PAGE_SIZE);
            if self.bitmap_index > index {
                self.bitmap_index = index;
            }
            self.sync_counters();
        }
    }

    /// Devolve `count` frames reservados.
    pub fn unreserve_pages(&mut self, address: u64, count: u64) {
        let mut i = 0;
        while i < count {
            self.unreserve_page(address + i * PAGE_SIZE);
            i += 1;
        }
    }

    // -------------------------------------------------------------------
    // Alocação
    // -------------------------------------------------------------------

    /// Aloca o primeiro frame livre a partir do cursor.
    pub fn request_page(&mut self) -> u64 {
        let bits = self.bitmap.bit_count() as u64;
        while self.bitmap_index < bits {
            if self.bitmap.get(self.bitmap_index as usize) {
                self.bitmap_index += 1;
                continue;
            }
            let address = self.bitmap_index * PAGE_SIZE;
            self.lock_page(address);
            return address;
        }

        self.out_of_memory();
    }

    /// Aloca `count` frames contíguos.
    pub fn request_pages(&mut self, count: u64) -> u64 {
        let bits = self.bitmap.bit_count() as u64;

        // Avançar o cursor sobre bits ocupados
        while self.bitmap_index < bits && self.bitmap.get(self.bitmap_index as usize) {
            self.bitmap_index += 1;
        }

        let mut index = self.bitmap_index;
        while index + count <= bits {
            let mut run = 0u64;
            while run < count && !self.bitmap.get((index + run) as usize) {
                run += 1;
            }
            if run == count {
                let address = index * PAGE_SIZE;
                self.lock_pages(address, count);
                return address;
            }
            // Pular além do bit ocupado encontrado
            index += run + 1;
        }

        self.out_of_memory();
    }

    fn out_of_memory(&self) -> ! {
        crate::kerror!("(PMM) Sem memoria fisica!");
        crate::klog!("  free=", self.free);
        crate::klog!("  used=", self.used);
        crate::klog!("  reserved=", self.reserved);
        crate::knl!();
        crate::arch::Cpu::stop();
    }

    // -------------------------------------------------------------------
    // Inicialização
    // -------------------------------------------------------------------

    /// Inicializa o alocador a partir de um mapa de memória.
    ///
    /// Etapas:
    /// 1. Escolhe a maior região Usable (base != 0) para hospedar o bitmap.
    /// 2. Zera o bitmap e reserva tudo.
    /// 3. Devolve (unreserve) cada região Usable.
    /// 4. Reserva explicitamente [0, 0x100000) e as páginas do bitmap.
    pub fn init_from_map(&mut self, map: &[MemoryMapEntry], total_memory: u64) {
        let mut host_base: u64 = 0;
        let mut host_len: u64 = 0;
        let mut max_phys: u64 = 0;

        for entry in map {
            if entry.typ != MemoryType::Usable {
                continue;
            }
            let end = entry.base + entry.len;
            if end > max_phys {
                max_phys = end;
            }
            // Não queremos o endereço 0 como base do bitmap
            if entry.base != 0 && entry.len > host_len {
                host_base = entry.base;
                host_len = entry.len;
            }
        }

        if host_base == 0 {
            crate::kerror!("(PMM) Nenhuma regiao Usable para o bitmap!");
            crate::arch::Cpu::stop();
        }

        self.total = total_memory;
        self.free = total_memory;

        // O bitmap cobre todos os frames endereçáveis até o fim da última
        // região Usable.
        let bitmap_bits = max_phys / PAGE_SIZE;
        let bitmap_bytes = align_up(bitmap_bits / 8 + 1, PAGE_SIZE);

        if bitmap_bytes > host_len {
            crate::kerror!("(PMM) Regiao hospedeira menor que o bitmap!");
            crate::arch::Cpu::stop();
        }

        crate::ktrace!("(PMM) Bitmap em=", host_base);
        crate::ktrace!("(PMM) Bitmap bytes=", bitmap_bytes);

        // SAFETY: região Usable exclusiva, reservada logo abaixo.
        self.bitmap = unsafe { Bitmap::from_raw(phys_to_virt::<u8>(host_base), bitmap_bytes as usize) };
        self.bitmap.clear();
        self.bitmap_index = 0;

        // Reservar tudo, devolver o que é Usable
        self.reserve_pages(0, self.bitmap.bit_count() as u64);
        for entry in map {
            if entry.typ == MemoryType::Usable {
                self.unreserve_pages(entry.base, entry.len / PAGE_SIZE);
            }
        }

        // O primeiro 1 MiB é historicamente problemático (IVT, BDA, EBDA,
        // ROMs); fica fora do pool.
        self.reserve_pages(0, 0x100);

        // O próprio bitmap
        self.lock_pages(host_base, bitmap_bytes / PAGE_SIZE);

        self.sync_counters();

        crate::kinfo!("(PMM) Frames gerenciados=", bitmap_bits);
        crate::kinfo!("(PMM) Livre (bytes)=", self.free);
    }
}

// ---------------------------------------------------------------------------
// Interface global
// ---------------------------------------------------------------------------

/// Inicializa o alocador global a partir do BootInfo.
pub fn init(boot_info: &BootInfo) {
    crate::kinfo!("(PMM) Inicializando alocador de frames...");

    let map = unsafe {
        core::slice::from_raw_parts(
            boot_info.memory_map_addr as *const MemoryMapEntry,
            boot_info.memory_map_len as usize,
        )
    };

    let mut pmm = PHYSICAL.lock("pmm::init");
    pmm.publish = true;
    pmm.init_from_map(map, boot_info.total_memory);
}

/// Aloca um frame. Falha parando a CPU (ver política de OOM do módulo).
pub fn request_page() -> u64 {
    PHYSICAL.lock("pmm::request_page").request_page()
}

/// Aloca `count` frames contíguos.
pub fn request_pages(count: usize) -> u64 {
    PHYSICAL.lock("pmm::request_pages").request_pages(count as u64)
}

/// Libera um frame.
pub fn free_page(address: u64) {
    PHYSICAL.lock("pmm::free_page").free_page(address);
}

/// Libera `count` frames.
pub fn free_pages(address: u64, count: usize) {
    PHYSICAL.lock("pmm::free_pages").free_pages(address, count as u64);
}

/// Reserva frames fora do pool de alocação.
pub fn reserve_pages(address: u64, count: usize) {
    PHYSICAL
        .lock("pmm::reserve_pages")
        .reserve_pages(address, count as u64);
}

/// Devolve frames reservados ao pool.
pub fn unreserve_pages(address: u64, count: usize) {
    PHYSICAL
        .lock("pmm::unreserve_pages")
        .unreserve_pages(address, count as u64);
}

/// Total de memória gerenciada (bytes).
pub fn total_memory() -> u64 {
    TOTAL_MEMORY.load(Ordering::Relaxed)
}

/// Memória livre (bytes).
pub fn free_memory() -> u64 {
    FREE_MEMORY.load(Ordering::Relaxed)
}

/// Memória em uso (bytes).
pub fn used_memory() -> u64 {
    USED_MEMORY.load(Ordering::Relaxed)
}

/// Memória reservada (bytes).
pub fn reserved_memory() -> u64 {
    RESERVED_MEMORY.load(Ordering::Relaxed)
}
