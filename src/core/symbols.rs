//! Resolução de símbolos do kernel (e de imagens carregadas).
//!
//! A tabela é construída a partir da imagem ELF do kernel (SHT_SYMTAB +
//! a SHT_STRTAB ligada), ordenada por endereço. `get_symbol_from_address`
//! devolve o símbolo de maior endereço ≤ consulta — é o que o crash
//! handler usa para transformar endereços de retorno em nomes.
//!
//! Imagens adicionais (drivers) podem ser anexadas com um offset de base
//! aplicado a cada símbolo.

use alloc::vec::Vec;

use crate::sync::Spinlock;
use crate::sys::elf::{Elf64Ehdr, Elf64Shdr, Elf64Sym, ELF_MAGIC, SHT_STRTAB, SHT_SYMTAB};

/// Nome devolvido para endereços sem símbolo.
pub const UNKNOWN_SYMBOL: &str = "<unknown>";

#[derive(Debug, Clone, Copy)]
pub struct SymbolEntry {
    pub address: u64,
    pub name: &'static str,
}

/// Tabela de símbolos ordenada por endereço.
pub struct SymbolTable {
    entries: Vec<SymbolEntry>,
}

impl SymbolTable {
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// A tabela tem algum símbolo?
    pub fn exists(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insere um símbolo mantendo a ordenação.
    pub fn add_symbol(&mut self, address: u64, name: &'static str) {
        let position = self
            .entries
            .partition_point(|e| e.address <= address);
        self.entries.insert(position, SymbolEntry { address, name });
    }

    /// Nome do maior símbolo com endereço ≤ `address`, ou `"<unknown>"`.
    pub fn get_symbol_from_address(&self, address: u64) -> &'static str {
        let position = self.entries.partition_point(|e| e.address <= address);
        if position == 0 {
            return UNKNOWN_SYMBOL;
        }
        self.entries[position - 1].name
    }

    /// Carrega os símbolos de uma imagem ELF em memória.
    pub fn append_image(&mut self, image_addr: u64, base_offset: u64) {
        if image_addr == 0 {
            crate::kerror!("(Symbols) Endereco de imagem invalido");
            return;
        }

        // SAFETY: a imagem vem do bootloader (ou do loader de drivers) e
        // permanece residente; os nomes apontam para a STRTAB dela.
        unsafe {
            let header = &*(image_addr as *const Elf64Ehdr);
            if header.e_ident[0..4] != ELF_MAGIC {
                crate::kerror!("(Symbols) Header ELF invalido em=", image_addr);
                return;
            }

            let sections = (image_addr + header.e_shoff) as *const Elf64Shdr;
            let mut symtab: Option<&Elf64Shdr> = None;
            let mut strtab_offset: u64 = 0;

            let mut i = 0u16;
            while i < header.e_shnum {
                let section = &*sections.add(i as usize);
                if section.sh_type == SHT_SYMTAB {
                    symtab = Some(section);
                    // A string table correspondente vem de sh_link
                    let linked = &*sections.add(section.sh_link as usize);
                    if linked.sh_type == SHT_STRTAB {
                        strtab_offset = linked.sh_offset;
                    }
                }
                i += 1;
            }

            let Some(symtab) = symtab else {
                crate::kwarn!("(Symbols) Imagem sem tabela de simbolos");
                return;
            };
            if strtab_offset == 0 {
                crate::kwarn!("(Symbols) Imagem sem string table");
                return;
            }

            let symbols = (image_addr + symtab.sh_offset) as *const Elf64Sym;
            let total = (symtab.sh_size / core::mem::size_of::<Elf64Sym>() as u64) as usize;
            let strtab = (image_addr + strtab_offset) as *const u8;

            let mut added = 0usize;
            let mut i = 0usize;
            while i < total {
                let symbol = &*symbols.add(i);
                i += 1;

                // Entradas de endereço zero não resolvem nada útil
                if symbol.st_value == 0 {
                    continue;
                }

                let name = cstr_at(strtab.add(symbol.st_name as usize));
                if name.is_empty() {
                    continue;
                }

                self.add_symbol(symbol.st_value + base_offset, name);
                added += 1;
            }

            crate::kdebug!("(Symbols) Simbolos carregados=", added as u64);
        }
    }

    /// Carrega símbolos a partir das seções entregues pelo loader
    /// (estilo multiboot: array de section headers fora da imagem).
    pub fn append_from_sections(&mut self, num: u64, entsize: u64, sections_addr: u64) {
        if sections_addr == 0 || num == 0 {
            return;
        }

        // SAFETY: região entregue pelo bootloader, residente.
        unsafe {
            let base = sections_addr as *const u8;
            let mut symtab: Option<&Elf64Shdr> = None;
            let mut strtab_addr: u64 = 0;

            let mut i = 0u64;
            while i < num {
                let section = &*(base.add((entsize * i) as usize) as *const Elf64Shdr);
                if section.sh_type == SHT_SYMTAB {
                    let linked = &*(base.add((entsize * section.sh_link as u64) as usize)
                        as *const Elf64Shdr);
                    if linked.sh_type == SHT_STRTAB {
                        symtab = Some(section);
                        strtab_addr = linked.sh_addr;
                    }
                }
                i += 1;
            }

            let Some(symtab) = symtab else {
                crate::kwarn!("(Symbols) Secoes do loader sem SYMTAB/STRTAB");
                return;
            };

            let symbols = symtab.sh_addr as *const Elf64Sym;
            let total = (symtab.sh_size / symtab.sh_entsize.max(1)) as usize;
            let strtab = strtab_addr as *const u8;

            let mut i = 0usize;
            while i < total {
                let symbol = &*symbols.add(i);
                i += 1;
                if symbol.st_value == 0 {
                    continue;
                }
                let name = cstr_at(strtab.add(symbol.st_name as usize));
                if name.is_empty() {
                    continue;
                }
                self.add_symbol(symbol.st_value, name);
            }

            crate::kdebug!("(Symbols) Tabela do loader carregada, entradas=", total as u64);
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Lê uma C string residente como &'static str.
///
/// # Safety
/// `ptr` deve apontar para uma string NUL-terminada em memória residente.
unsafe fn cstr_at(ptr: *const u8) -> &'static str {
    let mut len = 0usize;
    while core::ptr::read(ptr.add(len)) != 0 {
        len += 1;
    }
    let bytes = core::slice::from_raw_parts(ptr, len);
    core::str::from_utf8(bytes).unwrap_or("")
}

// ---------------------------------------------------------------------------
// Tabela global do kernel
// ---------------------------------------------------------------------------

static KERNEL_SYMBOLS: Spinlock<SymbolTable> = Spinlock::new(SymbolTable::new());

/// Carrega a tabela do kernel a partir do BootInfo.
pub fn init(boot_info: &crate::core::handoff::BootInfo) {
    let mut table = KERNEL_SYMBOLS.lock("symbols::init");
    table.append_image(boot_info.kernel.file_base, 0);

    if !table.exists() {
        // Fallback: seções entregues pelo loader
        let symbols = &boot_info.kernel.symbols;
        table.append_from_sections(symbols.num, symbols.entsize, symbols.sections_addr);
    }

    if table.exists() {
        crate::kinfo!("(Symbols) Tabela do kernel pronta, entradas=", table.len() as u64);
    } else {
        crate::kwarn!("(Symbols) Kernel sem simbolos; backtraces sem nomes");
    }
}

/// Resolve um endereço pela tabela do kernel.
pub fn resolve(address: u64) -> &'static str {
    // try_lock: o crash handler pode chegar aqui com o lock já tomado
    // por este mesmo core.
    match KERNEL_SYMBOLS.try_lock("symbols::resolve") {
        Some(table) => table.get_symbol_from_address(address),
        None => UNKNOWN_SYMBOL,
    }
}

/// Anexa uma imagem de driver com offset de base.
pub fn append_driver_image(image_addr: u64, base_offset: u64) {
    KERNEL_SYMBOLS
        .lock("symbols::append_driver_image")
        .append_image(image_addr, base_offset);
}
