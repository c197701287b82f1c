//! Interface de Handoff (Bootloader → Kernel).
//!
//! Estrutura de dados (ABI) passada pelo bootloader. Structs `#[repr(C)]`
//! para garantia de layout; tipos primitivos para portabilidade; magic
//! number para validação.

/// Assinatura mágica esperada do bootloader.
pub const BOOT_MAGIC: u64 = 0x414E_5649_4C42_4F4F; // "ANVILBOO"

/// Estrutura de informações de boot.
/// Mantida em sincronia binária exata com o bootloader.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct BootInfo {
    /// Assinatura para validação (deve ser igual a BOOT_MAGIC).
    pub magic: u64,

    /// Versão do protocolo de boot.
    pub version: u32,
    pub _pad: u32,

    /// Informações de vídeo (GOP).
    pub framebuffer: FramebufferInfo,

    /// Mapa de memória física: ponteiro + número de entradas.
    pub memory_map_addr: u64,
    pub memory_map_len: u64,

    /// Total de memória utilizável (bytes).
    pub total_memory: u64,

    /// Imagem do kernel carregada.
    pub kernel: KernelImageInfo,

    /// ACPI RSDP (0 = não fornecido; o kernel procura manualmente).
    pub rsdp_addr: u64,

    /// Entry point SMBIOS (0 = não fornecido).
    pub smbios_addr: u64,

    /// Offset da janela física linear (0 = identity map).
    pub phys_window_offset: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FramebufferInfo {
    pub addr: u64,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub bpp: u32,
    pub red_mask_size: u8,
    pub red_mask_shift: u8,
    pub green_mask_size: u8,
    pub green_mask_shift: u8,
    pub blue_mask_size: u8,
    pub blue_mask_shift: u8,
    pub _pad: [u8; 2],
}

/// Localização e metadados da imagem do kernel.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct KernelImageInfo {
    /// Arquivo ELF completo em memória (para a tabela de símbolos).
    pub file_base: u64,
    /// Base física onde o kernel foi carregado.
    pub phys_base: u64,
    pub size: u64,
    /// Linha de comando (C string; 0 = vazia).
    pub cmdline_addr: u64,
    /// Seções de símbolos entregues pelo loader (estilo multiboot).
    pub symbols: SymbolSections,
}

/// Informações das seções ELF passadas pelo loader quando o arquivo
/// completo não está disponível.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SymbolSections {
    pub num: u64,
    pub entsize: u64,
    pub shndx: u64,
    pub sections_addr: u64,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MemoryMapEntry {
    pub base: u64,
    pub len: u64,
    pub typ: MemoryType,
    pub _pad: u32,
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    Usable = 1,
    Reserved = 2,
    AcpiReclaimable = 3,
    AcpiNvs = 4,
    BadMemory = 5,
    BootloaderReclaimable = 6,
    KernelAndModules = 7,
    Framebuffer = 8,
}

impl BootInfo {
    /// Mapa de memória como slice.
    ///
    /// # Safety
    /// `memory_map_addr`/`memory_map_len` devem descrever uma região
    /// válida (contrato com o bootloader).
    pub unsafe fn memory_map(&self) -> &[MemoryMapEntry] {
        core::slice::from_raw_parts(
            self.memory_map_addr as *const MemoryMapEntry,
            self.memory_map_len as usize,
        )
    }
}
