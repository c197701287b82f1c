//! Global Descriptor Table + TSS, um conjunto por core.
//!
//! Layout (fixo, os MSRs de SYSCALL dependem desta ordem):
//! - 0x00: Null
//! - 0x08: Kernel Code (Ring 0)
//! - 0x10: Kernel Data (Ring 0)
//! - 0x18: User Data   (0x1B com RPL 3)
//! - 0x20: User Code   (0x23 com RPL 3)
//! - 0x28: TSS (16 bytes)

use crate::core::smp::MAX_CPU;

pub const KERNEL_CODE: u16 = 0x08;
pub const KERNEL_DATA: u16 = 0x10;
pub const USER_DATA: u16 = 0x18 | 3;
pub const USER_CODE: u16 = 0x20 | 3;
pub const TSS_SELECTOR: u16 = 0x28;

// Descritores de segmento flat de 64 bits
const DESC_KERNEL_CODE: u64 = 0x00AF_9A00_0000_FFFF;
const DESC_KERNEL_DATA: u64 = 0x00CF_9200_0000_FFFF;
const DESC_USER_DATA: u64 = 0x00CF_F200_0000_FFFF;
const DESC_USER_CODE: u64 = 0x00AF_FA00_0000_FFFF;

/// Task State Segment (64-bit).
#[repr(C, packed)]
pub struct Tss {
    reserved0: u32,
    /// Stack de Ring 0 usada quando uma interrupção chega de Ring 3.
    pub rsp0: u64,
    rsp1: u64,
    rsp2: u64,
    reserved1: u64,
    ist: [u64; 7],
    reserved2: u64,
    reserved3: u16,
    iomap_base: u16,
}

impl Tss {
    const fn new() -> Self {
        Self {
            reserved0: 0,
            rsp0: 0,
            rsp1: 0,
            rsp2: 0,
            reserved1: 0,
            ist: [0; 7],
            reserved2: 0,
            reserved3: 0,
            iomap_base: core::mem::size_of::<Tss>() as u16,
        }
    }
}

/// GDT de um core: 5 descritores de 8 bytes + TSS de 16 bytes.
#[repr(C, align(16))]
struct GdtTable {
    entries: [u64; 7],
}

impl GdtTable {
    const fn new() -> Self {
        Self {
            entries: [
                0,
                DESC_KERNEL_CODE,
                DESC_KERNEL_DATA,
                DESC_USER_DATA,
                DESC_USER_CODE,
                0, // TSS low (preenchido no init)
                0, // TSS high
            ],
        }
    }
}

/// Ponteiro carregado pelo LGDT.
#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u64,
}

static mut GDTS: [GdtTable; MAX_CPU] = [const { GdtTable::new() }; MAX_CPU];
static mut TSSS: [Tss; MAX_CPU] = [const { Tss::new() }; MAX_CPU];

core::arch::global_asm!(
    r#"
.global gdt_reload
gdt_reload:
    lgdt [rdi]
    mov ax, 0x10
    mov ds, ax
    mov es, ax
    mov ss, ax
    xor eax, eax
    mov fs, ax
    mov gs, ax
    // Recarregar CS via far-return para o chamador
    pop rcx
    push 0x08
    push rcx
    retfq
"#
);

extern "C" {
    fn gdt_reload(pointer: *const u8);
}

/// Constrói o descritor de TSS (16 bytes) para um endereço base.
fn tss_descriptor(base: u64) -> (u64, u64) {
    let limit = (core::mem::size_of::<Tss>() - 1) as u64;
    let low = (limit & 0xFFFF)
        | ((base & 0xFF_FFFF) << 16)
        | (0x89u64 << 40) // Present | Type = TSS 64-bit disponível
        | (((limit >> 16) & 0xF) << 48)
        | (((base >> 24) & 0xFF) << 56);
    let high = base >> 32;
    (low, high)
}

/// Inicializa e carrega a GDT + TSS do core.
///
/// # Safety
/// Chamar uma vez por core, antes de habilitar interrupções. Escrever no
/// seletor GS zera o GS Base escondido: configurar MSR_GS_BASE DEPOIS.
pub unsafe fn init(core_id: usize) {
    let tss_base = core::ptr::addr_of!(TSSS[core_id]) as u64;
    let (tss_low, tss_high) = tss_descriptor(tss_base);

    let gdt = &mut *core::ptr::addr_of_mut!(GDTS[core_id]);
    gdt.entries[5] = tss_low;
    gdt.entries[6] = tss_high;

    let pointer = GdtPointer {
        limit: (core::mem::size_of::<GdtTable>() - 1) as u16,
        base: gdt as *const GdtTable as u64,
    };

    gdt_reload(&pointer as *const GdtPointer as *const u8);

    // Carregar o Task Register
    core::arch::asm!(
        "ltr ax",
        in("ax") TSS_SELECTOR,
        options(nomem, nostack, preserves_flags),
    );

    crate::ktrace!("(Arch) GDT/TSS carregada no core=", core_id as u64);
}

/// Atualiza a stack de Ring 0 do core (usada em interrupções vindas de
/// Ring 3). O scheduler chama a cada troca de contexto.
///
/// # Safety
/// `rsp0` deve ser o topo de uma kernel stack válida e mapeada.
pub unsafe fn set_ring0_stack(core_id: usize, rsp0: u64) {
    let tss = &mut *core::ptr::addr_of_mut!(TSSS[core_id]);
    tss.rsp0 = rsp0;
}
