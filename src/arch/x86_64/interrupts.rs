//! Stubs de interrupção e TrapFrame (x86_64).
//!
//! Os 256 vetores são gerados por macro assembly e convergem em
//! `int_common`, que salva o estado completo da CPU em um `TrapFrame`
//! e chama o funil único de despacho (`core::interrupts::dispatch`).
//!
//! Vetores com error code de hardware: 8, 10-14, 17, 21, 29, 30.
//! Os demais recebem um placeholder 0 para manter o layout uniforme.

/// Estado completo salvo na entrada de qualquer interrupção.
///
/// O layout DEVE corresponder exatamente à ordem de push em `int_common`
/// (GPRs), ao par vetor/error-code dos stubs e ao frame de hardware.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct TrapFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,

    /// Número do vetor (empilhado pelo stub).
    pub int_num: u64,
    /// Error code do hardware, ou 0.
    pub error_code: u64,

    // Frame de hardware
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

impl TrapFrame {
    /// A interrupção veio de Ring 3?
    #[inline]
    pub fn is_user(&self) -> bool {
        (self.cs & 3) == 3
    }
}

impl Default for TrapFrame {
    fn default() -> Self {
        // SAFETY: todos os campos são u64, zero é um estado válido.
        unsafe { core::mem::zeroed() }
    }
}

core::arch::global_asm!(
    r#"
.altmacro

// Um stub por vetor. Vetores com error code só empilham o número;
// os demais empilham o placeholder antes.
.macro int_stub_def vec
int_stub_\vec:
.if (\vec == 8) || ((\vec >= 10) && (\vec <= 14)) || (\vec == 17) || (\vec == 21) || (\vec == 29) || (\vec == 30)
    push \vec
.else
    push 0
    push \vec
.endif
    jmp int_common
.endm

.set v, 0
.rept 256
    int_stub_def %v
    .set v, v + 1
.endr

// Tabela de endereços consumida pelo init da IDT
.global INT_STUB_TABLE
.balign 8
INT_STUB_TABLE:
.macro int_stub_addr vec
    .quad int_stub_\vec
.endm
.set v, 0
.rept 256
    int_stub_addr %v
    .set v, v + 1
.endr

.noaltmacro

// Funil comum: salva GPRs, swapgs se viemos de Ring 3, chama o
// dispatcher Rust com RDI = ponteiro para o TrapFrame, desfaz tudo.
// CS está em [rsp + 144]: 15 GPRs + vetor + error code = 17 slots,
// RIP no 18º, CS no 19º (offset 18*8).
int_common:
    push rax
    push rbx
    push rcx
    push rdx
    push rsi
    push rdi
    push rbp
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15

    test byte ptr [rsp + 144], 3
    jz 1f
    swapgs
1:
    mov rdi, rsp
    cld
    call interrupt_dispatch

    test byte ptr [rsp + 144], 3
    jz 2f
    swapgs
2:
    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rbp
    pop rdi
    pop rsi
    pop rdx
    pop rcx
    pop rbx
    pop rax

    // Descartar vetor + error code
    add rsp, 16
    iretq
"#
);

extern "C" {
    static INT_STUB_TABLE: [u64; 256];
}

/// Tabela de stubs para o init da IDT.
pub fn stub_table() -> &'static [u64; 256] {
    // SAFETY: tabela imutável gerada pelo assembler.
    unsafe { &*core::ptr::addr_of!(INT_STUB_TABLE) }
}

/// Ponto de entrada Rust de TODAS as interrupções.
#[no_mangle]
extern "C" fn interrupt_dispatch(frame: *mut TrapFrame) {
    // SAFETY: o stub garante um TrapFrame completo e exclusivo na stack.
    crate::core::interrupts::dispatch(unsafe { &mut *frame });
}
