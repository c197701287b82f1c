//! Configuração e entrada de System Calls (SYSCALL/SYSRET).
//!
//! MSRs importantes:
//! - EFER  (0xC0000080): bit 0 (SCE) habilita SYSCALL.
//! - STAR  (0xC0000081): seletores de segmento para kernel/user.
//! - LSTAR (0xC0000082): RIP de destino do SYSCALL.
//! - FMASK (0xC0000084): máscara de RFLAGS (limpa IF na entrada).
//!
//! A entrada troca para a stack de syscall do core (via GS Base →
//! `CpuData`), empilha um `SysFrm` completo, despacha e retorna com
//! SYSRETQ (RCX = endereço de retorno, R11 = RFLAGS do usuário).

use crate::arch::x86_64::cpu::{Cpu, MSR_EFER};

const MSR_STAR: u32 = 0xC0000081;
const MSR_LSTAR: u32 = 0xC0000082;
const MSR_FMASK: u32 = 0xC0000084;

const EFER_SCE: u64 = 1; // System Call Extensions
const EFER_NXE: u64 = 1 << 11; // No-Execute Enable
const RFLAGS_IF: u64 = 1 << 9;

/// Estado salvo na entrada de syscall.
///
/// O layout DEVE corresponder à ordem de push em `syscall_entry`.
/// `return_address` é o RCX capturado pelo hardware (RIP seguinte ao
/// SYSCALL); `stack_pointer` é o RSP do usuário.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SysFrm {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    /// RFLAGS do usuário (capturado em R11 pelo hardware).
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

    pub return_address: u64,
    pub stack_pointer: u64,
}

core::arch::global_asm!(
    r#"
.global syscall_entry
syscall_entry:
    swapgs
    mov gs:[0], rsp          // salvar RSP do usuário no CpuData
    mov rsp, gs:[8]          // stack de syscall do core
    sub rsp, 8               // 17 pushes + este pad = RSP alinhado no call

    // Construir SysFrm (campos altos primeiro)
    push qword ptr gs:[0]    // stack_pointer
    push rcx                 // return_address
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

    mov rdi, rsp
    cld
    call syscall_handler

    // Retorno da syscall vai no slot de RAX do frame (offset 14*8)
    mov [rsp + 112], rax

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

    // Descartar return_address + stack_pointer
    add rsp, 16

    mov rsp, gs:[0]          // restaurar RSP do usuário
    swapgs
    sysretq
"#
);

extern "C" {
    /// Símbolo definido no global_asm acima.
    pub fn syscall_entry();
}

/// Inicializa o mecanismo de SYSCALL/SYSRET no core atual.
///
/// # Safety
/// Requer Ring 0; chamar uma vez por core, com o GS Base do core já
/// apontando para o `CpuData`.
pub unsafe fn init() {
    // 1. Habilitar SYSCALL e NX no EFER
    let efer = Cpu::read_msr(MSR_EFER);
    let new_efer = efer | EFER_SCE | EFER_NXE;
    if new_efer != efer {
        Cpu::write_msr(MSR_EFER, new_efer);
    }

    // 2. LSTAR: destino do SYSCALL
    Cpu::write_msr(MSR_LSTAR, syscall_entry as usize as u64);

    // 3. STAR: seletores
    //
    // SYSCALL: CS = STAR[47:32] = 0x08, SS = 0x08 + 8 = 0x10
    // SYSRET:  CS = STAR[63:48] + 16 = 0x23, SS = STAR[63:48] + 8 = 0x1B
    // Com a GDT (kcode 0x08, kdata 0x10, udata 0x18, ucode 0x20):
    // base de sysret = 0x13 (user data com RPL3 menos 8).
    let syscall_base: u64 = 0x08;
    let sysret_base: u64 = 0x13;
    Cpu::write_msr(MSR_STAR, (sysret_base << 48) | (syscall_base << 32));

    // 4. FMASK: limpar IF na entrada (o kernel decide quando reabilitar)
    Cpu::write_msr(MSR_FMASK, RFLAGS_IF);

    crate::ktrace!("(Syscall) MSRs SYSCALL/SYSRET programados");
}
