//! Crash handler: o caminho terminal de exceções.
//!
//! Fluxo em uma exceção:
//! 1. Interrupções desabilitadas.
//! 2. Falta de página na janela de guarda da user stack → o stack guard
//!    estende a stack e a instrução é reexecutada (único caminho que
//!    retorna).
//! 3. Falta vinda de Ring 3 → handler de exceção de usuário (a thread
//!    infratora é encerrada; o kernel segue vivo).
//! 4. Falta em modo kernel → tela de diagnóstico completa (registradores,
//!    registradores de controle/debug, decodificação do error code,
//!    backtrace por RBP, anel de frames de interrupção, histórico de IPs
//!    da thread) e congelamento definitivo da CPU.

mod screens;

use crate::arch::x86_64::cpu::Cpu;
use crate::core::interrupts::TrapFrame;

/// Vetor de falta de página.
const VECTOR_PAGE_FAULT: u64 = 14;

/// Nome legível de cada exceção da CPU.
fn exception_name(vector: u64) -> &'static str {
    match vector {
        0 => "Divide by zero",
        1 => "Debug",
        2 => "Non-maskable interrupt",
        3 => "Breakpoint",
        4 => "Overflow",
        5 => "Bound range exceeded",
        6 => "Invalid opcode",
        7 => "Device not available",
        8 => "Double fault",
        9 => "Coprocessor segment overrun",
        10 => "Invalid TSS",
        11 => "Segment not present",
        12 => "Stack segment fault",
        13 => "General protection fault",
        14 => "Page fault",
        16 => "x87 floating point",
        17 => "Alignment check",
        18 => "Machine check",
        19 => "SIMD floating point",
        20 => "Virtualization",
        30 => "Security",
        _ => "Unknown",
    }
}

/// Entrada do caminho de crash, chamada pelo funil de interrupções para
/// todo vetor < 32. Só retorna quando a falta foi resolvida (crescimento
/// de stack) ou quando a exceção veio de userspace.
pub fn handle(frame: &mut TrapFrame) {
    // SAFETY: caminho de crash; nada mais pode nos interromper.
    unsafe { Cpu::disable_interrupts() };

    // Crescimento preguiçoso de user stack: se a falta cair na janela de
    // guarda, o guard mapeia mais um grânulo e a instrução reexecuta.
    if frame.int_num == VECTOR_PAGE_FAULT {
        let fault_addr = Cpu::read_cr2();
        if crate::sched::try_expand_current_stack(fault_addr) {
            crate::kdebug!("(Crash) Stack estendida para fault=", fault_addr);
            return;
        }
    }

    crate::kerror!("(Crash) Excecao, vetor=", frame.int_num);

    if frame.is_user() {
        user_mode_exception(frame);
        return;
    }

    kernel_mode_exception(frame);
}

/// Exceção vinda de Ring 3: a thread infratora morre, o sistema segue.
/// (Ponto de entrada natural para entrega de sinais, quando existirem.)
fn user_mode_exception(frame: &mut TrapFrame) {
    crate::kerror!("(Crash) Falta em processo de usuario");
    crate::kerror!("  RIP=", frame.rip);
    crate::kerror!("  Vetor=", frame.int_num);
    if frame.int_num == VECTOR_PAGE_FAULT {
        crate::kerror!("  CR2=", Cpu::read_cr2());
    }

    crate::sched::kill_current_thread(-1);
    // O scheduler pula threads Terminated; o próximo tick troca o contexto.
}

/// Exceção em modo kernel: renderiza o diagnóstico e congela.
fn kernel_mode_exception(frame: &mut TrapFrame) -> ! {
    crate::kerror!("==================== KERNEL CRASH ====================");
    crate::klog!("  ");
    crate::klog!(exception_name(frame.int_num));
    crate::klog!("  (vetor=", frame.int_num, ")");
    crate::knl!();

    screens::detail_screen(frame);
    screens::register_screen(frame);
    screens::backtrace_screen(frame);
    screens::interrupt_frames_screen();
    screens::ip_history_screen();

    freeze();
}

/// Congela a CPU para sempre. Nenhum estado é recuperado.
pub fn freeze() -> ! {
    crate::kerror!("(Crash) CPU congelada.");
    Cpu::stop();
}
