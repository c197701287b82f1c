//! Telas do crash handler.
//!
//! Cada tela emite um bloco de diagnóstico pela serial. Nenhuma aloca
//! memória: o heap pode ser exatamente o que corrompeu.

use crate::arch::x86_64::cpu::{Cpu, MSR_EFER, MSR_FS_BASE, MSR_GS_BASE};
use crate::core::interrupts::{interrupt_frames, TrapFrame};
use crate::core::symbols;

/// Máximo de frames seguidos na caminhada de RBP.
const BACKTRACE_MAX_FRAMES: usize = 100;

/// As oito causas canônicas de falta de página (indexadas por P|W|U).
const PAGE_FAULT_CAUSES: [&str; 8] = [
    "Supervisory process tried to read a non-present page entry",
    "Supervisory process tried to read a page and caused a protection fault",
    "Supervisory process tried to write to a non-present page entry",
    "Supervisory process tried to write a page and caused a protection fault",
    "User process tried to read a non-present page entry",
    "User process tried to read a page and caused a protection fault",
    "User process tried to write to a non-present page entry",
    "User process tried to write a page and caused a protection fault",
];

fn flag(frame_bit: bool) -> &'static str {
    if frame_bit {
        "1"
    } else {
        "0"
    }
}

/// Detalhe específico da exceção, extraído do error code.
pub fn detail_screen(frame: &TrapFrame) {
    match frame.int_num {
        14 => {
            let err = frame.error_code;
            crate::kerror!("Page fault em=", Cpu::read_cr2());
            crate::klog!("  P=");
            crate::klog!(flag(err & 1 != 0));
            crate::klog!("  W=");
            crate::klog!(flag(err & 2 != 0));
            crate::klog!("  U=");
            crate::klog!(flag(err & 4 != 0));
            crate::klog!("  R=");
            crate::klog!(flag(err & 8 != 0));
            crate::klog!("  I=");
            crate::klog!(flag(err & 16 != 0));
            crate::klog!("  PK=");
            crate::klog!(flag(err & 32 != 0));
            crate::klog!("  SS=");
            crate::klog!(flag(err & 64 != 0));
            crate::klog!("  SGX=");
            crate::klog!(flag(err & (1 << 15) != 0));
            crate::knl!();
            crate::klog!("  ");
            crate::klog!(PAGE_FAULT_CAUSES[(err & 0b111) as usize]);
            crate::knl!();
        }
        10 | 11 | 12 | 13 => {
            // Error code de segmento: índice do seletor + origem
            let err = frame.error_code;
            crate::klog!("  Seletor=", (err >> 3) & 0x1FFF);
            crate::klog!("  External=");
            crate::klog!(flag(err & 1 != 0));
            crate::klog!("  Tabela=", (err >> 1) & 0b11);
            crate::knl!();
        }
        _ => {
            if frame.error_code != 0 {
                crate::klog!("  Error code=", frame.error_code);
                crate::knl!();
            }
        }
    }
}

/// Dump de registradores gerais, de controle e de debug.
pub fn register_screen(frame: &TrapFrame) {
    crate::kerror!("Registradores:");
    crate::klog!("  RAX=", frame.rax, "  RBX=", frame.rbx);
    crate::knl!();
    crate::klog!("  RCX=", frame.rcx, "  RDX=", frame.rdx);
    crate::knl!();
    crate::klog!("  RSI=", frame.rsi, "  RDI=", frame.rdi);
    crate::knl!();
    crate::klog!("  RBP=", frame.rbp, "  RSP=", frame.rsp);
    crate::knl!();
    crate::klog!("  R8=", frame.r8, "  R9=", frame.r9);
    crate::knl!();
    crate::klog!("  R10=", frame.r10, "  R11=", frame.r11);
    crate::knl!();
    crate::klog!("  R12=", frame.r12, "  R13=", frame.r13);
    crate::knl!();
    crate::klog!("  R14=", frame.r14, "  R15=", frame.r15);
    crate::knl!();
    crate::klog!("  RIP=", frame.rip, "  RFLAGS=", frame.rflags);
    crate::knl!();
    crate::klog!("  CS=", frame.cs, "  SS=", frame.ss);
    crate::knl!();

    // SAFETY: leitura de MSRs em Ring 0.
    let (fs, gs, efer) = unsafe {
        (
            Cpu::read_msr(MSR_FS_BASE),
            Cpu::read_msr(MSR_GS_BASE),
            Cpu::read_msr(MSR_EFER),
        )
    };
    crate::klog!("  FS=", fs, "  GS=", gs);
    crate::knl!();

    crate::kerror!("Registradores de controle:");
    crate::klog!("  CR0=", Cpu::read_cr0(), "  CR2=", Cpu::read_cr2());
    crate::knl!();
    crate::klog!("  CR3=", Cpu::read_page_table(), "  CR4=", Cpu::read_cr4());
    crate::knl!();
    crate::klog!("  CR8=", Cpu::read_cr8(), "  EFER=", efer);
    crate::knl!();

    let dr = Cpu::read_debug_registers();
    crate::kerror!("Registradores de debug:");
    crate::klog!("  DR0=", dr[0], "  DR1=", dr[1]);
    crate::knl!();
    crate::klog!("  DR2=", dr[2], "  DR3=", dr[3]);
    crate::knl!();
    crate::klog!("  DR6=", dr[4], "  DR7=", dr[5]);
    crate::knl!();
}

/// Um endereço é seguro de dereferenciar durante o crash?
fn is_readable(addr: u64) -> bool {
    if addr == 0 {
        return false;
    }
    // Canônico?
    let high = addr >> 47;
    if high != 0 && high != 0x1_FFFF {
        return false;
    }
    crate::mm::vmm::kernel_space().check(addr, crate::mm::vmm::PtFlags::P)
}

fn print_trace_line(address: u64, suffix: &str) {
    crate::klog!("  ", address);
    crate::klog!(" - ");
    crate::klog!(symbols::resolve(address));
    crate::klog!(suffix);
    crate::knl!();
}

/// Backtrace pela cadeia de RBPs salvos.
pub fn backtrace_screen(frame: &TrapFrame) {
    crate::kerror!("Stack trace:");
    print_trace_line(frame.rip, " <- excecao");

    let mut rbp = frame.rbp;
    let mut depth = 0usize;
    while depth < BACKTRACE_MAX_FRAMES {
        if !is_readable(rbp) || !is_readable(rbp + 8) {
            break;
        }
        // SAFETY: endereços validados acima; CPU congelando, sem corrida.
        let return_address = unsafe { core::ptr::read_volatile((rbp + 8) as *const u64) };
        if return_address == 0 {
            break;
        }
        print_trace_line(return_address, "");
        rbp = unsafe { core::ptr::read_volatile(rbp as *const u64) };
        depth += 1;
    }

    if depth == 0 {
        crate::kerror!("  < sem stack trace disponivel >");
    }
}

/// Entradas mais recentes do anel de frames de interrupção.
pub fn interrupt_frames_screen() {
    crate::kerror!("Frames de interrupcao recentes:");
    let frames = interrupt_frames();
    let mut shown = 0usize;
    for address in frames.iter().take(8) {
        if *address == 0 {
            continue;
        }
        print_trace_line(*address, "");
        shown += 1;
    }
    if shown == 0 {
        crate::kerror!("  < nenhum >");
    }
}

/// Histórico de IPs da thread atual, com repetições consecutivas
/// colapsadas depois de 3 ocorrências.
pub fn ip_history_screen() {
    let Some(history) = crate::sched::current_ip_history() else {
        return;
    };

    crate::kerror!("Historico de IPs da thread:");
    let mut last: u64 = 0;
    let mut repeats = 0usize;
    for address in history.iter() {
        if *address == 0 {
            break;
        }
        if *address == last {
            repeats += 1;
            if repeats > 3 {
                continue;
            }
        } else {
            repeats = 0;
        }
        last = *address;
        print_trace_line(*address, "");
    }
    crate::kerror!("  (RIPs iguais nao aparecem mais de 3 vezes)");
}
