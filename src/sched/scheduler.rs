//! Scheduler preemptivo dirigido pelo timer do APIC.
//!
//! O scheduler é um handler de interrupção comum: registra-se no vetor
//! do timer na subida do tasking — o funil de interrupções não tem
//! conhecimento estático dele.
//!
//! A troca de contexto é por frame-swap: o `TrapFrame` salvo pelo stub é
//! copiado para a thread que sai e substituído pelo da thread que entra;
//! o `iretq` do stub completa a troca.
//!
//! Política de preempção: o kernel não é preemptível. A troca só
//! acontece quando o tick interrompe código de usuário, quando a thread
//! atual declarou um estado não-Running (sleep/wait/exit — o contexto
//! dela está na própria kernel stack, em ponto seguro), ou quando o
//! interrompido é o idle/contexto de boot.
//!
//! Seleção: prioridade estática descendente, round-robin dentro da mesma
//! prioridade, afinidade respeitada. Sem thread Ready, entra o idle.

use core::sync::atomic::Ordering;

use crate::arch::x86_64::cpu::{Cpu, MSR_FS_BASE, MSR_KERNEL_GS_BASE};
use crate::arch::x86_64::interrupts::TrapFrame;
use crate::core::config::SchedulerMode;
use crate::core::interrupts::InterruptHandler;
use crate::sys::types::Utid;

use super::manager::TaskSet;
use super::task::{TaskState, WaitTarget};

/// Duração nominal de um tick (timer do APIC em 1 ms).
pub const TICK_NS: u64 = 1_000_000;

/// O handler registrado no vetor do timer.
pub struct SchedulerHook;

pub static SCHEDULER_HOOK: SchedulerHook = SchedulerHook;

impl InterruptHandler for SchedulerHook {
    fn on_interrupt(&self, frame: &mut TrapFrame) {
        schedule(frame);
    }
}

/// Corpo da thread idle: halt até a próxima interrupção, para sempre.
pub extern "C" fn idle_thread_entry() -> ! {
    loop {
        // SAFETY: idle roda em Ring 0 com a própria stack.
        unsafe { Cpu::enable_interrupts() };
        Cpu::halt();
    }
}

/// Um passo de escalonamento, executado a cada tick do timer.
pub fn schedule(frame: &mut TrapFrame) {
    let Some(manager) = super::manager() else {
        return;
    };

    // ISR: interrupções já desabilitadas; código fora de ISR usa
    // lock_critical nas mesmas estruturas.
    let mut set = manager.set.lock("scheduler::schedule");

    let cpu = crate::core::smp::get_current_cpu();
    let core = cpu.id as usize;
    let current_tid = Utid(cpu.current_thread.load(Ordering::Relaxed));
    let now = crate::core::time::uptime_ns();

    // 1. Envelhecer contadores da thread atual e amostrar o RIP
    let mut current_state = TaskState::Unknown;
    if let Some(thread) = set.thread_mut(current_tid) {
        if frame.is_user() {
            thread.info.user_time += TICK_NS;
        } else {
            thread.info.kernel_time += TICK_NS;
        }
        thread.info.usage[core] += 1;
        thread.record_ip(frame.rip);
        current_state = thread.state;
    }
    let current_is_idle = current_tid != Utid::NONE && current_tid == set.idle_tid;

    // 2. Acordar dormentes com deadline vencido e esperas satisfeitas
    wake_tasks(&mut set, now);

    // 3. Modo single-tasking: a thread atual só sai se deixar de Running
    if crate::core::config::config().scheduler == SchedulerMode::Single
        && current_state == TaskState::Running
        && !current_is_idle
    {
        return;
    }

    // 4. Elegibilidade de troca (ver doc do módulo)
    let can_switch = frame.is_user()
        || current_tid == Utid::NONE
        || current_is_idle
        || (current_state != TaskState::Running && current_state != TaskState::Unknown);
    if !can_switch {
        return;
    }

    // 5. Selecionar a próxima thread
    let next_tid = match pick_next(&set, core, current_tid) {
        Some(tid) => tid,
        None => {
            // Sem Ready: quem pode continuar, continua; quem não pode
            // (dormindo/esperando/terminado) cede para o idle.
            if current_tid != Utid::NONE
                && current_state != TaskState::Running
                && current_state != TaskState::Unknown
            {
                set.idle_tid
            } else {
                return;
            }
        }
    };

    if next_tid == current_tid || next_tid == Utid::NONE {
        return;
    }

    // 6. Commit do frame na thread que sai
    if let Some(thread) = set.thread_mut(current_tid) {
        thread.registers = *frame;
        // SAFETY: área de 512 bytes alinhada a 16, da própria thread.
        unsafe { Cpu::fxsave(thread.fpu.0.as_mut_ptr()) };
        if thread.state == TaskState::Running {
            thread.state = TaskState::Ready;
        }
    }

    // 7. Restaurar a thread que entra
    let next_root = {
        let Some((process, index)) = set.find_thread_mut(next_tid) else {
            crate::kerror!("(Sched) Thread escolhida sumiu, tid=", next_tid.as_u64());
            return;
        };
        let root = process.space().root();
        let thread = &mut process.threads[index];

        thread.state = TaskState::Running;
        *frame = thread.registers;
        // SAFETY: área salva por fxsave anterior (ou zerada na criação).
        unsafe { Cpu::fxrstor(thread.fpu.0.as_ptr()) };

        let kernel_stack_top = thread.kernel_stack.top();
        cpu.current_thread.store(next_tid.as_u64(), Ordering::Relaxed);
        cpu.fpu
            .store(thread.fpu.0.as_ptr() as u64, Ordering::Relaxed);
        cpu.syscall_kernel_stack
            .store(kernel_stack_top, Ordering::Relaxed);
        // Interrupções vindas de Ring 3 usam a kernel stack da thread
        // SAFETY: topo de stack válido e mapeado.
        unsafe { crate::arch::x86_64::gdt::set_ring0_stack(core, kernel_stack_top) };

        // Bases de segmento da thread. KERNEL_GS_BASE guarda o GS de
        // usuário da thread (um swapgs na volta a Ring 3 o ativa) —
        // escrito em toda troca porque o trampolim de fork também faz
        // swapgs saindo de um frame de kernel.
        // SAFETY: MSRs de base de segmento, Ring 0.
        unsafe {
            Cpu::write_msr(MSR_FS_BASE, thread.fs_base);
            Cpu::write_msr(MSR_KERNEL_GS_BASE, thread.gs_base);
        }

        root
    };

    // 8. Trocar de address space se o processo mudou
    let current_root = Cpu::read_page_table() & !0xFFFu64;
    if current_root != next_root {
        // SAFETY: raiz construída pelo VMM com a metade de kernel presente.
        unsafe { Cpu::write_page_table(next_root) };
    }
}

/// Acorda threads Sleeping com deadline vencido e Waiting com o alvo
/// já terminado.
fn wake_tasks(set: &mut TaskSet, now: u64) {
    let mut p_index = 0usize;
    while p_index < set.processes.len() {
        let mut t_index = 0usize;
        while t_index < set.processes[p_index].threads.len() {
            let (state, target, deadline) = {
                let thread = &set.processes[p_index].threads[t_index];
                (thread.state, thread.wait_target, thread.info.sleep_until)
            };

            match state {
                TaskState::Sleeping => {
                    if deadline != 0 && deadline <= now {
                        let thread = &mut set.processes[p_index].threads[t_index];
                        thread.state = TaskState::Ready;
                        thread.info.sleep_until = 0;
                    }
                }
                TaskState::Waiting => {
                    let wake = match target {
                        WaitTarget::Thread(tid) => set.thread_is_gone(tid),
                        WaitTarget::Process(pid) => set.process_is_gone(pid),
                        WaitTarget::None => true,
                    };
                    if wake {
                        let thread = &mut set.processes[p_index].threads[t_index];
                        thread.state = TaskState::Ready;
                        thread.wait_target = WaitTarget::None;
                    }
                }
                _ => {}
            }

            t_index += 1;
        }
        p_index += 1;
    }
}

/// Seleção: maior prioridade entre as Ready com afinidade para este
/// core; round-robin dentro da classe (primeira candidata DEPOIS da
/// thread atual na ordem de varredura, com wrap).
fn pick_next(set: &TaskSet, core: usize, current_tid: Utid) -> Option<Utid> {
    // Passo 1: prioridade máxima entre as candidatas
    let mut max_priority: Option<i32> = None;
    for process in set.processes.iter() {
        for thread in process.threads.iter() {
            if thread.id == set.idle_tid {
                continue;
            }
            if thread.state != TaskState::Ready || !thread.info.affinity[core] {
                continue;
            }
            if max_priority.is_none() || thread.info.priority > max_priority.unwrap_or(i32::MIN) {
                max_priority = Some(thread.info.priority);
            }
        }
    }
    let max_priority = max_priority?;

    // Passo 2: round-robin dentro da classe
    let mut first_match: Option<Utid> = None;
    let mut after_match: Option<Utid> = None;
    let mut passed_current = current_tid == Utid::NONE;

    for process in set.processes.iter() {
        for thread in process.threads.iter() {
            let candidate = thread.id != set.idle_tid
                && thread.state == TaskState::Ready
                && thread.info.affinity[core]
                && thread.info.priority == max_priority;

            if candidate {
                if first_match.is_none() {
                    first_match = Some(thread.id);
                }
                if passed_current && after_match.is_none() {
                    after_match = Some(thread.id);
                }
            }

            if thread.id == current_tid {
                passed_current = true;
            }
        }
    }

    after_match.or(first_match)
}
