//! Tasking: processos, threads e o scheduler preemptivo.

pub mod manager;
pub mod scheduler;
pub mod task;

#[cfg(feature = "self_test")]
pub mod test;

use core::sync::atomic::Ordering;

use crate::sys::types::{Upid, Utid};

pub use manager::TaskManager;
pub use task::{TaskState, TrustLevel};

static TASK_MANAGER: spin::Once<TaskManager> = spin::Once::new();

/// Sobe o tasking: constrói o TaskManager (processo kernel + idle) e
/// registra o scheduler no vetor do timer. O primeiro tick depois de
/// habilitar interrupções troca do contexto de boot para a thread
/// principal do kernel.
pub fn init(kernel_entry: u64) {
    TASK_MANAGER.call_once(|| TaskManager::new(kernel_entry));

    crate::core::interrupts::register(
        crate::arch::x86_64::apic::timer::TIMER_VECTOR,
        &scheduler::SCHEDULER_HOOK,
    );

    crate::kinfo!("(Sched) Tasking pronto; aguardando o primeiro tick");
}

/// O TaskManager global (None antes de `init`).
pub fn manager() -> Option<&'static TaskManager> {
    TASK_MANAGER.get()
}

/// Thread em execução neste core (Utid::NONE no contexto de boot).
pub fn current_thread_id() -> Utid {
    Utid(
        crate::core::smp::get_current_cpu()
            .current_thread
            .load(Ordering::Relaxed),
    )
}

/// Processo dono da thread em execução.
pub fn current_process_id() -> Upid {
    let tid = current_thread_id();
    if tid == Utid::NONE {
        return Upid::NONE;
    }
    let Some(manager) = manager() else {
        return Upid::NONE;
    };
    let mut set = manager.set.lock_critical("sched::current_process_id");
    match set.thread_mut(tid) {
        Some(thread) => thread.parent,
        None => Upid::NONE,
    }
}

/// Escreve o errno da thread atual. `false` se não há thread (boot).
pub fn set_current_errno(value: i32) -> bool {
    let tid = current_thread_id();
    if tid == Utid::NONE {
        return false;
    }
    let Some(manager) = manager() else {
        return false;
    };
    let mut set = manager.set.lock_critical("sched::set_current_errno");
    match set.thread_mut(tid) {
        Some(thread) => {
            thread.errno = value;
            true
        }
        None => false,
    }
}

/// Lê o errno da thread atual.
pub fn current_errno() -> Option<i32> {
    let tid = current_thread_id();
    if tid == Utid::NONE {
        return None;
    }
    let manager = manager()?;
    let mut set = manager.set.lock_critical("sched::current_errno");
    set.thread_mut(tid).map(|thread| thread.errno)
}

/// Encerra a thread atual (caminho de falta de usuário).
pub fn kill_current_thread(code: i32) {
    let tid = current_thread_id();
    if tid == Utid::NONE {
        return;
    }
    if let Some(manager) = manager() {
        manager.kill_thread(tid, code);
        crate::kwarn!("(Sched) Thread encerrada por falta, tid=", tid.as_u64());
    }
}

/// Tenta resolver uma falta de página como crescimento da user stack da
/// thread atual. Chamado pelo crash handler antes de classificar a falta.
pub fn try_expand_current_stack(fault_addr: u64) -> bool {
    let tid = current_thread_id();
    if tid == Utid::NONE {
        return false;
    }
    let Some(manager) = manager() else {
        return false;
    };

    // Exceção em contexto de ISR: sem bloquear. Se o lock do conjunto já
    // está tomado neste core, a falta não veio de userspace.
    let Some(mut set) = manager.set.try_lock("sched::try_expand_current_stack") else {
        return false;
    };

    let Some((process, index)) = set.find_thread_mut(tid) else {
        return false;
    };
    let Some(space) = process.address_space.as_ref() else {
        return false;
    };
    let thread = &mut process.threads[index];
    match thread.user_stack.as_mut() {
        Some(stack) => stack.expand(space, fault_addr),
        None => false,
    }
}

/// Cópia do histórico de IPs da thread atual (para o crash screen).
pub fn current_ip_history() -> Option<[u64; task::IP_HISTORY_LEN]> {
    let tid = current_thread_id();
    if tid == Utid::NONE {
        return None;
    }
    let manager = manager()?;
    // Caminho de crash: nunca bloquear.
    let mut set = manager.set.try_lock("sched::current_ip_history")?;
    set.thread_mut(tid).map(|thread| thread.ip_history)
}
