//! Syscalls de processo: fork, exit, sleep.

use crate::arch::x86_64::gdt::{KERNEL_CODE, KERNEL_DATA};
use crate::sched::task::TaskState;
use crate::sys::types::{Upid, Utid};
use crate::sys::Errno;

use super::SysFrm;

/// Trampolim de retorno do filho de fork.
///
/// O scheduler entrega o filho aqui (Ring 0, com R8 = RSP de usuário e
/// RCX = endereço de retorno do syscall do pai). Zera RAX — o fork
/// retorna 0 no filho — restaura a stack do usuário e volta com SYSRETQ.
#[unsafe(naked)]
unsafe extern "C" fn sys_fork_return() -> ! {
    core::arch::naked_asm!(
        "xor rax, rax",
        "mov rsp, r8",
        "mov rbp, r8",
        "swapgs",
        "sti",
        "sysretq",
    );
}

/// fork(): duplica o processo atual.
///
/// O filho nasce com: page table forkeada (mesma memória visível de
/// usuário no instante do fork), uma única thread com cópia profunda dos
/// registradores do pai, kernel stack nova, user stack forkeada, FPU
/// copiada e a tabela de file descriptors com o mesmo conteúdo. O pai
/// recebe o PID do filho; o filho acorda com 0.
pub fn sys_fork(frame: &mut SysFrm) -> isize {
    let Some(manager) = crate::sched::manager() else {
        return Errno::EAGAIN.as_isize();
    };
    let parent_tid = crate::sched::current_thread_id();
    let parent_pid = crate::sched::current_process_id();
    if parent_pid == Upid::NONE || parent_tid == Utid::NONE {
        return Errno::EAGAIN.as_isize();
    }

    // Fase 1: snapshot do pai (e fork do address space) sob o lock
    let (parent_name, thread_name, trust, arch, compat, critical, fs_base, gs_base, fpu_copy, forked_space, fd_copy) = {
        let mut set = manager.set.lock_critical("sys_fork::snapshot");
        let Some((process, index)) = set.find_thread_mut(parent_tid) else {
            return Errno::ESRCH.as_isize();
        };

        let forked_space = process.address_space.as_ref().map(|space| space.fork());
        let fd_copy = process.fd_table.clone();
        let parent_name = process.name;
        let trust = process.security.trust_level;

        let thread = &process.threads[index];
        (
            parent_name,
            thread.name,
            trust,
            thread.info.architecture,
            thread.info.compatibility,
            thread.security.is_critical,
            thread.fs_base,
            thread.gs_base,
            thread.fpu.0,
            forked_space,
            fd_copy,
        )
    };

    // Fase 2: criar o processo filho e trocar o espaço novo pelo forkeado
    let child_pid = manager.create_process(parent_pid, parent_name.as_str(), trust);
    {
        let mut set = manager.set.lock_critical("sys_fork::swap_space");
        if let Some(child) = set.find_process_mut(child_pid) {
            // O espaço criado por create_process é descartado; o filho
            // observa a memória do pai no instante do fork.
            child.address_space = forked_space;
            child.fd_table = fd_copy;
        }
    }

    // Fase 3: thread filha (Stopped até os registradores estarem prontos)
    let Some(child_tid) =
        manager.create_thread_with_state(child_pid, 0, 0, 0, 0, TaskState::Stopped)
    else {
        crate::kerror!("(Syscall) fork: falha ao criar thread filha");
        manager.kill_process(child_pid, -1);
        return Errno::EAGAIN.as_isize();
    };

    // Fase 4: montar o contexto do filho
    {
        let mut set = manager.set.lock_critical("sys_fork::wire_child");

        // Índices do pai e do filho para split borrow do conjunto
        let parent_index = set.processes.iter().position(|p| p.id == parent_pid);
        let child_index = set.processes.iter().position(|p| p.id == child_pid);
        let (Some(parent_index), Some(child_index)) = (parent_index, child_index) else {
            return Errno::ESRCH.as_isize();
        };

        let (parent_process, child_process) = if parent_index < child_index {
            let (left, right) = set.processes.split_at_mut(child_index);
            (&mut *left[parent_index], &mut *right[0])
        } else {
            let (left, right) = set.processes.split_at_mut(parent_index);
            (&mut *right[0], &mut *left[child_index])
        };

        let Some(child_thread) = child_process
            .threads
            .iter_mut()
            .find(|t| t.id == child_tid)
        else {
            return Errno::ESRCH.as_isize();
        };

        // Registradores: cópia profunda do estado do pai no syscall.
        // O filho executa o trampolim em Ring 0 na própria kernel stack.
        let registers = &mut child_thread.registers;
        registers.r15 = frame.r15;
        registers.r14 = frame.r14;
        registers.r13 = frame.r13;
        registers.r12 = frame.r12;
        registers.r11 = frame.r11; // RFLAGS do usuário (para o sysretq)
        registers.r10 = frame.r10;
        registers.r9 = frame.r9;
        registers.rbx = frame.rbx;
        registers.rdi = frame.rdi;
        registers.rsi = frame.rsi;
        registers.rdx = frame.rdx;
        registers.rbp = frame.rbp;
        registers.rcx = frame.return_address; // destino do sysretq
        registers.r8 = frame.stack_pointer; // RSP do usuário
        registers.rax = 0;
        registers.rip = sys_fork_return as usize as u64;
        registers.cs = KERNEL_CODE as u64;
        registers.ss = KERNEL_DATA as u64;
        registers.rsp = child_thread.kernel_stack.top();
        registers.rflags = 0x2; // IF off até o sti do trampolim

        child_thread.name = thread_name;
        child_thread.info.architecture = arch;
        child_thread.info.compatibility = compat;
        child_thread.security.is_critical = critical;
        child_thread.fs_base = fs_base;
        child_thread.gs_base = gs_base;
        child_thread.fpu.0 = fpu_copy;

        // User stack: replicar tamanho e conteúdo da stack do pai
        if let Some(parent_thread) = parent_process.threads.iter().find(|t| t.id == parent_tid) {
            if let (Some(parent_stack), Some(child_stack), Some(space)) = (
                parent_thread.user_stack.as_ref(),
                child_thread.user_stack.as_mut(),
                child_process.address_space.as_ref(),
            ) {
                child_stack.fork_from(parent_stack, space);
            }
        }

        child_thread.state = TaskState::Ready;
    }

    crate::kdebug!("(Syscall) fork: filho criado, pid=", child_pid.as_u64());
    child_pid.as_u64() as isize
}

/// exit(code): marca a thread atual como Terminated e cede a CPU para
/// sempre. Nunca retorna ao chamador.
pub fn sys_exit(frame: &SysFrm) -> isize {
    let code = frame.rdi as i32;
    let tid = crate::sched::current_thread_id();

    if let Some(manager) = crate::sched::manager() {
        manager.kill_thread(tid, code);
    }

    loop {
        // O scheduler pula threads Terminated; nunca voltamos.
        // SAFETY: hlt com interrupções habilitadas em Ring 0.
        unsafe { crate::arch::Cpu::enable_interrupts() };
        crate::arch::Cpu::halt();
    }
}

/// sleep(ms): dorme com deadline absoluto no relógio monotônico.
pub fn sys_sleep(frame: &SysFrm) -> isize {
    let ms = frame.rdi;
    if let Some(manager) = crate::sched::manager() {
        manager.sleep_ms(ms);
    }
    0
}
