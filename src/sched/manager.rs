//! TaskManager: o conjunto global de processos e as operações de
//! criação, término, espera e colheita.
//!
//! Todo o conjunto vive atrás de um único spinlock. Código fora de ISR
//! usa `lock_critical` (o tick do timer toca as mesmas estruturas no
//! mesmo core); o scheduler, já com interrupções desabilitadas, usa o
//! lock simples.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::arch::x86_64::gdt::{KERNEL_CODE, KERNEL_DATA, USER_CODE, USER_DATA};
use crate::arch::x86_64::interrupts::TrapFrame;
use crate::fs::fd::FileDescriptorTable;
use crate::mm::stack_guard::StackGuard;
use crate::mm::vmm::AddressSpace;
use crate::sync::Spinlock;
use crate::sys::types::{Upid, Utid};

use super::task::{
    FxState, Pcb, TaskArchitecture, TaskCompatibility, TaskInfo, TaskName, TaskSecurity,
    TaskState, Tcb, TrustLevel, WaitTarget,
};

/// RFLAGS inicial: IF ligado, bit 1 sempre um.
const INITIAL_RFLAGS: u64 = 0x202;

/// Prioridade padrão por classe de confiança.
fn default_priority(trust: TrustLevel) -> i32 {
    match trust {
        TrustLevel::Kernel => 20,
        TrustLevel::System => 15,
        TrustLevel::User => 10,
        TrustLevel::Idle => 1,
        TrustLevel::Unknown => 0,
    }
}

/// O conjunto de processos.
pub struct TaskSet {
    pub processes: Vec<Box<Pcb>>,
    pub idle_pid: Upid,
    pub idle_tid: Utid,
}

impl TaskSet {
    pub fn find_process(&self, pid: Upid) -> Option<&Pcb> {
        self.processes.iter().find(|p| p.id == pid).map(|p| &**p)
    }

    pub fn find_process_mut(&mut self, pid: Upid) -> Option<&mut Pcb> {
        self.processes
            .iter_mut()
            .find(|p| p.id == pid)
            .map(|p| &mut **p)
    }

    pub fn find_thread_mut(&mut self, tid: Utid) -> Option<(&mut Pcb, usize)> {
        if tid == Utid::NONE {
            return None;
        }
        for process in self.processes.iter_mut() {
            if let Some(index) = process.threads.iter().position(|t| t.id == tid) {
                return Some((&mut **process, index));
            }
        }
        None
    }

    /// A thread (e o processo dono) pelo id.
    pub fn thread_mut(&mut self, tid: Utid) -> Option<&mut Tcb> {
        let (process, index) = self.find_thread_mut(tid)?;
        Some(&mut *process.threads[index])
    }

    /// Uma thread terminou (ou não existe mais)?
    pub fn thread_is_gone(&self, tid: Utid) -> bool {
        for process in self.processes.iter() {
            if let Some(thread) = process.find_thread(tid) {
                return thread.state == TaskState::Terminated;
            }
        }
        true
    }

    /// Um processo terminou (ou não existe mais)?
    pub fn process_is_gone(&self, pid: Upid) -> bool {
        match self.find_process(pid) {
            Some(process) => process.state == TaskState::Terminated,
            None => true,
        }
    }
}

pub struct TaskManager {
    pub(crate) set: Spinlock<TaskSet>,
    next_pid: core::sync::atomic::AtomicU64,
    next_tid: core::sync::atomic::AtomicU64,
}

impl TaskManager {
    /// Constrói o gerenciador com o processo do kernel (uma thread no
    /// entry fornecido) e o par idle.
    pub fn new(kernel_entry: u64) -> Self {
        let manager = Self {
            set: Spinlock::new(TaskSet {
                processes: Vec::new(),
                idle_pid: Upid::NONE,
                idle_tid: Utid::NONE,
            }),
            next_pid: core::sync::atomic::AtomicU64::new(1),
            next_tid: core::sync::atomic::AtomicU64::new(1),
        };

        let kernel_pid = manager.create_process(Upid::NONE, "kernel", TrustLevel::Kernel);
        let kernel_tid = manager
            .create_thread(kernel_pid, kernel_entry, 0, 0, 0)
            .unwrap_or(Utid::NONE);

        let idle_pid = manager.create_process(Upid::NONE, "idle", TrustLevel::Idle);
        let idle_tid = manager
            .create_thread(idle_pid, super::scheduler::idle_thread_entry as usize as u64, 0, 0, 0)
            .unwrap_or(Utid::NONE);

        {
            let mut set = manager.set.lock_critical("TaskManager::new");
            set.idle_pid = idle_pid;
            set.idle_tid = idle_tid;
        }

        crate::kinfo!("(Task) Processo kernel criado, thread=", kernel_tid.as_u64());
        crate::kinfo!("(Task) Processo idle criado, thread=", idle_tid.as_u64());
        manager
    }

    fn allot_pid(&self) -> Upid {
        Upid(self
            .next_pid
            .fetch_add(1, core::sync::atomic::Ordering::Relaxed))
    }

    fn allot_tid(&self) -> Utid {
        Utid(self
            .next_tid
            .fetch_add(1, core::sync::atomic::Ordering::Relaxed))
    }

    /// Cria um processo.
    ///
    /// Confiança de kernel/idle reutiliza o espaço do kernel; as demais
    /// ganham um address space novo (metade de kernel compartilhada).
    pub fn create_process(&self, parent: Upid, name: &str, trust: TrustLevel) -> Upid {
        let pid = self.allot_pid();

        let address_space = match trust {
            TrustLevel::Kernel | TrustLevel::Idle => None,
            _ => Some(AddressSpace::new()),
        };

        let process = Box::new(Pcb {
            id: pid,
            name: TaskName::new(name),
            parent,
            exit_code: 0,
            state: TaskState::Ready,
            security: TaskSecurity::new(trust),
            info: TaskInfo::new(default_priority(trust)),
            threads: Vec::new(),
            children: Vec::new(),
            address_space,
            fd_table: FileDescriptorTable::new(),
            symbols: None,
        });

        let mut set = self.set.lock_critical("TaskManager::create_process");
        if parent != Upid::NONE {
            if let Some(parent_pcb) = set.find_process_mut(parent) {
                parent_pcb.children.push(pid);
            }
        }
        set.processes.push(process);

        crate::kdebug!("(Task) Processo criado, pid=", pid.as_u64());
        pid
    }

    /// Cria uma thread no processo `pid`, pronta para ser escalonada.
    ///
    /// `argv`/`envp`/`aux` são ponteiros (no espaço do processo) entregues
    /// nos registradores de argumento da convenção de chamada.
    pub fn create_thread(
        &self,
        pid: Upid,
        entry: u64,
        argv: u64,
        envp: u64,
        aux: u64,
    ) -> Option<Utid> {
        self.create_thread_with_state(pid, entry, argv, envp, aux, TaskState::Ready)
    }

    /// Variante com estado inicial explícito. `fork` cria a thread filha
    /// Stopped e só a libera (Ready) depois de montar os registradores.
    pub fn create_thread_with_state(
        &self,
        pid: Upid,
        entry: u64,
        argv: u64,
        envp: u64,
        aux: u64,
        initial_state: TaskState,
    ) -> Option<Utid> {
        let tid = self.allot_tid();

        let mut set = self.set.lock_critical("TaskManager::create_thread");
        let Some(process) = set.find_process_mut(pid) else {
            crate::kwarn!("(Task) create_thread em processo inexistente=", pid.as_u64());
            return None;
        };

        let trust = process.security.trust_level;
        let is_user = matches!(trust, TrustLevel::User | TrustLevel::System);

        // Toda thread tem kernel stack própria (é também a stack de
        // syscall dela); threads de usuário ganham a user stack lazy.
        let kernel_stack = StackGuard::new(false, process.space());
        let user_stack = if is_user {
            Some(StackGuard::new(true, process.space()))
        } else {
            None
        };

        let mut registers = TrapFrame::default();
        registers.rip = entry;
        registers.rflags = INITIAL_RFLAGS;
        if is_user {
            registers.cs = USER_CODE as u64;
            registers.ss = USER_DATA as u64;
            registers.rsp = user_stack.as_ref().map(|s| s.top()).unwrap_or(0);
            registers.rdi = argv;
            registers.rsi = envp;
            registers.rdx = aux;
        } else {
            registers.cs = KERNEL_CODE as u64;
            registers.ss = KERNEL_DATA as u64;
            registers.rsp = kernel_stack.top();
        }

        let thread = Box::new(Tcb {
            id: tid,
            name: process.name,
            parent: pid,
            entry_point: entry,
            offset: 0,
            exit_code: 0,
            state: initial_state,
            registers,
            gs_base: 0,
            fs_base: 0,
            ip_history: [0; super::task::IP_HISTORY_LEN],
            security: process.security,
            info: TaskInfo::new(process.info.priority),
            fpu: FxState::zeroed(),
            kernel_stack,
            user_stack,
            errno: 0,
            wait_target: WaitTarget::None,
        });

        process.threads.push(thread);
        crate::kdebug!("(Task) Thread criada, tid=", tid.as_u64());
        Some(tid)
    }

    /// Marca uma thread como Terminated (o scheduler a ignora dali em
    /// diante; a colheita libera os recursos).
    pub fn kill_thread(&self, tid: Utid, code: i32) {
        let mut set = self.set.lock_critical("TaskManager::kill_thread");
        if let Some(thread) = set.thread_mut(tid) {
            thread.state = TaskState::Terminated;
            thread.exit_code = code;
        }
    }

    /// Marca um processo (e todas as suas threads) como Terminated.
    pub fn kill_process(&self, pid: Upid, code: i32) {
        let mut set = self.set.lock_critical("TaskManager::kill_process");
        if let Some(process) = set.find_process_mut(pid) {
            process.state = TaskState::Terminated;
            process.exit_code = code;
            for thread in process.threads.iter_mut() {
                thread.state = TaskState::Terminated;
                thread.exit_code = code;
            }
        }
    }

    /// Bloqueia a thread atual até `tid` terminar.
    pub fn wait_for_thread(&self, tid: Utid) {
        let current = super::current_thread_id();
        if current == Utid::NONE || current == tid {
            return;
        }

        {
            let mut set = self.set.lock_critical("TaskManager::wait_for_thread");
            if set.thread_is_gone(tid) {
                return;
            }
            if let Some(thread) = set.thread_mut(current) {
                thread.state = TaskState::Waiting;
                thread.wait_target = WaitTarget::Thread(tid);
            }
        }

        self.block_until_running(current);
    }

    /// Bloqueia a thread atual até o processo `pid` terminar.
    pub fn wait_for_process(&self, pid: Upid) {
        let current = super::current_thread_id();
        if current == Utid::NONE {
            return;
        }

        {
            let mut set = self.set.lock_critical("TaskManager::wait_for_process");
            if set.process_is_gone(pid) {
                return;
            }
            if let Some(thread) = set.thread_mut(current) {
                thread.state = TaskState::Waiting;
                thread.wait_target = WaitTarget::Process(pid);
            }
        }

        self.block_until_running(current);
    }

    /// Dorme a thread atual por `ms` milissegundos (deadline absoluto no
    /// relógio monotônico). Término antecipado só via Terminated.
    pub fn sleep_ms(&self, ms: u64) {
        let current = super::current_thread_id();
        if current == Utid::NONE {
            // Contexto de boot: espera ocupada no HPET
            if let Some(hpet) = crate::core::time::hpet::get() {
                hpet.sleep_us(ms * 1000);
            }
            return;
        }

        {
            let mut set = self.set.lock_critical("TaskManager::sleep_ms");
            if let Some(thread) = set.thread_mut(current) {
                thread.info.sleep_until = crate::core::time::uptime_ns() + ms * 1_000_000;
                thread.state = TaskState::Sleeping;
            }
        }

        self.block_until_running(current);
    }

    /// Ponto de suspensão: a thread declarou um estado não-Running e
    /// espera o scheduler trocá-la (e eventualmente acordá-la). O estado
    /// volta a Running quando ela é escolhida de novo.
    fn block_until_running(&self, tid: Utid) {
        loop {
            // SAFETY: hlt com interrupções habilitadas; o tick do timer
            // retoma o controle.
            unsafe { crate::arch::Cpu::enable_interrupts() };
            crate::arch::Cpu::halt();

            let mut set = self.set.lock_critical("TaskManager::block_until_running");
            match set.thread_mut(tid) {
                Some(thread) => {
                    if thread.state == TaskState::Running {
                        return;
                    }
                    if thread.state == TaskState::Terminated {
                        // Morta enquanto dormia: nunca mais roda.
                        drop(set);
                        loop {
                            unsafe { crate::arch::Cpu::enable_interrupts() };
                            crate::arch::Cpu::halt();
                        }
                    }
                }
                None => return,
            }
        }
    }

    /// Colhe threads e processos Terminated: devolve stacks, desfaz a
    /// contabilidade e remove do conjunto.
    pub fn reap(&self) {
        let mut set = self.set.lock_critical("TaskManager::reap");
        let current = super::current_thread_id();

        for process in set.processes.iter_mut() {
            process.threads.retain_mut(|thread| {
                // Nunca colher a thread atualmente em execução
                if thread.state != TaskState::Terminated || thread.id == current {
                    return true;
                }
                thread.kernel_stack.release();
                if let Some(user_stack) = thread.user_stack.as_mut() {
                    user_stack.release();
                }
                crate::kdebug!("(Task) Thread colhida, tid=", thread.id.as_u64());
                false
            });
        }

        // Processos sem threads e marcados Terminated somem do conjunto;
        // o drop do address space devolve as page tables.
        set.processes.retain(|process| {
            let done = process.state == TaskState::Terminated && process.threads.is_empty();
            if done {
                crate::kdebug!("(Task) Processo colhido, pid=", process.id.as_u64());
            }
            !done
        });
    }

    /// Percentual de ocupação de um core (100 - fatia do idle).
    pub fn get_usage(&self, core: usize) -> u64 {
        if core >= crate::core::smp::MAX_CPU {
            return 0;
        }
        let set = self.set.lock_critical("TaskManager::get_usage");
        let idle_tid = set.idle_tid;
        let mut idle_ticks = 0u64;
        let mut total_ticks = 0u64;
        for process in set.processes.iter() {
            for thread in process.threads.iter() {
                total_ticks += thread.info.usage[core];
                if thread.id == idle_tid {
                    idle_ticks = thread.info.usage[core];
                }
            }
        }
        if total_ticks == 0 {
            return 0;
        }
        100 - (idle_ticks * 100 / total_ticks)
    }
}
