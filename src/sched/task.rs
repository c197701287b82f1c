//! Estruturas de tasking: PCB, TCB e tipos associados.

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::arch::x86_64::interrupts::TrapFrame;
use crate::core::smp::MAX_CPU;
use crate::core::symbols::SymbolTable;
use crate::fs::fd::FileDescriptorTable;
use crate::mm::stack_guard::StackGuard;
use crate::mm::vmm::AddressSpace;
use crate::sys::types::{Upid, Utid};

/// Profundidade do histórico de IPs amostrados na preempção.
pub const IP_HISTORY_LEN: usize = 128;

/// Capacidade do buffer de nome.
pub const TASK_NAME_LEN: usize = 256;

/// Classe de privilégio de um processo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustLevel {
    Unknown,
    Kernel,
    System,
    Idle,
    User,
}

/// Estados do ciclo de vida de processos e threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Unknown,
    Ready,
    Running,
    Sleeping,
    Waiting,
    Stopped,
    Terminated,
}

/// Arquitetura alvo de uma thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskArchitecture {
    Unknown,
    X32,
    X64,
}

/// ABI de syscalls da thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCompatibility {
    Unknown,
    Native,
    Linux,
}

/// Descritor de segurança de processo/thread.
#[derive(Debug, Clone, Copy)]
pub struct TaskSecurity {
    pub trust_level: TrustLevel,
    pub unique_token: u64,
    pub is_critical: bool,
    pub is_debug_enabled: bool,
    pub is_kernel_debug_enabled: bool,
}

impl TaskSecurity {
    pub fn new(trust_level: TrustLevel) -> Self {
        Self {
            trust_level,
            unique_token: generate_token(),
            is_critical: false,
            is_debug_enabled: false,
            is_kernel_debug_enabled: false,
        }
    }
}

/// Token opaco: misto de contador e timestamp.
fn generate_token() -> u64 {
    use core::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    crate::arch::Cpu::timestamp().rotate_left(17) ^ (count.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

/// Contabilidade de uma task.
pub struct TaskInfo {
    /// Deadline absoluto de sleep (ns do relógio monotônico; 0 = sem sleep).
    pub sleep_until: u64,
    /// Momento da criação (ns).
    pub spawn_time: u64,
    /// Tempo acumulado em modo usuário (ns).
    pub user_time: u64,
    /// Tempo acumulado em modo kernel (ns).
    pub kernel_time: u64,
    /// Ticks consumidos por core.
    pub usage: [u64; MAX_CPU],
    /// Cores onde a task pode rodar.
    pub affinity: [bool; MAX_CPU],
    /// Prioridade estática (maior = mais urgente).
    pub priority: i32,
    pub architecture: TaskArchitecture,
    pub compatibility: TaskCompatibility,
}

impl TaskInfo {
    pub fn new(priority: i32) -> Self {
        Self {
            sleep_until: 0,
            spawn_time: crate::core::time::uptime_ns(),
            user_time: 0,
            kernel_time: 0,
            usage: [0; MAX_CPU],
            affinity: [true; MAX_CPU],
            priority,
            architecture: TaskArchitecture::X64,
            compatibility: TaskCompatibility::Native,
        }
    }
}

/// Nome em buffer fixo.
#[derive(Clone, Copy)]
pub struct TaskName {
    buf: [u8; TASK_NAME_LEN],
    len: usize,
}

impl TaskName {
    pub fn new(name: &str) -> Self {
        let mut task_name = Self {
            buf: [0; TASK_NAME_LEN],
            len: 0,
        };
        task_name.set(name);
        task_name
    }

    /// Copia até a capacidade do buffer (rename trunca).
    pub fn set(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(TASK_NAME_LEN);
        self.buf[..len].copy_from_slice(&bytes[..len]);
        self.len = len;
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("?")
    }
}

/// Área de save de FPU/SSE (FXSAVE64).
#[repr(C, align(16))]
pub struct FxState(pub [u8; 512]);

impl FxState {
    pub fn zeroed() -> Box<Self> {
        Box::new(Self([0; 512]))
    }
}

/// Alvo de espera de uma thread em estado Waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    None,
    Thread(Utid),
    Process(Upid),
}

/// Thread Control Block.
pub struct Tcb {
    pub id: Utid,
    pub name: TaskName,
    /// Processo dono (referência por id; o dono é o PCB).
    pub parent: Upid,
    pub entry_point: u64,
    pub offset: u64,
    pub exit_code: i32,
    pub state: TaskState,

    /// Contexto salvo (restaurado pelo frame-swap do scheduler).
    pub registers: TrapFrame,
    pub gs_base: u64,
    pub fs_base: u64,

    /// Anel dos últimos IPs observados na preempção ([0] = mais recente).
    pub ip_history: [u64; IP_HISTORY_LEN],

    pub security: TaskSecurity,
    pub info: TaskInfo,

    /// Área de FPU da thread.
    pub fpu: Box<FxState>,

    /// Kernel stack própria (também usada como stack de syscall).
    pub kernel_stack: StackGuard,
    /// User stack (threads de usuário).
    pub user_stack: Option<StackGuard>,

    /// Slot de errno da thread.
    pub errno: i32,
    /// Em quem esta thread está esperando (estado Waiting).
    pub wait_target: WaitTarget,
}

impl Tcb {
    /// Registra um IP amostrado na preempção.
    pub fn record_ip(&mut self, rip: u64) {
        self.ip_history.copy_within(0..IP_HISTORY_LEN - 1, 1);
        self.ip_history[0] = rip;
    }

    pub fn rename(&mut self, name: &str) {
        if name.is_empty() {
            crate::kwarn!("(Task) Rename de thread para nome vazio, id=", self.id.as_u64());
            return;
        }
        self.name.set(name);
    }

    pub fn set_priority(&mut self, priority: i32) {
        self.info.priority = priority;
    }

    pub fn set_critical(&mut self, critical: bool) {
        self.security.is_critical = critical;
    }
}

/// Process Control Block.
pub struct Pcb {
    pub id: Upid,
    pub name: TaskName,
    /// Processo pai (id; Upid::NONE para o init do kernel).
    pub parent: Upid,
    pub exit_code: i32,
    pub state: TaskState,
    pub security: TaskSecurity,
    pub info: TaskInfo,

    /// Threads do processo (propriedade do PCB).
    pub threads: Vec<Box<Tcb>>,
    /// Filhos diretos (por id; a propriedade é do conjunto global).
    pub children: Vec<Upid>,

    /// Address space próprio. `None` = confiança de kernel, usa o espaço
    /// do kernel diretamente.
    pub address_space: Option<AddressSpace>,

    pub fd_table: FileDescriptorTable,

    /// Símbolos da imagem carregada (para o crash screen do processo).
    pub symbols: Option<SymbolTable>,
}

impl Pcb {
    /// O address space efetivo do processo.
    pub fn space(&self) -> &AddressSpace {
        match &self.address_space {
            Some(space) => space,
            None => crate::mm::vmm::kernel_space(),
        }
    }

    pub fn find_thread(&self, tid: Utid) -> Option<&Tcb> {
        self.threads.iter().find(|t| t.id == tid).map(|t| &**t)
    }

    pub fn find_thread_mut(&mut self, tid: Utid) -> Option<&mut Tcb> {
        self.threads
            .iter_mut()
            .find(|t| t.id == tid)
            .map(|t| &mut **t)
    }
}
