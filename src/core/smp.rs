//! Dados per-CPU e inicialização SMP.
//!
//! Um registro `CpuData` por core lógico, em um array fixo no BSS. O
//! registro do core em execução é alcançável em O(1) sem locks via
//! GS Base (configurado no bringup do core).
//!
//! O checksum estrutural detecta escritas perdidas sobre o array: é
//! validado a cada acesso em builds de debug.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::arch::x86_64::cpu::{Cpu, MSR_GS_BASE, MSR_KERNEL_GS_BASE};
use crate::mm::STACK_SIZE;

/// Número máximo de cores lógicos suportados.
pub const MAX_CPU: usize = 256;

/// Valor esperado no campo checksum de todo CpuData ativo.
pub const CPU_DATA_CHECKSUM: u64 = 0xC0FF_EE5A_D0D0_CAFE;

/// Registro per-CPU.
///
/// ATENÇÃO: os três primeiros campos têm offsets fixos consumidos pelo
/// assembly de syscall (`gs:[0]`, `gs:[8]`, `gs:[16]`). Não reordenar.
#[repr(C, align(4096))]
pub struct CpuData {
    /// gs:[0] — scratch para o RSP do usuário durante syscall.
    pub syscall_user_stack: u64,
    /// gs:[8] — topo da stack de syscall ativa (a kernel stack da thread
    /// em execução; o scheduler atualiza a cada troca).
    pub syscall_kernel_stack: AtomicU64,
    /// gs:[16] — id lógico do core.
    pub id: u64,

    /// Core já passou pelo bringup?
    pub is_active: bool,
    /// Detecta corrupção estrutural do array.
    pub checksum: u64,
    /// Topo da kernel stack base do core.
    pub kernel_stack: u64,
    /// Thread atualmente em execução (Utid; 0 = nenhuma). Lido em ISR.
    pub current_thread: AtomicU64,
    /// Área de FPU da thread atual (endereço; 0 = nenhuma).
    pub fpu: AtomicU64,
}

impl CpuData {
    const fn new() -> Self {
        Self {
            syscall_user_stack: 0,
            syscall_kernel_stack: AtomicU64::new(0),
            id: 0,
            is_active: false,
            checksum: 0,
            kernel_stack: 0,
            current_thread: AtomicU64::new(0),
            fpu: AtomicU64::new(0),
        }
    }
}

static mut CPUS: [CpuData; MAX_CPU] = [const { CpuData::new() }; MAX_CPU];

/// Cores lógicos efetivos (MADT limitado pela opção -c/--cores).
static ONLINE_CPUS: AtomicUsize = AtomicUsize::new(1);

/// Retorna o registro de um core pelo id (com bounds check).
pub fn get_cpu(id: usize) -> Option<&'static CpuData> {
    if id >= MAX_CPU {
        return None;
    }
    // SAFETY: acesso somente-leitura; campos mutáveis são atômicos.
    let cpu = unsafe { &*core::ptr::addr_of!(CPUS[id]) };
    if cpu.is_active {
        debug_assert!(cpu.checksum == CPU_DATA_CHECKSUM, "CpuData corrompido");
    }
    Some(cpu)
}

/// Registro do core em execução, via GS Base.
///
/// Antes do bringup do core o GS ainda não aponta para o array; nesse
/// caso caímos no registro do core 0 (suficiente para o caminho de boot,
/// que roda exclusivamente no BSP).
pub fn get_current_cpu() -> &'static CpuData {
    // SAFETY: leitura de MSR em Ring 0.
    let gs = unsafe { Cpu::read_msr(MSR_GS_BASE) };

    let array_base = unsafe { core::ptr::addr_of!(CPUS) } as u64;
    let array_end = array_base + (MAX_CPU * core::mem::size_of::<CpuData>()) as u64;

    if gs < array_base || gs >= array_end {
        // GS ainda não configurado (early boot)
        return unsafe { &*core::ptr::addr_of!(CPUS[0]) };
    }

    let cpu = unsafe { &*(gs as *const CpuData) };
    debug_assert!(cpu.checksum == CPU_DATA_CHECKSUM, "CpuData corrompido");
    cpu
}

/// Id do core em execução (0 durante o early boot).
pub fn current_core_id() -> u32 {
    get_current_cpu().id as u32
}

/// Número de cores online.
pub fn online_cpus() -> usize {
    ONLINE_CPUS.load(Ordering::Relaxed)
}

/// Bringup do core atual: GDT/TSS, IDT, stacks, GS Base e MSRs de syscall.
///
/// # Safety
/// Chamar uma vez por core, com o PMM operacional.
pub unsafe fn init_core(core_id: usize) {
    crate::arch::x86_64::gdt::init(core_id);
    crate::arch::x86_64::idt::load();

    let cpu = &mut *core::ptr::addr_of_mut!(CPUS[core_id]);
    cpu.checksum = CPU_DATA_CHECKSUM;
    cpu.id = core_id as u64;

    // Stacks do core (base + syscall), alocação eager
    let stack_pages = STACK_SIZE / crate::mm::PAGE_SIZE;
    cpu.kernel_stack = {
        let base = crate::mm::pmm::request_pages(stack_pages as usize);
        base + STACK_SIZE
    };
    cpu.syscall_kernel_stack.store(
        {
            let base = crate::mm::pmm::request_pages(stack_pages as usize);
            base + STACK_SIZE
        },
        Ordering::Relaxed,
    );

    cpu.is_active = true;

    if cpu.checksum != CPU_DATA_CHECKSUM {
        crate::kerror!("(SMP) Checksum invalido no bringup do core=", core_id as u64);
        Cpu::stop();
    }

    // GS Base ativo = CpuData; shadow guarda o GS do usuário (0 inicial).
    // A GDT já foi carregada: escrever o seletor GS zera o base escondido,
    // por isso os MSRs vêm DEPOIS de gdt::init.
    let cpu_ptr = cpu as *const CpuData as u64;
    Cpu::write_msr(MSR_GS_BASE, cpu_ptr);
    Cpu::write_msr(MSR_KERNEL_GS_BASE, 0);

    // Interrupções de Ring 3 usam a kernel stack base via TSS.RSP0
    crate::arch::x86_64::gdt::set_ring0_stack(core_id, cpu.kernel_stack);

    crate::arch::x86_64::syscall::init();

    crate::kdebug!("(SMP) Core inicializado, id=", core_id as u64);
    crate::kdebug!("(SMP) Kernel stack top=", cpu.kernel_stack);
}

/// Conta os cores da MADT, aplica o limite de configuração e registra o
/// total online.
///
/// O bringup dos Application Processors depende de um trampolim em low
/// memory com handshake atômico; o arranque real ainda não está
/// implementado — apenas o BSP executa.
pub fn init(madt: &crate::arch::x86_64::acpi::madt::MadtInfo) {
    let hardware_cores = madt.cpu_count().max(1);
    let config_cores = crate::core::config::config().cores;

    let cores = if config_cores == 0 {
        hardware_cores
    } else if config_cores > hardware_cores {
        crate::kwarn!(
            "(SMP) Mais cores pedidos que disponiveis, usando=",
            hardware_cores as u64
        );
        hardware_cores
    } else {
        config_cores
    };

    ONLINE_CPUS.store(cores, Ordering::Relaxed);
    crate::kinfo!("(SMP) Cores logicos=", cores as u64);

    if cores > 1 {
        crate::kwarn!("(SMP) Arranque de APs nao implementado; rodando so no BSP");
    }
}
