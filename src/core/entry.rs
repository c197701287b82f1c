//! Entry point lógico do kernel.
//!
//! Orquestra a inicialização de todos os subsistemas na ordem de
//! dependência: serial → memória → config → CPU/GDT/IDT → símbolos →
//! ACPI → APIC/timer → SMP → tasking.

use crate::arch::x86_64::cpu::Cpu;
use crate::core::handoff::{BootInfo, BOOT_MAGIC};

/// Lê a linha de comando do kernel (C string do bootloader).
fn kernel_cmdline(boot_info: &BootInfo) -> &'static str {
    let addr = boot_info.kernel.cmdline_addr;
    if addr == 0 {
        return "";
    }
    // SAFETY: contrato com o bootloader; string residente NUL-terminada.
    unsafe {
        let ptr = addr as *const u8;
        let mut len = 0usize;
        while core::ptr::read(ptr.add(len)) != 0 {
            len += 1;
        }
        core::str::from_utf8(core::slice::from_raw_parts(ptr, len)).unwrap_or("")
    }
}

/// Procura o entry point SMBIOS na janela 0xF0000-0x100000 quando o
/// bootloader não o entregou.
fn find_smbios(boot_info: &BootInfo) -> u64 {
    if boot_info.smbios_addr != 0 {
        return boot_info.smbios_addr;
    }

    // SAFETY: varredura somente-leitura de área de firmware mapeada.
    unsafe {
        let mut addr: u64 = 0xF0000;
        while addr < 0x100000 {
            let ptr = crate::mm::addr::phys_to_virt::<u8>(addr);
            let bytes = core::slice::from_raw_parts(ptr, 5);
            if &bytes[..4] == b"_SM_" || bytes == b"_SM3_" {
                crate::ktrace!("(Boot) SMBIOS encontrado em=", addr);
                return addr;
            }
            addr += 16;
        }
    }
    0
}

/// Função principal do kernel (chamada pelo stub naked de `_start`).
pub extern "C" fn kernel_main(boot_info: &'static BootInfo) -> ! {
    // 1. Serial e logging primeiro: tudo daqui em diante é visível
    crate::drivers::serial::init();
    crate::kinfo!("==========================================");
    crate::kinfo!("Anvil Kernel - inicializando");

    if boot_info.magic != BOOT_MAGIC {
        crate::kerror!("(Boot) Magic invalido no BootInfo=", boot_info.magic);
        Cpu::stop();
    }
    crate::kinfo!("(Boot) Protocolo de boot v=", boot_info.version as u64);

    crate::mm::addr::set_phys_window(boot_info.phys_window_offset);

    crate::klog!("CPU: ");
    crate::klog!(Cpu::vendor().as_str());
    crate::klog!(" ");
    crate::klog!(Cpu::brand().as_str());
    crate::knl!();
    let hypervisor = Cpu::hypervisor();
    if !hypervisor.as_str().is_empty() {
        crate::klog!("Hypervisor: ");
        crate::klog!(hypervisor.as_str());
        crate::knl!();
    }

    // 2. Memória: PMM → VMM → heap (a partir daqui Vec/Box funcionam)
    crate::kinfo!("[Init] Memoria");
    crate::mm::init(boot_info);

    // 3. Parametros do kernel
    crate::kinfo!("[Init] Configuracao");
    crate::core::config::parse(kernel_cmdline(boot_info));

    if crate::core::config::config().simd {
        // SAFETY: Ring 0, uma vez por core.
        unsafe { Cpu::init_sse() };
        crate::kinfo!("[Init] SIMD habilitado por configuracao");
    }

    // 4. Plumbing de interrupções do BSP: IDT global + GDT/TSS,
    //    GS per-CPU e MSRs de syscall
    crate::kinfo!("[Init] GDT/IDT e per-CPU do BSP");
    // SAFETY: boot single-threaded no BSP.
    unsafe {
        crate::arch::x86_64::idt::init();
        crate::core::smp::init_core(0);
    }

    // 5. Simbolos do kernel (crash handler ganha nomes)
    crate::kinfo!("[Init] Simbolos");
    crate::core::symbols::init(boot_info);

    // 6. Self-tests dos subsistemas base
    #[cfg(feature = "self_test")]
    run_early_tests();

    // 7. ACPI: RSDP → MADT + HPET
    crate::kinfo!("[Init] ACPI");
    let smbios = find_smbios(boot_info);
    if smbios == 0 {
        crate::kwarn!("(Boot) SMBIOS nao encontrado");
    }

    let rsdp = crate::arch::x86_64::acpi::find_rsdp(boot_info.rsdp_addr);
    let mut madt_available = false;
    if let Some(rsdp) = rsdp {
        if let Some(madt) = crate::arch::x86_64::acpi::find_table(rsdp, b"APIC") {
            let info = crate::arch::x86_64::acpi::madt::parse(madt);
            madt_available = info.local_apic_address != 0;
            crate::arch::x86_64::apic::set_madt(info);
        } else {
            crate::kerror!("(Boot) MADT ausente");
        }

        if let Some(hpet) = crate::arch::x86_64::acpi::find_table(rsdp, b"HPET") {
            crate::core::time::hpet::init(hpet as *const crate::arch::x86_64::acpi::hpet::HpetTable);
        } else {
            crate::kwarn!("(Boot) HPET ausente; relogios degradados");
        }
    } else {
        crate::kerror!("(Boot) RSDP nao encontrado");
    }

    // 8. APIC local + redirecionamento do I/O APIC + timer
    if madt_available {
        crate::kinfo!("[Init] APIC");
        // SAFETY: MADT validada; Ring 0.
        unsafe { crate::arch::x86_64::apic::lapic::init(0) };

        if let (Some(madt), Some(lapic)) = (
            crate::arch::x86_64::apic::madt(),
            crate::arch::x86_64::apic::lapic::get(),
        ) {
            // Core alvo das IRQs do I/O APIC (-p/--ioapicirq)
            let target_core = crate::core::config::config().ioapic_interrupt_core;
            let apic_id = madt
                .lapics
                .iter()
                .filter(|l| l.flags & 1 != 0)
                .nth(target_core)
                .map(|l| l.apic_id as u32)
                .unwrap_or_else(|| lapic.id());

            crate::arch::x86_64::apic::ioapic::redirect_irqs(madt, apic_id);

            crate::kinfo!("[Init] Timer do APIC");
            crate::arch::x86_64::apic::timer::calibrate_and_start(lapic);
        }

        // 9. Tabela per-CPU e contagem de cores
        crate::kinfo!("[Init] SMP");
        if let Some(madt) = crate::arch::x86_64::apic::madt() {
            crate::core::smp::init(madt);
        }
    } else {
        // Sem LAPIC não há timer de preempção; o fallback de PIC legado
        // não é implementado.
        crate::kerror!("(Boot) MADT sem endereco de LAPIC; sem preempcao");
    }

    // 10. Tasking: processo kernel + idle; scheduler no vetor do timer
    crate::kinfo!("[Init] Tasking");
    crate::sched::init(kernel_thread_main as usize as u64);

    // 11. A partir daqui o timer dispara e o scheduler assume
    crate::kinfo!("[Init] Interrupcoes habilitadas - sistema vivo");
    // SAFETY: toda a inicialização do BSP está completa.
    unsafe { Cpu::enable_interrupts() };

    // Contexto de boot vira um halt loop; o primeiro tick troca para a
    // thread principal do kernel e nunca mais volta aqui.
    loop {
        Cpu::halt();
    }
}

/// Thread principal do kernel: deveres de manutenção pós-boot.
extern "C" fn kernel_thread_main() -> ! {
    crate::kok!("Thread principal do kernel em execucao");

    #[cfg(feature = "self_test")]
    crate::core::test::run_tasking_tests();

    let init_path = crate::core::config::config().init_path;
    crate::klog!("(Init) Proximo passo: carregar ");
    crate::klog!(init_path.as_str());
    crate::knl!();

    // Colheita periódica de tasks terminadas
    loop {
        if let Some(manager) = crate::sched::manager() {
            manager.reap();
            manager.sleep_ms(100);
        } else {
            Cpu::halt();
        }
    }
}

/// Suites de self-test que rodam antes do tasking.
#[cfg(feature = "self_test")]
fn run_early_tests() {
    crate::kinfo!("[Init] Self-tests");
    crate::klib::test::run_klib_tests();
    crate::sync::test::run_sync_tests();
    crate::sys::test::run_sys_tests();
    crate::mm::test::run_mm_tests();
    crate::fs::test::run_fs_tests();
    crate::core::test::run_core_tests();
    crate::sched::test::run_sched_tests();
}
