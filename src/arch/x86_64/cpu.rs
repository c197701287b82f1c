//! Operações de CPU (x86_64).
//!
//! Assembly inline para acesso direto ao hardware: CPUID, MSRs, controle
//! de interrupções, CR3, TSC e barreiras de memória.
//!
//! # Segurança
//! Assume modo longo (64-bit) e privilégio de kernel (Ring 0).

use core::arch::asm;

/// MSR: IA32_APIC_BASE (endereço base do APIC Local)
pub const IA32_APIC_BASE: u32 = 0x1B;
/// MSR: FS Base
pub const MSR_FS_BASE: u32 = 0xC0000100;
/// MSR: GS Base
pub const MSR_GS_BASE: u32 = 0xC0000101;
/// MSR: Kernel GS Base (shadow, trocado por swapgs)
pub const MSR_KERNEL_GS_BASE: u32 = 0xC0000102;
/// MSR: EFER (Extended Feature Enable Register)
pub const MSR_EFER: u32 = 0xC0000080;

/// Bit 8 do IA32_APIC_BASE indica o Bootstrap Processor (BSP)
const MSR_APIC_BSP_FLAG: u64 = 1 << 8;

/// Resultado de uma execução do CPUID (EAX, EBX, ECX, EDX).
#[derive(Debug, Clone, Copy)]
pub struct CpuidResult {
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
}

/// String fixa retornada pelo CPUID (vendor/brand/hypervisor).
#[derive(Clone, Copy)]
pub struct CpuString<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> CpuString<N> {
    pub fn as_str(&self) -> &str {
        let len = self
            .bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(N);
        core::str::from_utf8(&self.bytes[..len]).unwrap_or("?")
    }
}

/// Nível de SIMD disponível/habilitado.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimdLevel {
    None,
    Sse,
    Avx,
}

pub struct Cpu;

impl Cpu {
    /// Executa a instrução CPUID.
    ///
    /// Preservação manual de RBX: o LLVM reserva RBX para uso interno,
    /// então não podemos usá-lo como operando de saída direto.
    pub fn cpuid(leaf: u32, subleaf: u32) -> CpuidResult {
        let eax: u32;
        let ebx: u32;
        let ecx: u32;
        let edx: u32;

        unsafe {
            asm!(
                "push rbx",
                "cpuid",
                "mov {0:e}, ebx",
                "pop rbx",
                out(reg) ebx,
                inout("eax") leaf => eax,
                inout("ecx") subleaf => ecx,
                out("edx") edx,
                options(nomem, preserves_flags),
            );
        }
        CpuidResult { eax, ebx, ecx, edx }
    }

    /// String do fabricante ("GenuineIntel", "AuthenticAMD", ...).
    pub fn vendor() -> CpuString<13> {
        let r = Self::cpuid(0x0, 0);
        let mut bytes = [0u8; 13];
        bytes[0..4].copy_from_slice(&r.ebx.to_le_bytes());
        bytes[4..8].copy_from_slice(&r.edx.to_le_bytes());
        bytes[8..12].copy_from_slice(&r.ecx.to_le_bytes());
        CpuString { bytes }
    }

    /// Brand string completa (folhas 0x80000002..0x80000004).
    pub fn brand() -> CpuString<49> {
        let mut bytes = [0u8; 49];
        let mut offset = 0;
        for leaf in 0x8000_0002u32..=0x8000_0004 {
            let r = Self::cpuid(leaf, 0);
            bytes[offset..offset + 4].copy_from_slice(&r.eax.to_le_bytes());
            bytes[offset + 4..offset + 8].copy_from_slice(&r.ebx.to_le_bytes());
            bytes[offset + 8..offset + 12].copy_from_slice(&r.ecx.to_le_bytes());
            bytes[offset + 12..offset + 16].copy_from_slice(&r.edx.to_le_bytes());
            offset += 16;
        }
        CpuString { bytes }
    }

    /// String do hypervisor (folha 0x40000000), vazia em bare metal.
    pub fn hypervisor() -> CpuString<13> {
        let r = Self::cpuid(0x4000_0000, 0);
        let mut bytes = [0u8; 13];
        bytes[0..4].copy_from_slice(&r.ebx.to_le_bytes());
        bytes[4..8].copy_from_slice(&r.ecx.to_le_bytes());
        bytes[8..12].copy_from_slice(&r.edx.to_le_bytes());
        CpuString { bytes }
    }

    /// Lê um Model Specific Register.
    ///
    /// # Safety
    /// MSR inválido causa #GP.
    #[inline]
    pub unsafe fn read_msr(msr: u32) -> u64 {
        let (high, low): (u32, u32);
        asm!(
            "rdmsr",
            in("ecx") msr,
            out("eax") low,
            out("edx") high,
            options(nomem, nostack, preserves_flags),
        );
        ((high as u64) << 32) | (low as u64)
    }

    /// Escreve um Model Specific Register.
    ///
    /// # Safety
    /// MSR inválido ou valor reservado causa #GP.
    #[inline]
    pub unsafe fn write_msr(msr: u32, value: u64) {
        let low = value as u32;
        let high = (value >> 32) as u32;
        asm!(
            "wrmsr",
            in("ecx") msr,
            in("eax") low,
            in("edx") high,
            options(nomem, nostack, preserves_flags),
        );
    }

    /// Verifica se este é o Bootstrap Processor (IA32_APIC_BASE bit 8).
    pub fn is_bsp() -> bool {
        unsafe { (Self::read_msr(IA32_APIC_BASE) & MSR_APIC_BSP_FLAG) != 0 }
    }

    /// ID do core atual via CPUID folha 1 (Initial APIC ID, EBX[31:24]).
    /// Funciona antes do GS Base estar configurado.
    pub fn core_id() -> u32 {
        Self::cpuid(1, 0).ebx >> 24
    }

    /// Para a CPU até a próxima interrupção (HLT).
    #[inline]
    pub fn halt() {
        unsafe {
            asm!("hlt", options(nomem, nostack, preserves_flags));
        }
    }

    /// Para a CPU para sempre: CLI + HLT em loop.
    pub fn stop() -> ! {
        loop {
            unsafe {
                asm!("cli", options(nomem, nostack, preserves_flags));
                asm!("hlt", options(nomem, nostack, preserves_flags));
            }
        }
    }

    /// Dica de spinloop para a CPU (PAUSE).
    #[inline]
    pub fn relax() {
        unsafe {
            asm!("pause", options(nomem, nostack, preserves_flags));
        }
    }

    /// Desabilita interrupções (CLI).
    ///
    /// # Safety
    /// Requer Ring 0.
    #[inline]
    pub unsafe fn disable_interrupts() {
        asm!("cli", options(nomem, nostack, preserves_flags));
    }

    /// Habilita interrupções (STI).
    ///
    /// # Safety
    /// Requer Ring 0. Pode causar preempção imediata.
    #[inline]
    pub unsafe fn enable_interrupts() {
        asm!("sti", options(nomem, nostack, preserves_flags));
    }

    /// Verifica RFLAGS.IF.
    #[inline]
    pub fn interrupts_enabled() -> bool {
        let rflags: u64;
        unsafe {
            asm!("pushfq; pop {}", out(reg) rflags, options(nomem, preserves_flags));
        }
        (rflags & (1 << 9)) != 0
    }

    /// Lê CR3 (raiz da page table ativa).
    #[inline]
    pub fn read_page_table() -> u64 {
        let cr3: u64;
        unsafe {
            asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        cr3
    }

    /// Escreve CR3 (troca de address space; flush completo de TLB).
    ///
    /// # Safety
    /// `root` deve apontar para uma PML4 válida com o kernel mapeado.
    #[inline]
    pub unsafe fn write_page_table(root: u64) {
        asm!("mov cr3, {}", in(reg) root, options(nostack, preserves_flags));
    }

    /// Invalida a entrada de TLB de um endereço virtual.
    #[inline]
    pub fn invlpg(virt: u64) {
        unsafe {
            asm!("invlpg [{}]", in(reg) virt, options(nostack, preserves_flags));
        }
    }

    /// Timestamp counter (RDTSC).
    #[inline]
    pub fn timestamp() -> u64 {
        let (high, low): (u32, u32);
        unsafe {
            asm!(
                "rdtsc",
                out("eax") low,
                out("edx") high,
                options(nomem, nostack, preserves_flags),
            );
        }
        ((high as u64) << 32) | (low as u64)
    }

    /// Nível de SIMD reportado pelo hardware.
    pub fn simd_level() -> SimdLevel {
        let r = Self::cpuid(1, 0);
        // ECX bit 28 = AVX, EDX bit 25 = SSE
        if r.ecx & (1 << 28) != 0 {
            SimdLevel::Avx
        } else if r.edx & (1 << 25) != 0 {
            SimdLevel::Sse
        } else {
            SimdLevel::None
        }
    }

    /// Suporte a páginas de 1 GiB (CPUID 0x80000001 EDX bit 26).
    pub fn has_1gib_pages() -> bool {
        Self::cpuid(0x8000_0001, 0).edx & (1 << 26) != 0
    }

    /// Barreira completa de memória (MFENCE).
    #[inline]
    pub fn memory_fence() {
        unsafe {
            asm!("mfence", options(nostack, preserves_flags));
        }
    }

    /// Barreira de loads (LFENCE).
    #[inline]
    pub fn load_fence() {
        unsafe {
            asm!("lfence", options(nostack, preserves_flags));
        }
    }

    /// Barreira de stores (SFENCE).
    #[inline]
    pub fn store_fence() {
        unsafe {
            asm!("sfence", options(nostack, preserves_flags));
        }
    }

    /// Barreira de compilador (sem instrução emitida).
    #[inline]
    pub fn compiler_fence() {
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
    }

    /// Salva o estado de FPU/SSE em uma área de 512 bytes (FXSAVE64).
    ///
    /// # Safety
    /// `area` deve ter 512 bytes alinhados a 16.
    #[inline]
    pub unsafe fn fxsave(area: *mut u8) {
        asm!("fxsave64 [{}]", in(reg) area, options(nostack, preserves_flags));
    }

    /// Restaura o estado de FPU/SSE (FXRSTOR64).
    ///
    /// # Safety
    /// `area` deve conter um estado válido salvo por `fxsave`.
    #[inline]
    pub unsafe fn fxrstor(area: *const u8) {
        asm!("fxrstor64 [{}]", in(reg) area, options(nostack, preserves_flags));
    }

    /// Lê CR0.
    #[inline]
    pub fn read_cr0() -> u64 {
        let value: u64;
        unsafe {
            asm!("mov {}, cr0", out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }

    /// Lê CR2 (endereço da última falta de página).
    #[inline]
    pub fn read_cr2() -> u64 {
        let value: u64;
        unsafe {
            asm!("mov {}, cr2", out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }

    /// Lê CR4.
    #[inline]
    pub fn read_cr4() -> u64 {
        let value: u64;
        unsafe {
            asm!("mov {}, cr4", out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }

    /// Lê CR8 (Task Priority).
    #[inline]
    pub fn read_cr8() -> u64 {
        let value: u64;
        unsafe {
            asm!("mov {}, cr8", out(reg) value, options(nomem, nostack, preserves_flags));
        }
        value
    }

    /// Lê os registradores de debug (DR0-DR3, DR6, DR7).
    pub fn read_debug_registers() -> [u64; 6] {
        let (dr0, dr1, dr2, dr3, dr6, dr7): (u64, u64, u64, u64, u64, u64);
        unsafe {
            asm!("mov {}, dr0", out(reg) dr0, options(nomem, nostack, preserves_flags));
            asm!("mov {}, dr1", out(reg) dr1, options(nomem, nostack, preserves_flags));
            asm!("mov {}, dr2", out(reg) dr2, options(nomem, nostack, preserves_flags));
            asm!("mov {}, dr3", out(reg) dr3, options(nomem, nostack, preserves_flags));
            asm!("mov {}, dr6", out(reg) dr6, options(nomem, nostack, preserves_flags));
            asm!("mov {}, dr7", out(reg) dr7, options(nomem, nostack, preserves_flags));
        }
        [dr0, dr1, dr2, dr3, dr6, dr7]
    }

    /// Inicializa FPU/SSE no core atual.
    ///
    /// Sem isso, memcpy otimizado do Rust gera #UD.
    ///
    /// # Safety
    /// Requer Ring 0; chamar uma vez por core.
    pub unsafe fn init_sse() {
        let mut cr0: u64;
        let mut cr4: u64;

        // CR0: Clear EM (bit 2), Clear TS (bit 3), Set MP (bit 1)
        asm!("mov {}, cr0", out(reg) cr0, options(nomem, nostack, preserves_flags));
        cr0 &= !(1 << 2);
        cr0 &= !(1 << 3);
        cr0 |= 1 << 1;
        asm!("mov cr0, {}", in(reg) cr0, options(nomem, nostack, preserves_flags));

        // CR4: Set OSFXSR (bit 9), Set OSXMMEXCPT (bit 10)
        asm!("mov {}, cr4", out(reg) cr4, options(nomem, nostack, preserves_flags));
        cr4 |= 1 << 9;
        cr4 |= 1 << 10;
        asm!("mov cr4, {}", in(reg) cr4, options(nomem, nostack, preserves_flags));

        // x87 init + MXCSR padrão (exceções mascaradas, round-to-nearest)
        asm!("fninit", options(nomem, nostack, preserves_flags));
        let mxcsr: u32 = 0x1F80;
        asm!("ldmxcsr [{}]", in(reg) &mxcsr, options(nostack, preserves_flags));

        crate::ktrace!("(Arch) FPU/SSE habilitado (CR0.MP=1, CR4.OSFXSR=1)");
    }
}
