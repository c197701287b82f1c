//! Configuração do kernel via linha de comando.
//!
//! A linha de comando chega do bootloader como uma string estilo shell.
//! Cada opção reconhecida altera um campo do registro global de
//! configuração; opções desconhecidas geram aviso. `-h/--help` imprime a
//! tabela de opções e para a máquina.

use crate::arch::Cpu;
use crate::sync::Spinlock;

/// Alocador de heap escolhido no boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocatorType {
    Pages,
    XallocV1,
    XallocV2,
    Liballoc11,
}

/// Modo do scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerMode {
    Multi,
    Single,
}

/// Caminho em buffer fixo (a configuração precisa ser const-construível
/// e copiável; vive antes do heap).
#[derive(Debug, Clone, Copy)]
pub struct FixedPath {
    buf: [u8; 256],
    len: usize,
}

impl FixedPath {
    pub const fn from_bytes(path: &[u8]) -> Self {
        let mut buf = [0u8; 256];
        let mut i = 0;
        while i < path.len() && i < 256 {
            buf[i] = path[i];
            i += 1;
        }
        Self { buf, len: i }
    }

    pub fn set(&mut self, path: &str) {
        let bytes = path.as_bytes();
        let len = bytes.len().min(256);
        self.buf[..len].copy_from_slice(&bytes[..len]);
        self.len = len;
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.buf[..self.len]).unwrap_or("")
    }
}

/// Registro de configuração do kernel.
#[derive(Debug, Clone, Copy)]
pub struct KernelConfig {
    pub allocator: AllocatorType,
    pub scheduler: SchedulerMode,
    pub driver_directory: FixedPath,
    pub init_path: FixedPath,
    pub use_linux_syscalls: bool,
    pub interrupts_on_crash: bool,
    pub cores: usize,
    pub ioapic_interrupt_core: usize,
    pub unlock_deadlock: bool,
    pub simd: bool,
    pub quiet: bool,
}

impl KernelConfig {
    const fn defaults() -> Self {
        Self {
            allocator: AllocatorType::Liballoc11,
            scheduler: SchedulerMode::Multi,
            driver_directory: FixedPath::from_bytes(b"/usr/lib/drivers"),
            init_path: FixedPath::from_bytes(b"/bin/init"),
            use_linux_syscalls: false,
            interrupts_on_crash: true,
            cores: 0,
            ioapic_interrupt_core: 0,
            unlock_deadlock: false,
            simd: false,
            quiet: false,
        }
    }
}

static CONFIG: Spinlock<KernelConfig> = Spinlock::new(KernelConfig::defaults());

/// Cópia da configuração atual.
///
/// Seção crítica: o tick do scheduler também lê a configuração, então um
/// holder interrompido no mesmo core travaria a ISR para sempre.
pub fn config() -> KernelConfig {
    *CONFIG.lock_critical("config::config")
}

/// Tokenizador estilo shell: separa por espaços, respeitando aspas.
struct Tokens<'a> {
    rest: &'a str,
}

impl<'a> Iterator for Tokens<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let rest = self.rest.trim_start();
        if rest.is_empty() {
            self.rest = rest;
            return None;
        }

        if let Some(stripped) = rest.strip_prefix('"') {
            let end = stripped.find('"').unwrap_or(stripped.len());
            self.rest = &stripped[(end + 1).min(stripped.len())..];
            return Some(&stripped[..end]);
        }

        let end = rest.find(' ').unwrap_or(rest.len());
        self.rest = &rest[end..];
        Some(&rest[..end])
    }
}

fn parse_bool(value: &str) -> bool {
    value == "true"
}

fn parse_usize(value: &str) -> usize {
    let mut result = 0usize;
    for b in value.bytes() {
        if !b.is_ascii_digit() {
            return 0;
        }
        result = result * 10 + (b - b'0') as usize;
    }
    result
}

fn print_help() -> ! {
    crate::kinfo!("Uso: anvil [OPCAO]...");
    crate::kinfo!("  -a, --alloc TYPE      Alocador de heap (pages|xallocv1|xallocv2|liballoc11)");
    crate::kinfo!("  -c, --cores N         Numero de cores (0 = todos)");
    crate::kinfo!("  -p, --ioapicirq N     Core alvo das interrupcoes do I/O APIC");
    crate::kinfo!("  -t, --tasking MODE    Modo do scheduler (multi|single)");
    crate::kinfo!("  -d, --drvdir PATH     Diretorio de drivers");
    crate::kinfo!("  -i, --init PATH       Programa init");
    crate::kinfo!("  -y, --linux BOOL      ABI de syscalls Linux por padrao");
    crate::kinfo!("      --udl BOOL        Destravar deadlocks apos 10 retries");
    crate::kinfo!("      --ioc BOOL        Teclas de navegacao na tela de crash");
    crate::kinfo!("      --simd BOOL       Instrucoes SIMD no kernel");
    crate::kinfo!("      --quiet BOOL      Boot silencioso");
    crate::kinfo!("  -h, --help            Esta tabela");
    crate::kinfo!("Sistema parado.");
    Cpu::stop();
}

/// Interpreta a linha de comando e atualiza a configuração global.
pub fn parse(cmdline: &str) {
    if cmdline.is_empty() {
        crate::kinfo!("(Config) Linha de comando vazia, usando defaults");
        return;
    }

    crate::kinfo!("(Config) Parametros do kernel:");
    crate::klog!("  ");
    crate::klog!(cmdline);
    crate::knl!();

    let mut cfg = CONFIG.lock_critical("config::parse");
    let mut tokens = Tokens { rest: cmdline };

    while let Some(token) = tokens.next() {
        // Suportar "--opcao=valor" além de "--opcao valor"
        let (option, inline_value) = match token.split_once('=') {
            Some((o, v)) => (o, Some(v)),
            None => (token, None),
        };

        let mut value = || inline_value.or_else(|| tokens.next()).unwrap_or("");

        match option {
            "-a" | "--alloc" => {
                match value() {
                    "pages" => cfg.allocator = AllocatorType::Pages,
                    "xallocv1" => cfg.allocator = AllocatorType::XallocV1,
                    "xallocv2" => cfg.allocator = AllocatorType::XallocV2,
                    "liballoc11" => cfg.allocator = AllocatorType::Liballoc11,
                    unknown => {
                        crate::kwarn!("(Config) Alocador desconhecido:");
                        crate::klog!("  ");
                        crate::klog!(unknown);
                        crate::knl!();
                    }
                }
            }
            "-c" | "--cores" => {
                cfg.cores = parse_usize(value());
                crate::kinfo!("(Config) Cores=", cfg.cores as u64);
            }
            "-p" | "--ioapicirq" => {
                cfg.ioapic_interrupt_core = parse_usize(value());
                crate::kinfo!(
                    "(Config) Interrupcoes do I/O APIC no core=",
                    cfg.ioapic_interrupt_core as u64
                );
            }
            "-t" | "--tasking" => {
                cfg.scheduler = match value() {
                    "single" => SchedulerMode::Single,
                    "multi" => SchedulerMode::Multi,
                    _ => {
                        crate::kwarn!("(Config) Modo de scheduler desconhecido, usando multi");
                        SchedulerMode::Multi
                    }
                };
            }
            "-d" | "--drvdir" => {
                cfg.driver_directory.set(value());
            }
            "-i" | "--init" => {
                cfg.init_path.set(value());
            }
            "-y" | "--linux" => {
                cfg.use_linux_syscalls = parse_bool(value());
            }
            "--udl" => {
                cfg.unlock_deadlock = parse_bool(value());
                crate::sync::set_unlock_deadlock(cfg.unlock_deadlock);
                if cfg.unlock_deadlock {
                    crate::kinfo!("(Config) Deadlocks serao destravados apos 10 retries");
                }
            }
            "--ioc" => {
                cfg.interrupts_on_crash = parse_bool(value());
            }
            "--simd" => {
                cfg.simd = parse_bool(value());
            }
            "--quiet" => {
                cfg.quiet = parse_bool(value());
            }
            "-h" | "--help" => {
                drop(cfg);
                print_help();
            }
            other => {
                crate::kwarn!("(Config) Opcao desconhecida:");
                crate::klog!("  ");
                crate::klog!(other);
                crate::knl!();
            }
        }
    }

    crate::kdebug!("(Config) Configuracao carregada");
}
