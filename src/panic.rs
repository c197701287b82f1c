//! Panic Handler do Kernel.
//!
//! Um panic em contexto de kernel é irrecuperável: reportamos o local e a
//! mensagem pela serial e congelamos a CPU pelo mesmo caminho do crash
//! handler (sem tentativa de recuperação de estado).

use core::panic::PanicInfo;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::arch::x86_64::cpu::Cpu;

/// Evita recursão caso o próprio caminho de panic cause outro panic.
static IN_PANIC: AtomicBool = AtomicBool::new(false);

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    unsafe { Cpu::disable_interrupts() };

    if IN_PANIC.swap(true, Ordering::SeqCst) {
        // Panic dentro do panic: nada mais a fazer.
        Cpu::stop();
    }

    crate::kerror!("==================== KERNEL PANIC ====================");

    if let Some(location) = info.location() {
        crate::klog!("  em: ");
        crate::klog!(location.file());
        crate::klog!(" linha=", location.line() as u64);
        crate::knl!();
    }

    // A mensagem usa core::fmt; neste ponto do boot SSE já está habilitado.
    use core::fmt::Write;
    let mut writer = crate::drivers::serial::Writer;
    let _ = write!(writer, "  {}\r\n", info.message());

    crate::core::crash::freeze();
}
