//! Funil central de interrupções.
//!
//! Todos os vetores chegam aqui com um `TrapFrame` completo. O fluxo:
//! 1. Rotaciona o anel de frames (RIPs interrompidos) para o crash screen.
//! 2. Exceções (vetor < 32) vão para o crash handler.
//! 3. IRQs com handler registrado recebem `on_interrupt(frame)`;
//!    sem handler, diagnóstico de IRQ órfã.
//! 4. EOI para o Local APIC.
//!
//! Registro: no máximo UM handler por vetor. Registro duplicado é
//! recusado com aviso — o primeiro permanece em vigor. O scheduler se
//! registra no vetor do timer; este módulo não conhece o scheduler.

pub use crate::arch::x86_64::interrupts::TrapFrame;

use crate::sync::Spinlock;

/// Primeiro vetor de IRQ (0..31 são exceções).
pub const IRQ_BASE: u8 = 0x20;

/// Vetor espúrio do LAPIC.
const SPURIOUS_VECTOR: u64 = 0xFF;

/// Tamanho do anel de frames: generoso em debug, mínimo em release.
pub const INT_FRAMES_MAX: usize = if cfg!(debug_assertions) { 512 } else { 8 };

/// Anel dos RIPs interrompidos mais recentes ([0] = mais novo).
/// Escrito apenas em contexto de ISR (interrupções desabilitadas);
/// lido pelo crash handler com a CPU congelada.
static mut INTERRUPT_FRAMES: [u64; INT_FRAMES_MAX] = [0; INT_FRAMES_MAX];

/// Handler de interrupção: um objeto por vetor.
pub trait InterruptHandler: Send + Sync {
    fn on_interrupt(&self, frame: &mut TrapFrame);
}

/// Slots de handler para os vetores 32..=255.
struct HandlerTable {
    slots: [Option<&'static dyn InterruptHandler>; 224],
}

static HANDLERS: Spinlock<HandlerTable> = Spinlock::new(HandlerTable {
    slots: [None; 224],
});

/// Registra um handler para `vector`.
///
/// Retorna `false` (com aviso) se o vetor já tem dono ou está fora do
/// range de IRQs — o registro anterior permanece em vigor.
pub fn register(vector: u8, handler: &'static dyn InterruptHandler) -> bool {
    if vector < IRQ_BASE {
        crate::kwarn!("(Int) Vetor de excecao nao aceita handler=", vector as u64);
        return false;
    }

    let mut table = HANDLERS.lock_critical("interrupts::register");
    let slot = &mut table.slots[(vector - IRQ_BASE) as usize];
    if slot.is_some() {
        crate::kwarn!("(Int) Vetor ja registrado, mantendo o primeiro=", vector as u64);
        return false;
    }
    *slot = Some(handler);
    crate::kdebug!("(Int) Handler registrado no vetor=", vector as u64);
    true
}

/// Remove o handler de `vector`.
pub fn unregister(vector: u8) {
    if vector < IRQ_BASE {
        return;
    }
    let mut table = HANDLERS.lock_critical("interrupts::unregister");
    let slot = &mut table.slots[(vector - IRQ_BASE) as usize];
    if slot.take().is_none() {
        crate::kwarn!("(Int) Vetor sem handler para remover=", vector as u64);
    }
}

/// Cópia do anel de frames (para o crash screen).
pub fn interrupt_frames() -> [u64; INT_FRAMES_MAX] {
    // SAFETY: leitura feita com a CPU congelada ou interrupções off.
    unsafe { *core::ptr::addr_of!(INTERRUPT_FRAMES) }
}

/// Ponto de entrada de TODAS as interrupções (chamado pelo stub asm).
pub fn dispatch(frame: &mut TrapFrame) {
    // 1. Anel de frames: desloca e registra o RIP interrompido
    // SAFETY: contexto de ISR, interrupções desabilitadas neste core.
    unsafe {
        let frames = &mut *core::ptr::addr_of_mut!(INTERRUPT_FRAMES);
        frames.copy_within(0..INT_FRAMES_MAX - 1, 1);
        frames[0] = frame.rip;
    }

    let vector = frame.int_num;

    // 2. Exceções → crash handler. Se ele retornar (falta de página
    //    resolvida pelo stack guard, fault de usuário), o iretq reexecuta.
    if vector < IRQ_BASE as u64 {
        crate::core::crash::handle(frame);
        return;
    }

    // 3. IRQs: handler registrado ou diagnóstico
    if vector != SPURIOUS_VECTOR {
        let handler = {
            // try_lock: nunca bloquear em ISR. Registro acontece com
            // interrupções desabilitadas, então contenção aqui é rara.
            match HANDLERS.try_lock("interrupts::dispatch") {
                Some(table) => table.slots[(vector - IRQ_BASE as u64) as usize],
                None => None,
            }
        };

        match handler {
            Some(handler) => handler.on_interrupt(frame),
            None => {
                let core = crate::core::smp::current_core_id();
                crate::kwarn!("(Int) IRQ sem handler=", vector - IRQ_BASE as u64);
                crate::kwarn!("(Int)   no core=", core as u64);
            }
        }
    }

    // 4. EOI (espúrio não recebe EOI)
    if vector != SPURIOUS_VECTOR {
        if let Some(lapic) = crate::arch::x86_64::apic::lapic::get() {
            lapic.eoi();
        }
    }
}
