//! # Primitivas de Sincronização
//!
//! O kernel usa duas famílias de locks:
//!
//! - `sync::Spinlock`: lock interno com diagnóstico de deadlock (tags de
//!   holder/attempter, contagem de retries, unlock forçado opcional).
//!   Protege as estruturas centrais: bitmap de frames, address spaces,
//!   conjunto de processos.
//! - `spin::Mutex` / `spin::Lazy`: para estado de drivers e globals de
//!   inicialização única, onde o diagnóstico não compensa o overhead.
//!
//! Ordem de aquisição (deadlock por ordem é bug): bitmap de frames →
//! address space → conjunto de processos → locks finos.

mod spinlock;

#[cfg(feature = "self_test")]
pub mod test;

pub use spinlock::{set_unlock_deadlock, CriticalSection, SpinGuard, Spinlock};

// Re-export para inicialização preguiçosa de globals
pub use spin::Lazy;
