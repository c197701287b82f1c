//! Spinlock com diagnóstico de deadlock.
//!
//! Cada lock carrega tags legíveis de quem o segura (`holder`) e de quem
//! está tentando adquirir (`attempter`). Quando um acquire ultrapassa o
//! limite de retries, o kernel loga ambos os lados. Com a opção de boot
//! `--udl true`, o lock é destravado à força após 10 relatórios.
//!
//! # Quando usar
//! - Seções críticas curtas das estruturas centrais (PMM, VMM, tasking).
//! - Nunca dentro de caminhos que podem dormir.

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::arch::x86_64::cpu::Cpu;

/// Limite de spins antes de suspeitar de deadlock.
#[cfg(debug_assertions)]
const DEADLOCK_RETRIES: u64 = 0x100000;
#[cfg(not(debug_assertions))]
const DEADLOCK_RETRIES: u64 = 0x10000000;

/// Relatórios de deadlock até o unlock forçado (com `--udl true`).
const FORCED_UNLOCK_REPORTS: u64 = 10;

/// Tag neutra (lock livre).
const TAG_NONE: &str = "(nul)";

/// Flag global: destravar deadlocks à força (opção de boot `--udl`).
static UNLOCK_DEADLOCK: AtomicBool = AtomicBool::new(false);

/// Liga/desliga o unlock forçado de deadlocks (chamado pelo parser de config).
pub fn set_unlock_deadlock(enabled: bool) {
    UNLOCK_DEADLOCK.store(enabled, Ordering::Relaxed);
}

/// Spinlock com dados protegidos e diagnóstico de deadlock.
pub struct Spinlock<T> {
    locked: AtomicBool,
    /// Tag de quem segura o lock. Escrita apenas sob o lock; leitura no
    /// caminho de diagnóstico é best-effort (mesma fidelidade do holder
    /// em C com `const char *`).
    holder: UnsafeCell<&'static str>,
    /// Tag de quem está tentando adquirir (best-effort, só diagnóstico).
    attempter: UnsafeCell<&'static str>,
    /// Total de aquisições.
    count: AtomicU64,
    /// Core dono do lock no momento.
    core: AtomicU64,
    /// Relatórios de deadlock emitidos desde a última aquisição limpa.
    deadlock_reports: AtomicU64,
    data: UnsafeCell<T>,
}

// SAFETY: o acesso a `data` só acontece com o lock adquirido; as tags são
// material de diagnóstico e nunca são dereferenciadas fora de &'static str.
unsafe impl<T: Send> Send for Spinlock<T> {}
unsafe impl<T: Send> Sync for Spinlock<T> {}

impl<T> Spinlock<T> {
    /// Cria novo spinlock (const para estáticos).
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            holder: UnsafeCell::new(TAG_NONE),
            attempter: UnsafeCell::new(TAG_NONE),
            count: AtomicU64::new(0),
            core: AtomicU64::new(u64::MAX),
            deadlock_reports: AtomicU64::new(0),
            data: UnsafeCell::new(data),
        }
    }

    /// Adquire o lock. `tag` identifica o chamador nos diagnósticos
    /// (por convenção, o nome da função).
    pub fn lock(&self, tag: &'static str) -> SpinGuard<'_, T> {
        self.acquire(tag);
        SpinGuard {
            lock: self,
            interrupts_were_enabled: None,
        }
    }

    /// Adquire o lock como seção crítica: salva o estado de interrupções,
    /// desabilita, e o guard restaura na saída do escopo.
    ///
    /// Obrigatório sempre que o dado também é tocado pela ISR do próprio
    /// core (ex.: fila de prontos vs. tick do timer).
    pub fn lock_critical(&self, tag: &'static str) -> SpinGuard<'_, T> {
        let enabled = Cpu::interrupts_enabled();
        unsafe { Cpu::disable_interrupts() };
        self.acquire(tag);
        SpinGuard {
            lock: self,
            interrupts_were_enabled: Some(enabled),
        }
    }

    /// Tenta adquirir sem bloquear (uso em contexto de interrupção).
    pub fn try_lock(&self, tag: &'static str) -> Option<SpinGuard<'_, T>> {
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.book_acquisition(tag);
            Some(SpinGuard {
                lock: self,
                interrupts_were_enabled: None,
            })
        } else {
            None
        }
    }

    fn acquire(&self, tag: &'static str) {
        // SAFETY: escrita best-effort de diagnóstico, ver doc do campo.
        unsafe { core::ptr::write_volatile(self.attempter.get(), tag) };

        // Re-aquisição no mesmo core é erro de programação: o spin nunca
        // terminaria. Diagnosticamos e seguimos para o caminho de deadlock.
        if self.locked.load(Ordering::Relaxed)
            && self.core.load(Ordering::Relaxed) == crate::core::smp::current_core_id() as u64
        {
            crate::kerror!("(Lock) Re-aquisicao no mesmo core! Holder:");
            crate::klog!("  ");
            crate::klog!(unsafe { core::ptr::read_volatile(self.holder.get()) });
            crate::klog!(" <- ");
            crate::klog!(tag);
            crate::knl!();
        }

        let mut retries: u64 = 0;
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            Cpu::relax();
            retries += 1;
            if retries > DEADLOCK_RETRIES {
                retries = 0;
                self.report_deadlock(tag);
            }
        }

        self.book_acquisition(tag);
    }

    fn book_acquisition(&self, tag: &'static str) {
        // SAFETY: lock adquirido, somos o único escritor do holder.
        unsafe { core::ptr::write_volatile(self.holder.get(), tag) };
        self.core.store(
            crate::core::smp::current_core_id() as u64,
            Ordering::Relaxed,
        );
        self.count.fetch_add(1, Ordering::Relaxed);
        self.deadlock_reports.store(0, Ordering::Relaxed);
    }

    /// Caminho de deadlock suspeito: loga os dois lados e, com `--udl`,
    /// destrava à força depois de FORCED_UNLOCK_REPORTS relatórios.
    fn report_deadlock(&self, tag: &'static str) {
        let holder = unsafe { core::ptr::read_volatile(self.holder.get()) };
        crate::kerror!("(Lock) Deadlock suspeito!");
        crate::klog!("  holder: ");
        crate::klog!(holder);
        crate::klog!("  attempter: ");
        crate::klog!(tag);
        crate::klog!("  core=", self.core.load(Ordering::Relaxed));
        crate::klog!("  count=", self.count.load(Ordering::Relaxed));
        crate::knl!();

        let reports = self.deadlock_reports.fetch_add(1, Ordering::Relaxed) + 1;
        if reports >= FORCED_UNLOCK_REPORTS && UNLOCK_DEADLOCK.load(Ordering::Relaxed) {
            crate::kwarn!("(Lock) Unlock forcado (--udl) apos relatorios=", reports);
            self.deadlock_reports.store(0, Ordering::Relaxed);
            self.locked.store(false, Ordering::Release);
        }
    }
}

/// Guard do spinlock: libera ao sair do escopo por qualquer caminho.
pub struct SpinGuard<'a, T> {
    lock: &'a Spinlock<T>,
    /// `Some(estado)` quando o guard veio de `lock_critical`.
    interrupts_were_enabled: Option<bool>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: lock está adquirido
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: lock está adquirido
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        // SAFETY: ainda somos o dono do lock.
        unsafe { core::ptr::write_volatile(self.lock.holder.get(), TAG_NONE) };
        self.lock.core.store(u64::MAX, Ordering::Relaxed);
        self.lock.locked.store(false, Ordering::Release);

        if let Some(true) = self.interrupts_were_enabled {
            unsafe { Cpu::enable_interrupts() };
        }
    }
}

/// Seção crítica sem lock: desabilita interrupções no escopo e restaura
/// o estado anterior na saída.
pub struct CriticalSection {
    interrupts_were_enabled: bool,
}

impl CriticalSection {
    pub fn new() -> Self {
        let enabled = Cpu::interrupts_enabled();
        unsafe { Cpu::disable_interrupts() };
        Self {
            interrupts_were_enabled: enabled,
        }
    }

    /// O estado de interrupções capturado na entrada.
    pub fn interrupts_were_enabled(&self) -> bool {
        self.interrupts_were_enabled
    }
}

impl Default for CriticalSection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        if self.interrupts_were_enabled {
            unsafe { Cpu::enable_interrupts() };
        }
    }
}
