//! Tipos básicos do kernel.

/// Identificador de processo.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Upid(pub u64);

impl Upid {
    pub const NONE: Upid = Upid(0);

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Identificador de thread.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Utid(pub u64);

impl Utid {
    pub const NONE: Utid = Utid(0);

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Offset em arquivo (lseek).
pub type Off = i64;
