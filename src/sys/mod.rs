//! Definições de sistema: tipos básicos, códigos de erro, estruturas ELF.

pub mod elf;
pub mod error;
pub mod types;

#[cfg(feature = "self_test")]
pub mod test;

pub use error::Errno;
