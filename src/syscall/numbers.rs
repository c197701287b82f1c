//! Numeração de syscalls (congelada; parte da ABI com o userspace).
//!
//! Os números seguem a convenção Linux x86_64, o que mantém a opção de
//! boot `-y/--linux` trivial para as syscalls compartilhadas.

pub const SYS_LSEEK: u64 = 8;
pub const SYS_SLEEP: u64 = 35; // slot de nanosleep; argumento em ms
pub const SYS_FORK: u64 = 57;
pub const SYS_EXIT: u64 = 60;
