//! Camada mínima de arquivos: a tabela de file descriptors por processo.
//!
//! Um VFS completo fica fora do core; o que o kernel runtime precisa é a
//! primitiva de seek consumida pela syscall `lseek`.

pub mod fd;

#[cfg(feature = "self_test")]
pub mod test;
