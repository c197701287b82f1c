//! Utilitários internos do kernel (sem dependência de hardware).

pub mod align;
pub mod bitmap;
pub mod test_framework;

#[cfg(feature = "self_test")]
pub mod test;
