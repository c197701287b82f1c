//! Drivers de hardware do kernel.
//!
//! O core do kernel só depende da serial (logging). Demais dispositivos
//! são responsabilidade de drivers carregáveis.

pub mod serial;
