//! # Módulo del Servidor HTTP
//! src/server/mod.rs
//!
//! - `dispatcher`: arma el pipeline de cada request sobre el gate
//! - `tcp`: accept loop y manejo de conexiones (un thread por conexión)

pub mod dispatcher;
pub mod tcp;

// Re-exportar para facilitar el uso
pub use dispatcher::{AdmissionStage, Dispatcher, PanicPolicy};
pub use tcp::Server;
