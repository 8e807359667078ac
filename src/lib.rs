//! # http_gate
//! src/lib.rs
//!
//! Servidor HTTP/1.0 con control de admisión sobre el socket y un pipeline
//! de respuesta con commit diferido de headers.
//!
//! ## Arquitectura
//!
//! ```text
//! TcpGateListener → ConnectionGate.accept → thread por conexión
//!     → Dispatcher: TrackedResponse + [admission, access-log?, gzip?, buffer?, router, flush]
//! ```
//!
//! - `gate`: histéresis de admisión, pausa dura, cierre ordenado
//! - `sink`: sink crudo y `TrackedResponse` (commit en el primer byte)
//! - `pipeline`: stages encadenados (gzip, buffer, access log, flush, handler)
//! - `pool`: pool acotado de objetos reciclables
//! - `server`: dispatcher y accept loop
//! - `http`, `router`, `config`, `logging`: piezas de soporte
//!
//! ## Ejemplo de uso
//!
//! ```no_run
//! use http_gate::config::Config;
//! use http_gate::server::Server;
//!
//! let server = Server::bind(Config::default()).expect("bind");
//! server.run().expect("accept loop");
//! ```

pub mod config;
pub mod error;
pub mod gate;
pub mod http;
pub mod logging;
pub mod pipeline;
pub mod pool;
pub mod router;
pub mod server;
pub mod sink;

pub use error::{GateError, SinkError};
