//! # Sinks de Respuesta
//! src/sink/mod.rs
//!
//! Dos niveles de escritura de la respuesta:
//!
//! ```text
//! Stage → ResponseWriter (TrackedResponse / wrappers de stage) → RawResponse → socket
//! ```
//!
//! - `RawResponse`: el sink crudo del stack HTTP subyacente. Escribe la línea
//!   de estado y los headers cuando se le pide, y bytes del body.
//! - `ResponseWriter`: la interfaz que ven todos los stages. Además de
//!   `std::io::Write` expone headers, estado, commit y bytes escritos.
//!
//! Hijack y notificación de cierre son capacidades *opcionales*: los
//! métodos por defecto de `RawResponse` reportan que no están soportadas.

pub mod raw;
pub mod tracked;

pub use raw::StreamResponse;
pub use tracked::TrackedResponse;

use crate::error::SinkError;
use crate::http::{Headers, StatusCode};
use std::io::{self, Read, Write};
use std::sync::mpsc::Receiver;

/// Transporte subyacente entregado por un hijack
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send> Transport for T {}

/// Sink crudo de una respuesta
pub trait RawResponse {
    fn headers(&self) -> &Headers;

    fn headers_mut(&mut self) -> &mut Headers;

    /// Escribe la línea de estado y los headers actuales
    fn write_status(&mut self, status: StatusCode) -> io::Result<()>;

    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    fn flush(&mut self) -> io::Result<()>;

    /// Entrega el transporte subyacente al llamador
    fn hijack(&mut self) -> Result<Box<dyn Transport>, SinkError> {
        Err(SinkError::HijackUnsupported)
    }

    /// Canal que recibe un mensaje cuando el cliente se desconecta.
    /// `None` significa que la capacidad no está soportada.
    fn close_notify(&mut self) -> Option<Receiver<()>> {
        None
    }
}

/// Interfaz de escritura que comparten todos los stages del pipeline
pub trait ResponseWriter: Write {
    fn headers(&self) -> &Headers;

    fn headers_mut(&mut self) -> &mut Headers;

    /// Registra el código de estado. No lo compromete.
    fn set_status(&mut self, status: StatusCode);

    /// Código registrado (200 si nadie lo estableció)
    fn status(&self) -> StatusCode;

    /// `true` una vez que la línea de estado llegó al sink crudo
    fn is_committed(&self) -> bool;

    /// Bytes de body entregados al sink crudo
    fn bytes_written(&self) -> u64;

    fn hijack(&mut self) -> Result<Box<dyn Transport>, SinkError>;

    fn close_notify(&mut self) -> Option<Receiver<()>>;
}
