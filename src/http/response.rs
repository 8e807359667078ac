//! # Construcción de Respuestas
//! src/http/response.rs
//!
//! `Response` es un builder en memoria para handlers simples: se arma
//! completa y luego se escribe a través del `ResponseWriter` del pipeline,
//! de modo que los stages exteriores (gzip, buffer, access log) la procesan
//! como cualquier otra escritura.
//!
//! ## Ejemplo de uso
//!
//! ```
//! use http_gate::http::{Response, StatusCode};
//!
//! let response = Response::new(StatusCode::OK)
//!     .with_header("Content-Type", "application/json")
//!     .with_body(r#"{"message": "Hello"}"#);
//!
//! assert_eq!(response.body(), br#"{"message": "Hello"}"#);
//! ```

use super::headers::{Headers, CONTENT_LENGTH, CONTENT_TYPE};
use super::StatusCode;
use crate::sink::ResponseWriter;
use std::io;

/// Respuesta HTTP completa en memoria
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    /// Crea una respuesta sin headers ni body
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Agrega (o sobrescribe) un header
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Versión mutable de `with_header`
    pub fn add_header(&mut self, name: &str, value: &str) {
        self.headers.set(name, value);
    }

    /// Establece el body y su `Content-Length`
    pub fn with_body(self, body: &str) -> Self {
        self.with_body_bytes(body.as_bytes().to_vec())
    }

    /// Establece un body binario y su `Content-Length`
    pub fn with_body_bytes(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self.headers.set(CONTENT_LENGTH, &self.body.len().to_string());
        self
    }

    /// Respuesta 200 con `Content-Type: application/json`
    pub fn json(body: &str) -> Self {
        Self::new(StatusCode::OK)
            .with_header(CONTENT_TYPE, "application/json")
            .with_body(body)
    }

    /// Respuesta de error con body `{"error": "mensaje"}`
    pub fn error(status: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({ "error": message }).to_string();
        Self::new(status)
            .with_header(CONTENT_TYPE, "application/json")
            .with_body(&body)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Copia headers y estado al writer y escribe el body.
    ///
    /// Los headers se establecen antes de escribir el primer byte, así que
    /// todavía no están comprometidos cuando llegan al writer.
    pub fn write_to(&self, w: &mut dyn ResponseWriter) -> io::Result<()> {
        for (name, value) in self.headers.iter() {
            w.headers_mut().set(name, value);
        }
        w.set_status(self.status);
        if !self.body.is_empty() {
            w.write_all(&self.body)?;
        }
        Ok(())
    }
}
