//! # Sink Crudo sobre un Stream
//! src/sink/raw.rs
//!
//! `StreamResponse` serializa una respuesta HTTP/1.0 directamente sobre
//! el stream de la conexión (normalmente un `TcpStream`).
//!
//! No escribe `Content-Length` por su cuenta: en HTTP/1.0 el fin del body
//! lo marca el cierre de la conexión.

use super::{RawResponse, Transport};
use crate::error::SinkError;
use crate::http::{Headers, StatusCode};
use std::io::{self, BufWriter, Write};

/// Tamaño del buffer de escritura del socket
const STREAM_BUFFER_SIZE: usize = 4 << 10;

/// Respuesta cruda escrita sobre un stream
pub struct StreamResponse<S: Transport> {
    /// `None` después de un hijack
    stream: Option<BufWriter<S>>,
    headers: Headers,
    status_written: bool,
    /// Para requests HEAD: se escriben headers pero no body
    discard_body: bool,
}

impl<S: Transport> StreamResponse<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(BufWriter::with_capacity(STREAM_BUFFER_SIZE, stream)),
            headers: Headers::new(),
            status_written: false,
            discard_body: false,
        }
    }

    pub fn discard_body(mut self, discard: bool) -> Self {
        self.discard_body = discard;
        self
    }

    /// Verifica si la línea de estado ya se escribió
    pub fn is_status_written(&self) -> bool {
        self.status_written
    }

    /// Vacía el buffer y devuelve el stream (si no hubo hijack)
    pub fn into_inner(self) -> io::Result<Option<S>> {
        match self.stream {
            Some(stream) => stream.into_inner().map(Some).map_err(|e| e.into_error()),
            None => Ok(None),
        }
    }

    fn stream(&mut self) -> io::Result<&mut BufWriter<S>> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "response was hijacked"))
    }
}

impl<S: Transport + 'static> RawResponse for StreamResponse<S> {
    fn headers(&self) -> &Headers {
        &self.headers
    }

    fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    fn write_status(&mut self, status: StatusCode) -> io::Result<()> {
        if self.status_written {
            return Ok(());
        }
        self.status_written = true;

        let mut head = format!("HTTP/1.0 {}\r\n", status);
        for (name, value) in self.headers.iter() {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");

        self.stream()?.write_all(head.as_bytes())
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.status_written {
            self.write_status(StatusCode::OK)?;
        }
        if self.discard_body {
            return Ok(buf.len());
        }
        self.stream()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.flush()
    }

    fn hijack(&mut self) -> Result<Box<dyn Transport>, SinkError> {
        let stream = self
            .stream
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "response already hijacked"))?;
        let stream = stream.into_inner().map_err(|e| e.into_error())?;
        Ok(Box::new(stream))
    }
}
