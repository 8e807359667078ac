//! # Respuesta con Commit Diferido
//! src/sink/tracked.rs
//!
//! `TrackedResponse` envuelve el sink crudo de un request. Registrar un
//! código de estado no lo escribe: el commit ocurre con el primer byte del
//! body o con un flush explícito. Hasta ese momento cualquier stage del
//! pipeline puede seguir cambiando headers (ej: `Content-Encoding`).
//!
//! El dispatcher hace un flush final incondicional, así que toda respuesta
//! queda comprometida aunque ningún stage escriba.

use super::{RawResponse, ResponseWriter, Transport};
use crate::error::SinkError;
use crate::http::{Headers, StatusCode};
use std::io::{self, Write};
use std::sync::mpsc::Receiver;

/// Wrapper de la respuesta de un único request
pub struct TrackedResponse<'a> {
    raw: &'a mut dyn RawResponse,
    status: Option<StatusCode>,
    committed: bool,
    bytes_written: u64,
}

impl<'a> TrackedResponse<'a> {
    pub fn new(raw: &'a mut dyn RawResponse) -> Self {
        Self {
            raw,
            status: None,
            committed: false,
            bytes_written: 0,
        }
    }

    fn ensure_committed(&mut self) -> io::Result<()> {
        if self.committed {
            return Ok(());
        }
        self.committed = true;
        self.raw.write_status(self.status())
    }
}

impl Write for TrackedResponse<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.ensure_committed()?;
        let n = self.raw.write(buf)?;
        self.bytes_written += n as u64;
        Ok(n)
    }

    /// Flush compromete la respuesta. Solo deberían llamarlo los stages
    /// con buffers internos, y siempre después de `Pipeline::next`.
    fn flush(&mut self) -> io::Result<()> {
        self.ensure_committed()?;
        self.raw.flush()
    }
}

impl ResponseWriter for TrackedResponse<'_> {
    fn headers(&self) -> &Headers {
        self.raw.headers()
    }

    fn headers_mut(&mut self) -> &mut Headers {
        self.raw.headers_mut()
    }

    fn set_status(&mut self, status: StatusCode) {
        if self.committed {
            return;
        }
        self.status = Some(status);
    }

    fn status(&self) -> StatusCode {
        self.status.unwrap_or_default()
    }

    fn is_committed(&self) -> bool {
        self.committed
    }

    fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    fn hijack(&mut self) -> Result<Box<dyn Transport>, SinkError> {
        self.raw.hijack()
    }

    fn close_notify(&mut self) -> Option<Receiver<()>> {
        self.raw.close_notify()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::mpsc;

    /// Sink crudo en memoria que registra cada commit
    #[derive(Default)]
    pub(crate) struct MemoryResponse {
        pub headers: Headers,
        pub committed: Vec<StatusCode>,
        /// Snapshot de los headers al momento del commit
        pub committed_headers: Option<Headers>,
        pub body: Vec<u8>,
        pub flushes: usize,
        pub notify: Option<mpsc::Sender<()>>,
    }

    impl RawResponse for MemoryResponse {
        fn headers(&self) -> &Headers {
            &self.headers
        }

        fn headers_mut(&mut self) -> &mut Headers {
            &mut self.headers
        }

        fn write_status(&mut self, status: StatusCode) -> io::Result<()> {
            self.committed.push(status);
            self.committed_headers = Some(self.headers.clone());
            Ok(())
        }

        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.body.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.flushes += 1;
            Ok(())
        }

        fn close_notify(&mut self) -> Option<Receiver<()>> {
            let (tx, rx) = mpsc::channel();
            self.notify = Some(tx);
            Some(rx)
        }
    }

    #[test]
    fn test_status_not_committed_until_write() {
        let mut raw = MemoryResponse::default();
        {
            let mut w = TrackedResponse::new(&mut raw);
            w.set_status(StatusCode::NOT_FOUND);
            assert!(!w.is_committed());
            assert_eq!(w.status(), StatusCode::NOT_FOUND);

            w.write_all(b"no existe").unwrap();
            assert!(w.is_committed());
            assert_eq!(w.bytes_written(), 9);
        }
        assert_eq!(raw.committed, vec![StatusCode::NOT_FOUND]);
        assert_eq!(raw.body, b"no existe");
    }

    #[test]
    fn test_default_status_is_ok() {
        let mut raw = MemoryResponse::default();
        {
            let mut w = TrackedResponse::new(&mut raw);
            w.flush().unwrap();
            assert!(w.is_committed());
        }
        assert_eq!(raw.committed, vec![StatusCode::OK]);
        assert_eq!(raw.flushes, 1);
    }

    #[test]
    fn test_status_ignored_after_commit() {
        let mut raw = MemoryResponse::default();
        {
            let mut w = TrackedResponse::new(&mut raw);
            w.set_status(StatusCode::CREATED);
            w.write_all(b"a").unwrap();
            w.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            w.write_all(b"b").unwrap();
            w.flush().unwrap();
            assert_eq!(w.status(), StatusCode::CREATED);
        }
        assert_eq!(raw.committed, vec![StatusCode::CREATED]);
    }

    #[test]
    fn test_arbitrary_status_reaches_status_line() {
        let mut raw = crate::sink::StreamResponse::new(std::io::Cursor::new(Vec::new()));
        {
            let mut w = TrackedResponse::new(&mut raw);
            w.set_status(StatusCode::from(429));
            w.write_all(b"despacio").unwrap();
            assert_eq!(w.status().as_u16(), 429);
        }
        let bytes = raw.into_inner().unwrap().unwrap().into_inner();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.0 429 Too Many Requests\r\n"), "got: {}", text);
        assert!(text.ends_with("\r\n\r\ndespacio"));

        let mut raw = MemoryResponse::default();
        {
            let mut w = TrackedResponse::new(&mut raw);
            w.set_status(StatusCode::from(418));
            w.flush().unwrap();
        }
        assert_eq!(raw.committed, vec![StatusCode::from(418)]);
    }

    #[test]
    fn test_headers_mutable_until_commit() {
        let mut raw = MemoryResponse::default();
        {
            let mut w = TrackedResponse::new(&mut raw);
            w.set_status(StatusCode::OK);
            w.headers_mut().set("Content-Encoding", "gzip");
            w.write_all(b"x").unwrap();
        }
        let snapshot = raw.committed_headers.unwrap();
        assert_eq!(snapshot.get("content-encoding"), Some("gzip"));
    }

    #[test]
    fn test_hijack_unsupported() {
        let mut raw = MemoryResponse::default();
        let mut w = TrackedResponse::new(&mut raw);
        assert!(matches!(w.hijack(), Err(SinkError::HijackUnsupported)));
    }

    #[test]
    fn test_close_notify_delegates() {
        let mut raw = MemoryResponse::default();
        let rx = {
            let mut w = TrackedResponse::new(&mut raw);
            w.close_notify().expect("soportado por el sink en memoria")
        };
        raw.notify.take().unwrap().send(()).unwrap();
        assert!(rx.recv().is_ok());
    }

    #[test]
    fn test_close_notify_unsupported_is_none() {
        let mut raw = crate::sink::StreamResponse::new(std::io::Cursor::new(Vec::new()));
        let mut w = TrackedResponse::new(&mut raw);
        assert!(w.close_notify().is_none());
    }
}
