//! # Stage de Compresión Gzip
//! src/pipeline/gzip.rs
//!
//! Comprime la respuesta cuando el cliente acepta gzip y el Content-Type
//! está en la lista permitida. La decisión se toma en la primera escritura:
//!
//! 1. Si un stage anterior ya puso `Content-Encoding`, no se toca nada
//! 2. El tipo sale de `Content-Type`; si falta, se detecta con los primeros
//!    bytes y se establece
//! 3. Si el tipo coincide con la lista, se toma un compresor del pool, se
//!    pone `Content-Encoding: gzip` y se quita `Content-Length`
//!
//! El framing gzip (header de 10 bytes y trailer CRC32 + largo) se escribe
//! aquí; el pool recicla solo el estado del deflate, que sí puede resetearse.

use super::{Pipeline, Stage};
use crate::error::SinkError;
use crate::http::headers::{CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE};
use crate::http::sniff::detect_content_type;
use crate::http::{Headers, Request, StatusCode};
use crate::pool::{Lifecycle, Pool, Pooled};
use crate::sink::{ResponseWriter, Transport};
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use regex::Regex;
use std::io::{self, Write};
use std::sync::mpsc::Receiver;

/// Tipos de contenido que vale la pena comprimir
pub const DEFAULT_ALLOW_LIST: &str = r"^text/|(json|javascript|plain|html|css|xml)";

/// Header gzip fijo: sin flags, sin mtime, SO desconocido
const GZIP_HEADER: [u8; 10] = [0x1f, 0x8b, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff];

/// Opciones del stage
#[derive(Debug, Clone)]
pub struct GzipOptions {
    /// Nivel de compresión 0-9
    pub level: u32,
    pub pool_initial: usize,
    pub pool_capacity: usize,
    pub allow_list: String,
}

impl Default for GzipOptions {
    fn default() -> Self {
        Self {
            level: 6,
            pool_initial: 4,
            pool_capacity: 64,
            allow_list: DEFAULT_ALLOW_LIST.to_string(),
        }
    }
}

/// Estado reciclable: el deflate y el CRC del cuerpo sin comprimir
pub struct GzipState {
    encoder: DeflateEncoder<Vec<u8>>,
    crc: Crc,
}

/// Crea compresores al nivel configurado y los deja apuntando a un Vec vacío
pub struct GzipLifecycle {
    level: Compression,
}

impl Lifecycle<GzipState> for GzipLifecycle {
    fn create(&self) -> GzipState {
        GzipState {
            encoder: DeflateEncoder::new(Vec::new(), self.level),
            crc: Crc::new(),
        }
    }

    fn reset(&self, state: &mut GzipState) {
        // reset() sobre un Vec nunca falla
        let _ = state.encoder.reset(Vec::new());
        state.crc.reset();
    }
}

/// Stage de compresión con pool de compresores
pub struct GzipStage {
    pool: Pool<GzipState, GzipLifecycle>,
    allow: Regex,
}

impl GzipStage {
    pub fn new(options: GzipOptions) -> Result<Self, regex::Error> {
        let allow = Regex::new(&options.allow_list)?;
        let lifecycle = GzipLifecycle {
            level: Compression::new(options.level.min(9)),
        };
        Ok(Self {
            pool: Pool::new(lifecycle, options.pool_initial, options.pool_capacity),
            allow,
        })
    }

    pub fn pool(&self) -> &Pool<GzipState, GzipLifecycle> {
        &self.pool
    }

    /// `true` si el Content-Type debe comprimirse
    pub fn allows(&self, content_type: &str) -> bool {
        self.allow.is_match(content_type)
    }
}

impl Stage for GzipStage {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request, next: &mut Pipeline<'_>) {
        if !req.accepts_encoding("gzip") {
            return next.next(w, req);
        }

        let mut gz = GzipResponse {
            inner: w,
            stage: self,
            decided: false,
            state: None,
        };
        next.next(&mut gz, req);

        if let Err(e) = gz.finish() {
            tracing::error!(error = %e, path = req.path(), "no se pudo cerrar el stream gzip");
        }
    }
}

/// Writer que decide en la primera escritura si comprime
struct GzipResponse<'w, 'p> {
    inner: &'w mut dyn ResponseWriter,
    stage: &'p GzipStage,
    decided: bool,
    state: Option<Pooled<'p, GzipState, GzipLifecycle>>,
}

impl GzipResponse<'_, '_> {
    fn decide(&mut self, first: &[u8]) -> io::Result<()> {
        self.decided = true;
        if self.inner.is_committed() {
            return Ok(());
        }

        let headers = self.inner.headers();
        if headers.get(CONTENT_ENCODING).is_some_and(|v| !v.is_empty()) {
            return Ok(());
        }

        let explicit = headers
            .get(CONTENT_TYPE)
            .filter(|ct| !ct.is_empty())
            .map(str::to_string);
        let content_type = match explicit {
            Some(ct) => ct,
            None => {
                let sniffed = detect_content_type(first);
                self.inner.headers_mut().set(CONTENT_TYPE, sniffed);
                sniffed.to_string()
            }
        };
        if !self.stage.allows(&content_type) {
            return Ok(());
        }

        let headers = self.inner.headers_mut();
        headers.set(CONTENT_ENCODING, "gzip");
        headers.remove(CONTENT_LENGTH);

        self.state = Some(self.stage.pool.get());
        self.inner.write_all(&GZIP_HEADER)
    }

    /// Pasa al sink lo que el deflate ya produjo
    fn drain(inner: &mut dyn ResponseWriter, state: &mut GzipState) -> io::Result<()> {
        let out = state.encoder.get_mut();
        if !out.is_empty() {
            inner.write_all(out)?;
            out.clear();
        }
        Ok(())
    }

    /// Termina el deflate y escribe el trailer. El compresor vuelve al pool
    /// al soltar el guard.
    fn finish(mut self) -> io::Result<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };
        state.encoder.try_finish()?;
        Self::drain(self.inner, &mut state)?;

        let mut trailer = [0u8; 8];
        trailer[..4].copy_from_slice(&state.crc.sum().to_le_bytes());
        trailer[4..].copy_from_slice(&state.crc.amount().to_le_bytes());
        self.inner.write_all(&trailer)
    }
}

impl Write for GzipResponse<'_, '_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.decided {
            self.decide(buf)?;
        }
        match self.state.as_mut() {
            None => self.inner.write(buf),
            Some(state) => {
                state.encoder.write_all(buf)?;
                state.crc.update(buf);
                Self::drain(self.inner, state)?;
                Ok(buf.len())
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(state) = self.state.as_mut() {
            state.encoder.flush()?;
            Self::drain(self.inner, state)?;
        }
        self.inner.flush()
    }
}

impl ResponseWriter for GzipResponse<'_, '_> {
    fn headers(&self) -> &Headers {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut Headers {
        self.inner.headers_mut()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.inner.set_status(status);
    }

    fn status(&self) -> StatusCode {
        self.inner.status()
    }

    fn is_committed(&self) -> bool {
        self.inner.is_committed()
    }

    fn bytes_written(&self) -> u64 {
        self.inner.bytes_written()
    }

    fn hijack(&mut self) -> Result<Box<dyn Transport>, SinkError> {
        self.inner.hijack()
    }

    fn close_notify(&mut self) -> Option<Receiver<()>> {
        self.inner.close_notify()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::from_fn;
    use crate::sink::tracked::tests::MemoryResponse;
    use crate::sink::TrackedResponse;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn request(accept_encoding: Option<&str>) -> Request {
        let raw = match accept_encoding {
            Some(enc) => format!("GET /page HTTP/1.0\r\nAccept-Encoding: {}\r\n\r\n", enc),
            None => "GET /page HTTP/1.0\r\n\r\n".to_string(),
        };
        Request::parse(raw.as_bytes()).unwrap()
    }

    fn gunzip(data: &[u8]) -> String {
        let mut out = String::new();
        GzDecoder::new(data).read_to_string(&mut out).unwrap();
        out
    }

    fn stage() -> GzipStage {
        GzipStage::new(GzipOptions {
            pool_initial: 1,
            pool_capacity: 2,
            ..GzipOptions::default()
        })
        .unwrap()
    }

    fn serve(stage: &GzipStage, req: &Request, handler: &dyn Stage) -> MemoryResponse {
        let mut raw = MemoryResponse::default();
        {
            let mut w = TrackedResponse::new(&mut raw);
            let stages: Vec<&dyn Stage> = vec![stage, handler];
            Pipeline::new(stages).next(&mut w, req);
            w.flush().unwrap();
        }
        raw
    }

    #[test]
    fn test_allow_list() {
        let stage = stage();
        assert!(stage.allows("text/html; charset=utf-8"));
        assert!(stage.allows("application/json"));
        assert!(stage.allows("application/javascript"));
        assert!(stage.allows("image/svg+xml"));
        assert!(!stage.allows("image/png"));
        assert!(!stage.allows("application/octet-stream"));
    }

    #[test]
    fn test_html_is_compressed() {
        let body = "<html><body>".to_string() + &"hola mundo ".repeat(200) + "</body></html>";
        let handler = {
            let body = body.clone();
            from_fn(move |w, _req, _next| {
                w.headers_mut().set(CONTENT_TYPE, "text/html");
                w.headers_mut().set(CONTENT_LENGTH, &body.len().to_string());
                w.write_all(body.as_bytes()).unwrap();
            })
        };
        let stage = stage();
        let raw = serve(&stage, &request(Some("gzip, deflate")), &handler);

        let committed = raw.committed_headers.unwrap();
        assert_eq!(committed.get("Content-Encoding"), Some("gzip"));
        assert_eq!(committed.get("Content-Length"), None);
        assert!(raw.body.len() < body.len());
        assert_eq!(gunzip(&raw.body), body);
    }

    #[test]
    fn test_sniffed_type_is_set_and_compressed() {
        let handler = from_fn(|w, _req, _next| {
            w.write_all(b"<!DOCTYPE html><p>sin content-type</p>").unwrap();
        });
        let stage = stage();
        let raw = serve(&stage, &request(Some("gzip")), &handler);

        let committed = raw.committed_headers.unwrap();
        assert_eq!(committed.get("Content-Type"), Some("text/html; charset=utf-8"));
        assert_eq!(committed.get("Content-Encoding"), Some("gzip"));
        assert_eq!(gunzip(&raw.body), "<!DOCTYPE html><p>sin content-type</p>");
    }

    #[test]
    fn test_without_accept_encoding_passes_through() {
        let handler = from_fn(|w, _req, _next| {
            w.headers_mut().set(CONTENT_TYPE, "text/plain");
            w.write_all(b"texto plano").unwrap();
        });
        let stage = stage();
        let raw = serve(&stage, &request(None), &handler);

        assert_eq!(raw.body, b"texto plano");
        assert_eq!(raw.headers.get("Content-Encoding"), None);
    }

    #[test]
    fn test_binary_type_passes_through() {
        let png = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0];
        let handler = from_fn(move |w, _req, _next| {
            w.headers_mut().set(CONTENT_TYPE, "image/png");
            w.write_all(&png).unwrap();
        });
        let stage = stage();
        let raw = serve(&stage, &request(Some("gzip")), &handler);

        assert_eq!(raw.body, png);
        assert_eq!(raw.headers.get("Content-Encoding"), None);
    }

    #[test]
    fn test_existing_encoding_is_respected() {
        let handler = from_fn(|w, _req, _next| {
            w.headers_mut().set(CONTENT_TYPE, "text/css");
            w.headers_mut().set(CONTENT_ENCODING, "br");
            w.write_all(b"ya comprimido").unwrap();
        });
        let stage = stage();
        let raw = serve(&stage, &request(Some("gzip")), &handler);

        assert_eq!(raw.body, b"ya comprimido");
        assert_eq!(raw.headers.get("Content-Encoding"), Some("br"));
    }

    #[test]
    fn test_no_body_leaves_response_untouched() {
        let handler = from_fn(|w, _req, _next| w.set_status(StatusCode::NO_CONTENT));
        let stage = stage();
        let raw = serve(&stage, &request(Some("gzip")), &handler);

        assert_eq!(raw.committed, vec![StatusCode::NO_CONTENT]);
        assert!(raw.body.is_empty());
        assert_eq!(raw.headers.get("Content-Encoding"), None);
    }

    #[test]
    fn test_compressor_returns_to_pool() {
        let handler = from_fn(|w, _req, _next| {
            w.headers_mut().set(CONTENT_TYPE, "application/json");
            w.write_all(br#"{"ok":true}"#).unwrap();
        });
        let stage = stage();
        assert_eq!(stage.pool().idle(), 1);

        for _ in 0..3 {
            let raw = serve(&stage, &request(Some("gzip")), &handler);
            assert_eq!(gunzip(&raw.body), r#"{"ok":true}"#);
        }
        assert_eq!(stage.pool().idle(), 1);
    }

    #[test]
    fn test_multiple_writes_and_flushes() {
        let handler = from_fn(|w, _req, _next| {
            w.headers_mut().set(CONTENT_TYPE, "text/plain");
            w.write_all(b"uno ").unwrap();
            w.flush().unwrap();
            w.write_all(b"dos ").unwrap();
            w.write_all(b"tres").unwrap();
        });
        let stage = stage();
        let raw = serve(&stage, &request(Some("gzip")), &handler);
        assert_eq!(gunzip(&raw.body), "uno dos tres");
    }

    #[test]
    fn test_invalid_allow_list() {
        let options = GzipOptions {
            allow_list: "(".to_string(),
            ..GzipOptions::default()
        };
        assert!(GzipStage::new(options).is_err());
    }
}
