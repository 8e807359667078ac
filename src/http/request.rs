//! # Parsing de Requests HTTP/1.x
//! src/http/request.rs
//!
//! Parser mínimo del request que alimenta al pipeline. El núcleo solo
//! necesita el método, el target, la versión y los headers (para
//! `Accept-Encoding`, `Host`, `Referer`, `User-Agent`).
//!
//! ## Formato
//!
//! ```text
//! GET /path?param1=value1 HTTP/1.0\r\n
//! Host: localhost:8080\r\n
//! Accept-Encoding: gzip\r\n
//! \r\n
//! ```

use super::headers::Headers;
use std::collections::HashMap;
use std::net::SocketAddr;
use thiserror::Error;

/// Métodos HTTP soportados
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GET,
    HEAD,
    POST,
}

impl Method {
    fn parse(s: &str) -> Result<Self, ParseError> {
        match s {
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            "POST" => Ok(Method::POST),
            _ => Err(ParseError::UnsupportedMethod(s.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
        }
    }
}

/// Request HTTP parseado
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,

    /// Target tal como llegó en la request line (path + query)
    target: String,

    /// Path sin query (ej: "/stats")
    path: String,

    query_params: HashMap<String, String>,

    headers: Headers,

    /// "HTTP/1.0" o "HTTP/1.1"
    version: String,

    body: Vec<u8>,

    /// Dirección del cliente, si el servidor la conoce
    remote_addr: Option<SocketAddr>,
}

/// Errores que pueden ocurrir durante el parsing
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Request vacío
    #[error("Empty request")]
    EmptyRequest,

    /// Formato inválido de la request line
    #[error("Invalid request line format")]
    InvalidRequestLine,

    /// Método HTTP no soportado
    #[error("Unsupported HTTP method: {0}")]
    UnsupportedMethod(String),

    /// Versión HTTP distinta de 1.0 / 1.1
    #[error("Invalid HTTP version: {0}")]
    InvalidHttpVersion(String),

    /// Header sin ':'
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
}

impl Request {
    /// Parsea un request desde bytes
    ///
    /// # Ejemplo
    ///
    /// ```
    /// use http_gate::http::Request;
    ///
    /// let raw = b"GET /stats?pretty=1 HTTP/1.0\r\nAccept-Encoding: gzip\r\n\r\n";
    /// let request = Request::parse(raw).unwrap();
    ///
    /// assert_eq!(request.path(), "/stats");
    /// assert_eq!(request.query_param("pretty"), Some("1"));
    /// assert_eq!(request.header("accept-encoding"), Some("gzip"));
    /// ```
    pub fn parse(buffer: &[u8]) -> Result<Self, ParseError> {
        let (head, body) = match find_header_end(buffer) {
            Some(end) => (&buffer[..end], &buffer[end + 4..]),
            None => (buffer, &[][..]),
        };

        let head = std::str::from_utf8(head).map_err(|_| ParseError::InvalidRequestLine)?;
        if head.trim().is_empty() {
            return Err(ParseError::EmptyRequest);
        }

        let mut lines = head.split("\r\n");
        let request_line = lines.next().ok_or(ParseError::EmptyRequest)?;

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() != 3 {
            return Err(ParseError::InvalidRequestLine);
        }

        let method = Method::parse(parts[0])?;
        let target = parts[1].to_string();
        let version = parts[2].to_string();
        if version != "HTTP/1.0" && version != "HTTP/1.1" {
            return Err(ParseError::InvalidHttpVersion(version));
        }

        let (path, query_params) = split_target(&target);

        let mut headers = Headers::new();
        for line in lines {
            if line.trim().is_empty() {
                break;
            }
            match line.split_once(':') {
                Some((name, value)) => headers.append(name.trim(), value.trim()),
                None => return Err(ParseError::InvalidHeader(line.to_string())),
            }
        }

        let body = if method == Method::POST { body.to_vec() } else { Vec::new() };

        Ok(Request {
            method,
            target,
            path,
            query_params,
            headers,
            version,
            body,
            remote_addr: None,
        })
    }

    /// Asocia la dirección del cliente (la conoce el servidor, no el parser)
    pub fn with_remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    /// Target original (path + query), usado por el access log
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query_params.get(name).map(|s| s.as_str())
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Obtiene un header (sin distinguir mayúsculas)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Host del request, o "-" si no vino
    pub fn host(&self) -> &str {
        self.header("Host").unwrap_or("-")
    }

    /// Verifica si el cliente anuncia soporte para una codificación
    pub fn accepts_encoding(&self, encoding: &str) -> bool {
        self.header(super::headers::ACCEPT_ENCODING)
            .map(|v| v.contains(encoding))
            .unwrap_or(false)
    }
}

/// Posición de "\r\n\r\n", si ya llegó el final de los headers
pub fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|w| w == b"\r\n\r\n")
}

/// Separa "/path?a=1&b" en path y query params
fn split_target(target: &str) -> (String, HashMap<String, String>) {
    let Some((path, query)) = target.split_once('?') else {
        return (target.to_string(), HashMap::new());
    };

    let params = query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((k, v)) => (k.to_string(), url_decode(v)),
            None => (p.to_string(), String::new()),
        })
        .collect();

    (path.to_string(), params)
}

/// Decodificación básica: '+' y %XX
fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(b) => {
                        out.push(b);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
