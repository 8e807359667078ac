//! # Códigos de Estado HTTP
//! src/http/status.rs
//!
//! Código de estado que el pipeline registra en una respuesta. Cualquier
//! valor numérico es válido; los más usados tienen constante y reason phrase.
//! El código solo se "compromete" (se escribe al socket) con el primer byte
//! del body o con un flush explícito; ver `sink::TrackedResponse`.

/// Código de estado HTTP
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StatusCode(u16);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(200);
    pub const CREATED: StatusCode = StatusCode(201);
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    pub const MOVED_PERMANENTLY: StatusCode = StatusCode(301);
    pub const FOUND: StatusCode = StatusCode(302);
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    /// Request malformado
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    pub const UNAUTHORIZED: StatusCode = StatusCode(401);
    pub const FORBIDDEN: StatusCode = StatusCode(403);
    /// Ruta o recurso no encontrado
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    pub const TOO_MANY_REQUESTS: StatusCode = StatusCode(429);
    /// Incluye panics recuperados en el dispatcher
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    /// El gate está cerrado
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    /// Convierte el código a su valor numérico
    ///
    /// # Ejemplo
    /// ```
    /// use http_gate::http::StatusCode;
    /// assert_eq!(StatusCode::NOT_FOUND.as_u16(), 404);
    /// assert_eq!(StatusCode::from(418).as_u16(), 418);
    /// ```
    pub const fn as_u16(&self) -> u16 {
        self.0
    }

    /// Texto de razón (reason phrase) del RFC 1945 / RFC 7231.
    /// Vacío para códigos sin texto conocido.
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            200 => "OK",
            201 => "Created",
            204 => "No Content",
            301 => "Moved Permanently",
            302 => "Found",
            304 => "Not Modified",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            429 => "Too Many Requests",
            500 => "Internal Server Error",
            503 => "Service Unavailable",
            _ => "",
        }
    }

    /// Verifica si el código indica éxito (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.0)
    }

    /// Verifica si el código indica error del servidor (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.0)
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode(code)
    }
}

impl Default for StatusCode {
    /// Código usado cuando nadie estableció uno antes del commit
    fn default() -> Self {
        StatusCode::OK
    }
}

impl std::fmt::Display for StatusCode {
    /// Formato de la status line: "200 OK", o "418 " sin reason phrase
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.0, self.reason_phrase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_ok() {
        assert_eq!(StatusCode::default(), StatusCode::OK);
    }

    #[test]
    fn test_any_code_is_representable() {
        assert_eq!(StatusCode::from(429), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(StatusCode::from(418).as_u16(), 418);
        assert_eq!(StatusCode::from(599).reason_phrase(), "");
    }

    #[test]
    fn test_classes() {
        assert!(StatusCode::NO_CONTENT.is_success());
        assert!(!StatusCode::NOT_FOUND.is_success());
        assert!(StatusCode::SERVICE_UNAVAILABLE.is_server_error());
        assert!(StatusCode::from(599).is_server_error());
        assert!(!StatusCode::BAD_REQUEST.is_server_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusCode::SERVICE_UNAVAILABLE.to_string(), "503 Service Unavailable");
        assert_eq!(StatusCode::NOT_FOUND.to_string(), "404 Not Found");
        assert_eq!(StatusCode::from(418).to_string(), "418 ");
    }
}
