//! # Módulo HTTP
//! src/http/mod.rs
//!
//! Piezas HTTP que rodean al núcleo. El núcleo de admisión y el pipeline
//! no dependen del formato del protocolo; estas piezas existen para que el
//! servidor pueda correr de punta a punta:
//!
//! - Parsing de requests HTTP/1.0 (y request lines HTTP/1.1)
//! - Mapa de headers sin distinción de mayúsculas
//! - Códigos de estado
//! - Builder de respuestas en memoria
//! - Detección de Content-Type por contenido ("sniffing")

pub mod headers;
pub mod request;
pub mod response;
pub mod sniff;
pub mod status;

pub use headers::Headers;
pub use request::{Method, ParseError, Request};
pub use response::Response;
pub use status::StatusCode;
