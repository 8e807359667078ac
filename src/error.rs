//! # Errores del Núcleo
//! src/error.rs
//!
//! Tipos de error que produce el núcleo de admisión y el pipeline de respuesta.
//!
//! - `GateError::Closed` es un centinela: se retorna como valor, nunca como panic.
//! - `SinkError::HijackUnsupported` indica que el sink subyacente no expone
//!   la capacidad de hijack.

use thiserror::Error;

/// Errores del `ConnectionGate`
#[derive(Debug, Error)]
pub enum GateError {
    /// El gate ya comenzó (o terminó) su cierre ordenado
    #[error("<closed>")]
    Closed,

    /// Error del listener subyacente antes del cierre
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

impl GateError {
    /// Verifica si es el centinela de cierre
    pub fn is_closed(&self) -> bool {
        matches!(self, GateError::Closed)
    }
}

/// Errores del sink de respuesta
#[derive(Debug, Error)]
pub enum SinkError {
    /// El sink subyacente no soporta hijack
    #[error("hijack is not supported")]
    HijackUnsupported,

    #[error("sink I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_display() {
        assert_eq!(GateError::Closed.to_string(), "<closed>");
        assert!(GateError::Closed.is_closed());
    }

    #[test]
    fn test_io_is_not_closed() {
        let err = GateError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(!err.is_closed());
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_hijack_unsupported_display() {
        assert_eq!(SinkError::HijackUnsupported.to_string(), "hijack is not supported");
    }
}
