//! # Logging
//! src/logging.rs
//!
//! Instala el subscriber de `tracing`. `RUST_LOG` tiene prioridad; si no
//! está definido se usa el nivel configurado para este crate.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Filtro por defecto para un nivel ("info" → "http_gate=info")
pub fn default_filter(level: &str) -> String {
    format!("{}={}", env!("CARGO_CRATE_NAME"), level.to_ascii_lowercase())
}

/// Instala el subscriber global. Falla si ya había uno.
pub fn init(level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter(level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_thread_names(true))
        .try_init()
}
