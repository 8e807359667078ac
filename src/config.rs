//! # Configuración del Servidor
//! src/config.rs
//!
//! Configuración del gate, del pipeline y del servidor, con soporte para
//! argumentos CLI y variables de entorno.
//!
//! ## Ejemplos de uso
//!
//! ### CLI
//! ```bash
//! ./http_gate --port 8080 \
//!   --max-conn 500 \
//!   --gzip-level 5 \
//!   --buffer-size 8192 \
//!   --access-log ./access.log
//! ```
//!
//! ### Variables de entorno
//! ```bash
//! HTTP_PORT=8080 HTTP_HOST=0.0.0.0 MAX_CONN=500 ./http_gate
//! ```

use crate::pipeline::gzip::{GzipOptions, DEFAULT_ALLOW_LIST};
use crate::server::PanicPolicy;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuración del servidor
#[derive(Debug, Clone, Parser)]
#[command(name = "http_gate")]
#[command(about = "Servidor HTTP/1.0 con control de admisión y pipeline de respuesta")]
#[command(version = "0.1.0")]
pub struct Config {
    /// Puerto en el que escucha el servidor
    #[arg(short, long, default_value = "8080", env = "HTTP_PORT")]
    pub port: u16,

    /// Host/IP en el que escucha
    #[arg(long, default_value = "127.0.0.1", env = "HTTP_HOST")]
    pub host: String,

    // === Admisión ===
    /// Máximo de requests en vuelo antes de pausar el accept
    #[arg(long = "max-conn", default_value = "1000", env = "MAX_CONN")]
    pub max_conn: i32,

    // === Gzip ===
    /// Nivel de compresión gzip (0-9)
    #[arg(long = "gzip-level", default_value = "6", env = "GZIP_LEVEL")]
    pub gzip_level: u32,

    /// Compresores pre-creados en el pool
    #[arg(long = "gzip-pool-init", default_value = "4", env = "GZIP_POOL_INIT")]
    pub gzip_pool_init: usize,

    /// Máximo de compresores ociosos retenidos
    #[arg(long = "gzip-pool-cap", default_value = "64", env = "GZIP_POOL_CAP")]
    pub gzip_pool_cap: usize,

    /// Desactiva el stage de compresión
    #[arg(long = "no-gzip", env = "NO_GZIP")]
    pub no_gzip: bool,

    // === Buffer ===
    /// Tamaño de cada buffer de respuesta en bytes
    #[arg(long = "buffer-size", default_value = "4096", env = "BUFFER_SIZE")]
    pub buffer_size: usize,

    /// Buffers pre-creados en el pool
    #[arg(long = "buffer-pool-init", default_value = "4", env = "BUFFER_POOL_INIT")]
    pub buffer_pool_init: usize,

    /// Máximo de buffers ociosos retenidos
    #[arg(long = "buffer-pool-cap", default_value = "64", env = "BUFFER_POOL_CAP")]
    pub buffer_pool_cap: usize,

    /// Desactiva el stage de buffer
    #[arg(long = "no-buffer", env = "NO_BUFFER")]
    pub no_buffer: bool,

    // === Logging ===
    /// Archivo de access log (Combined Log Format). Sin valor, no se registra.
    #[arg(long = "access-log", env = "ACCESS_LOG")]
    pub access_log: Option<PathBuf>,

    /// Nivel de log cuando RUST_LOG no está definido
    #[arg(long = "log-level", default_value = "info", env = "LOG_LEVEL")]
    pub log_level: String,

    // === Panics ===
    /// Atrapar panics de los handlers y responder 500
    #[arg(long = "panic-recover", default_value_t = true, action = ArgAction::Set, env = "PANIC_RECOVER")]
    pub panic_recover: bool,

    /// Registrar los panics atrapados
    #[arg(long = "panic-log", default_value_t = true, action = ArgAction::Set, env = "PANIC_LOG")]
    pub panic_log: bool,

    /// Incluir backtrace al registrar un panic
    #[arg(long = "panic-log-stack", default_value_t = true, action = ArgAction::Set, env = "PANIC_LOG_STACK")]
    pub panic_log_stack: bool,
}

impl Config {
    /// Crea una nueva configuración parseando argumentos CLI
    pub fn new() -> Self {
        Config::parse()
    }

    /// Obtiene la dirección completa para bind (host:port)
    ///
    /// # Ejemplo
    /// ```rust
    /// use http_gate::config::Config;
    ///
    /// let config = Config::default();
    /// assert_eq!(config.address(), "127.0.0.1:8080");
    /// ```
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn gzip_options(&self) -> GzipOptions {
        GzipOptions {
            level: self.gzip_level,
            pool_initial: self.gzip_pool_init,
            pool_capacity: self.gzip_pool_cap,
            allow_list: DEFAULT_ALLOW_LIST.to_string(),
        }
    }

    pub fn panic_policy(&self) -> PanicPolicy {
        PanicPolicy {
            recover: self.panic_recover,
            log: self.panic_log,
            log_stack: self.panic_log_stack,
        }
    }

    /// Valida la configuración
    ///
    /// Retorna errores si hay valores inválidos
    pub fn validate(&self) -> Result<(), String> {
        if self.max_conn < 1 {
            return Err("Max connections must be >= 1".to_string());
        }

        if self.gzip_level > 9 {
            return Err("Gzip level must be 0-9".to_string());
        }
        if self.gzip_pool_cap == 0 {
            return Err("Gzip pool capacity must be >= 1".to_string());
        }
        if self.gzip_pool_init > self.gzip_pool_cap {
            return Err("Gzip pool init must not exceed its capacity".to_string());
        }

        if self.buffer_size == 0 {
            return Err("Buffer size must be >= 1".to_string());
        }
        if self.buffer_pool_cap == 0 {
            return Err("Buffer pool capacity must be >= 1".to_string());
        }
        if self.buffer_pool_init > self.buffer_pool_cap {
            return Err("Buffer pool init must not exceed its capacity".to_string());
        }

        if !LOG_LEVELS.contains(&self.log_level.to_ascii_lowercase().as_str()) {
            return Err(format!("Log level must be one of {}", LOG_LEVELS.join(", ")));
        }

        Ok(())
    }

    /// Registra un resumen de la configuración
    pub fn print_summary(&self) {
        tracing::info!(address = %self.address(), max_conn = self.max_conn, "red y admisión");
        if self.no_gzip {
            tracing::info!("gzip: desactivado");
        } else {
            tracing::info!(
                level = self.gzip_level,
                pool_init = self.gzip_pool_init,
                pool_cap = self.gzip_pool_cap,
                "gzip"
            );
        }
        if self.no_buffer {
            tracing::info!("buffer: desactivado");
        } else {
            tracing::info!(
                size = self.buffer_size,
                pool_init = self.buffer_pool_init,
                pool_cap = self.buffer_pool_cap,
                "buffer"
            );
        }
        match &self.access_log {
            Some(path) => tracing::info!(path = %path.display(), "access log"),
            None => tracing::info!("access log: desactivado"),
        }
        tracing::info!(
            recover = self.panic_recover,
            log = self.panic_log,
            log_stack = self.panic_log_stack,
            "panics"
        );
    }
}

impl Default for Config {
    /// Configuración por defecto
    fn default() -> Self {
        Self {
            port: 8080,
            host: "127.0.0.1".to_string(),
            max_conn: 1000,
            gzip_level: 6,
            gzip_pool_init: 4,
            gzip_pool_cap: 64,
            no_gzip: false,
            buffer_size: 4096,
            buffer_pool_init: 4,
            buffer_pool_cap: 64,
            no_buffer: false,
            access_log: None,
            log_level: "info".to_string(),
            panic_recover: true,
            panic_log: true,
            panic_log_stack: true,
        }
    }
}
