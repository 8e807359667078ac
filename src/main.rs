//! # http_gate - Entry Point
//! src/main.rs
//!
//! Parsea la configuración (CLI + entorno), instala el logging y corre el
//! accept loop hasta que el gate se cierra.

use http_gate::config::Config;
use http_gate::logging;
use http_gate::server::Server;

fn main() {
    let config = Config::new();

    if let Err(e) = config.validate() {
        eprintln!("Configuración inválida: {}", e);
        std::process::exit(2);
    }
    if let Err(e) = logging::init(&config.log_level) {
        eprintln!("No se pudo inicializar el logging: {}", e);
    }

    tracing::info!("http_gate v{} iniciando", env!("CARGO_PKG_VERSION"));
    config.print_summary();

    let server = match Server::bind(config) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!(error = %e, "no se pudo iniciar el servidor");
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!(error = %e, "error fatal");
        std::process::exit(1);
    }
}
