//! # Servidor TCP Concurrente
//! src/server/tcp.rs
//!
//! Servidor HTTP/1.0 sobre el gate de admisión. Las conexiones se aceptan a
//! través del `ConnectionGate` (que bloquea el accept mientras está en
//! pausa) y cada una se atiende en su propio thread: un request por
//! conexión.
//!
//! ```text
//! gate.accept() → thread::spawn → leer request → dispatcher.serve → cerrar
//! ```

use super::dispatcher::Dispatcher;
use crate::config::Config;
use crate::error::GateError;
use crate::gate::{ConnectionGate, TcpGateListener};
use crate::http::request::find_header_end;
use crate::http::{Method, Request, Response, StatusCode};
use crate::pipeline::{AccessLog, AccessLogStage, BufferStage, GzipStage, HandlerStage, Stage};
use crate::router::Router;
use crate::sink::{StreamResponse, TrackedResponse};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread;

/// Tamaño máximo aceptado para un request completo
const MAX_REQUEST_SIZE: usize = 1024 * 1024;
const READ_CHUNK: usize = 8192;

type Gate = ConnectionGate<TcpGateListener>;

/// Servidor HTTP/1.0 con control de admisión
pub struct Server {
    config: Config,
    gate: Arc<Gate>,
    dispatcher: Arc<Dispatcher<TcpGateListener>>,
}

impl Server {
    /// Hace bind y arma el pipeline con las rutas por defecto
    pub fn bind(config: Config) -> io::Result<Self> {
        Self::bind_with_router(config, Router::new())
    }

    /// Como `bind`, agregando las rutas por defecto al router dado
    pub fn bind_with_router(config: Config, mut router: Router) -> io::Result<Self> {
        let listener = TcpGateListener::bind(config.address())?;
        let gate = Arc::new(ConnectionGate::new(listener, config.max_conn));

        register_builtin_routes(&mut router, &gate);
        let stages = build_stages(&config, router)?;
        let dispatcher = Dispatcher::new(Arc::clone(&gate), stages).with_panic_policy(config.panic_policy());

        Ok(Self {
            config,
            gate,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Gate del servidor, para pausa dura y cierre desde otro thread
    pub fn gate(&self) -> &Arc<Gate> {
        &self.gate
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.gate.local_addr()
    }

    /// Loop de accept. Retorna cuando el gate se cierra.
    pub fn run(&self) -> io::Result<()> {
        tracing::info!(address = %self.local_addr()?, "servidor escuchando, un thread por conexión");

        loop {
            match self.gate.accept() {
                Ok((stream, peer)) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    tracing::debug!(%peer, "nueva conexión");

                    thread::spawn(move || {
                        if let Err(e) = handle_connection(stream, peer, &dispatcher) {
                            tracing::debug!(%peer, error = %e, "error en la conexión");
                        }
                    });
                }
                Err(GateError::Closed) => {
                    tracing::info!("gate cerrado, fin del accept loop");
                    return Ok(());
                }
                Err(GateError::Io(e)) => {
                    tracing::error!(error = %e, "error al aceptar conexión");
                }
            }
        }
    }

    /// Cierre ordenado: deja de aceptar y espera los requests en vuelo
    pub fn shutdown(&self) -> Result<(), GateError> {
        self.gate.close()
    }
}

fn register_builtin_routes(router: &mut Router, gate: &Arc<Gate>) {
    router.register("/", |_req| {
        let body = serde_json::json!({
            "service": "http_gate",
            "version": env!("CARGO_PKG_VERSION"),
        });
        Response::json(&body.to_string())
    });

    let gate = Arc::clone(gate);
    router.register("/stats", move |_req| match serde_json::to_string(&gate.stats()) {
        Ok(body) => Response::json(&body),
        Err(e) => Response::error(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    });
}

/// `[access-log?, gzip?, buffer?, router]`
fn build_stages(config: &Config, router: Router) -> io::Result<Vec<Box<dyn Stage>>> {
    let mut stages: Vec<Box<dyn Stage>> = Vec::new();

    if let Some(path) = &config.access_log {
        stages.push(Box::new(AccessLogStage::new(AccessLog::open(path)?)));
    }
    if !config.no_gzip {
        let gzip = GzipStage::new(config.gzip_options())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        stages.push(Box::new(gzip));
    }
    if !config.no_buffer {
        stages.push(Box::new(BufferStage::new(
            config.buffer_size,
            config.buffer_pool_init,
            config.buffer_pool_cap,
        )));
    }
    stages.push(Box::new(HandlerStage::new(router)));

    Ok(stages)
}

/// Lee headers y, si hay `Content-Length`, el body completo
fn read_request(stream: &mut TcpStream) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::with_capacity(READ_CHUNK);
    let mut chunk = [0u8; READ_CHUNK];

    let header_end = loop {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            // El peer cerró: se parsea lo que haya llegado
            return Ok(buffer);
        }
        buffer.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_header_end(&buffer) {
            break end;
        }
        if buffer.len() > MAX_REQUEST_SIZE {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "request demasiado grande"));
        }
    };

    let body_start = header_end + 4;
    let content_length = content_length(&buffer[..header_end]);
    if body_start + content_length > MAX_REQUEST_SIZE {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "request demasiado grande"));
    }

    while buffer.len() < body_start + content_length {
        let n = stream.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
    }
    Ok(buffer)
}

fn content_length(head: &[u8]) -> usize {
    String::from_utf8_lossy(head)
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    dispatcher: &Dispatcher<TcpGateListener>,
) -> io::Result<()> {
    let buffer = read_request(&mut stream)?;
    if buffer.is_empty() {
        return Ok(());
    }

    match Request::parse(&buffer) {
        Ok(request) => {
            let request = request.with_remote_addr(peer);
            let mut raw = StreamResponse::new(stream).discard_body(request.method() == Method::HEAD);
            dispatcher.serve(&mut raw, &request);
        }
        Err(e) => {
            tracing::debug!(%peer, error = %e, "request inválido");
            let mut raw = StreamResponse::new(stream);
            let mut w = TrackedResponse::new(&mut raw);
            Response::error(StatusCode::BAD_REQUEST, &format!("Invalid: {}", e)).write_to(&mut w)?;
            w.flush()?;
        }
    }
    Ok(())
}
