//! # Dispatcher
//! src/server/dispatcher.rs
//!
//! Punto de entrada de cada request. Envuelve el sink crudo una sola vez en
//! un `TrackedResponse` y corre el pipeline:
//!
//! ```text
//! [admission] + stages de la aplicación + [flush]
//! ```
//!
//! Después del pipeline siempre hay un flush final, así que toda respuesta
//! queda comprometida aunque ningún stage haya escrito.

use crate::gate::{ConnectionGate, RawListener};
use crate::http::headers::CONNECTION;
use crate::http::{Request, StatusCode};
use crate::pipeline::{FlushStage, Pipeline, Stage};
use crate::sink::{RawResponse, ResponseWriter, TrackedResponse};
use std::any::Any;
use std::backtrace::Backtrace;
use std::io::Write;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Qué hacer con un panic dentro del pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanicPolicy {
    /// Atrapar el panic en el dispatcher (si no, sigue hacia el thread)
    pub recover: bool,
    /// Registrar el mensaje del panic
    pub log: bool,
    /// Registrar además un backtrace
    pub log_stack: bool,
}

impl Default for PanicPolicy {
    fn default() -> Self {
        Self {
            recover: true,
            log: true,
            log_stack: true,
        }
    }
}

/// Primer stage: decisión de admisión del gate
///
/// - Gate cerrado: `Connection: close` + 503, sin avanzar
/// - Gate en pausa: `Connection: close`, y avanza igual
pub struct AdmissionStage<L: RawListener> {
    gate: Arc<ConnectionGate<L>>,
    seq: AtomicU64,
}

impl<L: RawListener> AdmissionStage<L> {
    pub fn new(gate: Arc<ConnectionGate<L>>) -> Self {
        Self {
            gate,
            seq: AtomicU64::new(0),
        }
    }

    /// Requests vistos hasta ahora
    pub fn seq(&self) -> u64 {
        self.seq.load(Ordering::Relaxed)
    }
}

impl<L: RawListener> Stage for AdmissionStage<L> {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request, next: &mut Pipeline<'_>) {
        // Solo para correlacionar líneas de log
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;

        let mut state = (w, next);
        self.gate.run_with(
            &mut state,
            |(w, _)| {
                w.headers_mut().set(CONNECTION, "close");
                w.set_status(StatusCode::SERVICE_UNAVAILABLE);
                tracing::debug!(seq, path = req.path(), "gate cerrado, 503");
            },
            |(w, _)| w.headers_mut().set(CONNECTION, "close"),
            |(w, next)| {
                let start = Instant::now();
                tracing::debug!(seq, host = req.host(), path = req.path(), "request");

                next.next(&mut **w, req);

                tracing::debug!(
                    seq,
                    bytes = w.bytes_written(),
                    status = w.status().as_u16(),
                    elapsed = ?start.elapsed(),
                    "request terminado"
                );
            },
        );
    }
}

/// Arma y corre el pipeline de cada request
pub struct Dispatcher<L: RawListener> {
    admission: AdmissionStage<L>,
    stages: Vec<Box<dyn Stage>>,
    flush: FlushStage,
    panic_policy: PanicPolicy,
}

impl<L: RawListener> Dispatcher<L> {
    pub fn new(gate: Arc<ConnectionGate<L>>, stages: Vec<Box<dyn Stage>>) -> Self {
        Self {
            admission: AdmissionStage::new(gate),
            stages,
            flush: FlushStage,
            panic_policy: PanicPolicy::default(),
        }
    }

    pub fn with_panic_policy(mut self, policy: PanicPolicy) -> Self {
        self.panic_policy = policy;
        self
    }

    pub fn gate(&self) -> &Arc<ConnectionGate<L>> {
        &self.admission.gate
    }

    pub fn requests_seen(&self) -> u64 {
        self.admission.seq()
    }

    /// Atiende un request sobre su sink crudo
    pub fn serve(&self, raw: &mut dyn RawResponse, req: &Request) {
        let mut w = TrackedResponse::new(raw);

        let mut chain: Vec<&dyn Stage> = Vec::with_capacity(self.stages.len() + 2);
        chain.push(&self.admission);
        for stage in &self.stages {
            chain.push(stage.as_ref());
        }
        chain.push(&self.flush);
        let mut pipeline = Pipeline::new(chain);

        if self.panic_policy.recover {
            let result = panic::catch_unwind(AssertUnwindSafe(|| pipeline.next(&mut w, req)));
            if let Err(payload) = result {
                self.report_panic(payload.as_ref(), req);
                if !w.is_committed() {
                    w.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
        } else {
            pipeline.next(&mut w, req);
        }

        if let Err(e) = w.flush() {
            tracing::debug!(error = %e, path = req.path(), "flush final falló");
        }
    }

    fn report_panic(&self, payload: &(dyn Any + Send), req: &Request) {
        if !self.panic_policy.log {
            return;
        }
        let message = panic_message(payload);
        if self.panic_policy.log_stack {
            let backtrace = Backtrace::force_capture();
            tracing::error!(panic = message, path = req.path(), %backtrace, "panic atrapado en el pipeline");
        } else {
            tracing::error!(panic = message, path = req.path(), "panic atrapado en el pipeline");
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<panic sin mensaje>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::gate::tests::ChannelListener;
    use crate::pipeline::from_fn;
    use crate::sink::tracked::tests::MemoryResponse;
    use std::sync::{mpsc, Mutex};
    use std::thread;

    fn request() -> Request {
        Request::parse(b"GET /hola HTTP/1.0\r\nHost: localhost\r\n\r\n").unwrap()
    }

    fn gate(max: i32) -> Arc<ConnectionGate<ChannelListener>> {
        Arc::new(ConnectionGate::new(ChannelListener::new(), max))
    }

    fn hello() -> Box<dyn Stage> {
        Box::new(from_fn(|w, req, next| {
            w.write_all(b"hola").unwrap();
            next.next(w, req);
        }))
    }

    #[test]
    fn test_serve_runs_application_stages() {
        let dispatcher = Dispatcher::new(gate(5), vec![hello()]);
        let mut raw = MemoryResponse::default();
        dispatcher.serve(&mut raw, &request());

        assert_eq!(raw.committed, vec![StatusCode::OK]);
        assert_eq!(raw.body, b"hola");
        assert_eq!(raw.headers.get("Connection"), None);
        assert_eq!(dispatcher.requests_seen(), 1);
        assert_eq!(dispatcher.gate().inflight(), 0);
    }

    #[test]
    fn test_final_flush_commits_empty_response() {
        let dispatcher = Dispatcher::new(gate(5), Vec::new());
        let mut raw = MemoryResponse::default();
        dispatcher.serve(&mut raw, &request());
        assert_eq!(raw.committed, vec![StatusCode::OK]);
        assert!(raw.flushes >= 1);
    }

    #[test]
    fn test_closed_gate_responds_503() {
        let gate = gate(5);
        gate.close().unwrap();
        let dispatcher = Dispatcher::new(Arc::clone(&gate), vec![hello()]);

        let mut raw = MemoryResponse::default();
        dispatcher.serve(&mut raw, &request());

        assert_eq!(raw.committed, vec![StatusCode::SERVICE_UNAVAILABLE]);
        assert_eq!(raw.headers.get("Connection"), Some("close"));
        assert!(raw.body.is_empty());
    }

    #[test]
    fn test_paused_gate_sets_connection_close_and_runs() {
        let gate = gate(1);
        let _held = gate.admit().unwrap();
        assert!(gate.is_paused());

        let dispatcher = Dispatcher::new(Arc::clone(&gate), vec![hello()]);
        let mut raw = MemoryResponse::default();
        dispatcher.serve(&mut raw, &request());

        assert_eq!(raw.headers.get("Connection"), Some("close"));
        assert_eq!(raw.body, b"hola");
    }

    #[test]
    fn test_third_request_sees_pause_with_max_two() {
        let gate = gate(2);
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let started_tx = Mutex::new(started_tx);
        let release_rx = Mutex::new(release_rx);

        let blocking: Box<dyn Stage> = Box::new(from_fn(move |w, req, _next| {
            if req.path() == "/lento" {
                started_tx.lock().unwrap().send(()).unwrap();
                release_rx.lock().unwrap().recv().unwrap();
            }
            w.write_all(b"ok").unwrap();
        }));
        let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&gate), vec![blocking]));

        let slow: Vec<_> = (0..2)
            .map(|_| {
                let dispatcher = Arc::clone(&dispatcher);
                thread::spawn(move || {
                    let mut raw = MemoryResponse::default();
                    let req = Request::parse(b"GET /lento HTTP/1.0\r\n\r\n").unwrap();
                    dispatcher.serve(&mut raw, &req);
                    raw.headers.get("Connection").map(str::to_string)
                })
            })
            .collect();
        started_rx.recv().unwrap();
        started_rx.recv().unwrap();

        let mut raw = MemoryResponse::default();
        dispatcher.serve(&mut raw, &request());
        assert_eq!(raw.headers.get("Connection"), Some("close"));
        assert_eq!(raw.body, b"ok");

        release_tx.send(()).unwrap();
        release_tx.send(()).unwrap();
        for handle in slow {
            assert_eq!(handle.join().unwrap(), None);
        }
        assert!(!gate.is_paused());
        assert_eq!(gate.inflight(), 0);
    }

    #[test]
    fn test_panic_is_recovered_with_500() {
        let gate = gate(5);
        let boom: Box<dyn Stage> = Box::new(from_fn(|_w, _req, _next| panic!("handler roto")));
        let dispatcher = Dispatcher::new(Arc::clone(&gate), vec![boom]);

        let mut raw = MemoryResponse::default();
        dispatcher.serve(&mut raw, &request());

        assert_eq!(raw.committed, vec![StatusCode::INTERNAL_SERVER_ERROR]);
        assert_eq!(gate.inflight(), 0);
    }

    #[test]
    fn test_panic_after_commit_keeps_status() {
        let boom: Box<dyn Stage> = Box::new(from_fn(|w, _req, _next| {
            w.write_all(b"parcial").unwrap();
            panic!("a mitad de camino");
        }));
        let dispatcher = Dispatcher::new(gate(5), vec![boom]).with_panic_policy(PanicPolicy {
            recover: true,
            log: true,
            log_stack: false,
        });

        let mut raw = MemoryResponse::default();
        dispatcher.serve(&mut raw, &request());
        assert_eq!(raw.committed, vec![StatusCode::OK]);
        assert_eq!(raw.body, b"parcial");
    }

    #[test]
    fn test_panic_propagates_without_recover() {
        let gate = gate(5);
        let boom: Box<dyn Stage> = Box::new(from_fn(|_w, _req, _next| panic!("sin red")));
        let dispatcher = Dispatcher::new(Arc::clone(&gate), vec![boom]).with_panic_policy(PanicPolicy {
            recover: false,
            log: false,
            log_stack: false,
        });

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut raw = MemoryResponse::default();
            dispatcher.serve(&mut raw, &request());
        }));
        assert!(result.is_err());
        assert_eq!(gate.inflight(), 0, "el lugar se libera durante el unwind");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("texto");
        assert_eq!(panic_message(payload.as_ref()), "texto");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "<panic sin mensaje>");
    }
}
