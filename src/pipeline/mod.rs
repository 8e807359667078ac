//! # Pipeline de Stages
//! src/pipeline/mod.rs
//!
//! Cadena de responsabilidad de una sola pasada. Cada stage recibe la
//! respuesta actual, el request y el propio pipeline; puede envolver la
//! respuesta, trabajar antes y después, y decide si avanza llamando
//! `Pipeline::next`.
//!
//! ```text
//! admission → [access-log] → [gzip] → [buffer] → handler → flush
//!     │            │            │         │
//!     └── cada stage envuelve el writer que recibe y lo pasa al siguiente
//! ```
//!
//! Avanzar pasado el final es un no-op: el último stage puede llamar
//! `next` sin verificar nada.

pub mod access_log;
pub mod buffer;
pub mod gzip;

pub use access_log::{AccessLog, AccessLogStage};
pub use buffer::BufferStage;
pub use gzip::GzipStage;

use crate::http::Request;
use crate::sink::ResponseWriter;

/// Un eslabón del pipeline
pub trait Stage: Send + Sync {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request, next: &mut Pipeline<'_>);
}

impl<F> Stage for F
where
    F: Fn(&mut dyn ResponseWriter, &Request, &mut Pipeline<'_>) + Send + Sync,
{
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request, next: &mut Pipeline<'_>) {
        self(w, req, next)
    }
}

/// Fija la firma de un closure para que funcione como `Stage`
pub fn from_fn<F>(f: F) -> F
where
    F: Fn(&mut dyn ResponseWriter, &Request, &mut Pipeline<'_>) + Send + Sync,
{
    f
}

/// Secuencia de stages con cursor. Se crea por request y se descarta.
pub struct Pipeline<'a> {
    stages: Vec<&'a dyn Stage>,
    cursor: usize,
}

impl<'a> Pipeline<'a> {
    pub fn new(stages: Vec<&'a dyn Stage>) -> Self {
        Self { stages, cursor: 0 }
    }

    /// Invoca el siguiente stage. Sin stages restantes no hace nada.
    pub fn next(&mut self, w: &mut dyn ResponseWriter, req: &Request) {
        let Some(stage) = self.stages.get(self.cursor).copied() else {
            return;
        };
        self.cursor += 1;
        stage.serve(w, req, self);
    }

    /// Cantidad de stages ya invocados
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.stages.len()
    }
}

/// Avanza y luego hace flush de la respuesta
#[derive(Debug, Default, Clone, Copy)]
pub struct FlushStage;

impl Stage for FlushStage {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request, next: &mut Pipeline<'_>) {
        next.next(w, req);
        if let Err(e) = w.flush() {
            tracing::debug!(error = %e, path = req.path(), "flush falló");
        }
    }
}

/// Algo que escribe la respuesta de un request
pub trait Handler: Send + Sync {
    fn handle(&self, w: &mut dyn ResponseWriter, req: &Request);
}

/// Adapta un `Handler` a `Stage`: corre el handler y luego avanza
pub struct HandlerStage<H> {
    handler: H,
}

impl<H: Handler> HandlerStage<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }
}

impl<H: Handler> Stage for HandlerStage<H> {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request, next: &mut Pipeline<'_>) {
        self.handler.handle(w, req);
        next.next(w, req);
    }
}
