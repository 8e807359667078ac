//! # Stage de Buffer
//! src/pipeline/buffer.rs
//!
//! Junta las escrituras del body en un buffer de tamaño fijo tomado de un
//! pool. Mientras el body quepa en el buffer, la respuesta no se compromete
//! y los headers siguen siendo modificables. Al terminar el stage, el
//! contenido pendiente se escribe al sink y el buffer vuelve al pool.

use super::{Pipeline, Stage};
use crate::error::SinkError;
use crate::http::{Headers, Request, StatusCode};
use crate::pool::{Lifecycle, Pool, Pooled};
use crate::sink::{ResponseWriter, Transport};
use std::io::{self, Write};
use std::sync::mpsc::Receiver;

pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Buffers de `size` bytes de capacidad
pub struct BufferLifecycle {
    size: usize,
}

impl Lifecycle<Vec<u8>> for BufferLifecycle {
    fn create(&self) -> Vec<u8> {
        Vec::with_capacity(self.size)
    }

    fn reset(&self, buf: &mut Vec<u8>) {
        buf.clear();
    }
}

pub struct BufferStage {
    pool: Pool<Vec<u8>, BufferLifecycle>,
    size: usize,
}

impl BufferStage {
    pub fn new(size: usize, pool_initial: usize, pool_capacity: usize) -> Self {
        let size = size.max(1);
        Self {
            pool: Pool::new(BufferLifecycle { size }, pool_initial, pool_capacity),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn pool(&self) -> &Pool<Vec<u8>, BufferLifecycle> {
        &self.pool
    }
}

impl Default for BufferStage {
    fn default() -> Self {
        Self::new(DEFAULT_BUFFER_SIZE, 4, 64)
    }
}

impl Stage for BufferStage {
    fn serve(&self, w: &mut dyn ResponseWriter, req: &Request, next: &mut Pipeline<'_>) {
        let mut bw = BufferedResponse {
            inner: w,
            buf: self.pool.get(),
            size: self.size,
        };
        next.next(&mut bw, req);

        if let Err(e) = bw.flush_buffer() {
            tracing::error!(error = %e, path = req.path(), "no se pudo vaciar el buffer");
        }
    }
}

struct BufferedResponse<'w, 'p> {
    inner: &'w mut dyn ResponseWriter,
    buf: Pooled<'p, Vec<u8>, BufferLifecycle>,
    size: usize,
}

impl BufferedResponse<'_, '_> {
    fn flush_buffer(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.inner.write_all(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }
}

impl Write for BufferedResponse<'_, '_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.buf.len() + data.len() > self.size {
            self.flush_buffer()?;
        }
        if data.len() >= self.size {
            self.inner.write(data)
        } else {
            self.buf.extend_from_slice(data);
            Ok(data.len())
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()?;
        self.inner.flush()
    }
}

impl ResponseWriter for BufferedResponse<'_, '_> {
    fn headers(&self) -> &Headers {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut Headers {
        self.inner.headers_mut()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.inner.set_status(status);
    }

    fn status(&self) -> StatusCode {
        self.inner.status()
    }

    fn is_committed(&self) -> bool {
        self.inner.is_committed()
    }

    fn bytes_written(&self) -> u64 {
        self.inner.bytes_written()
    }

    fn hijack(&mut self) -> Result<Box<dyn Transport>, SinkError> {
        self.flush_buffer()?;
        self.inner.hijack()
    }

    fn close_notify(&mut self) -> Option<Receiver<()>> {
        self.inner.close_notify()
    }
}
