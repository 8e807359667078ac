//! # Access Log
//! src/pipeline/access_log.rs
//!
//! Registro de requests en formato Combined Log:
//!
//! ```text
//! 127.0.0.1 - - [2024-01-02T03:04:05+00:00] "GET /x HTTP/1.0" 200 512 "-" "curl/8.0"
//! ```
//!
//! Las líneas se acumulan en un `BufWriter` de 4 KiB. Un thread de fondo
//! hace flush cada segundo, así que un crash puede perder como mucho el
//! último segundo de líneas.

use super::{Pipeline, Stage};
use crate::http::{Request, StatusCode};
use chrono::{DateTime, Local, TimeZone};
use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const WRITE_BUFFER_SIZE: usize = 4096;
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Arma una línea en formato Combined Log (sin salto de línea)
pub fn format_line<Tz>(req: &Request, status: StatusCode, bytes: u64, time: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let remote = req
        .remote_addr()
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "-".to_string());

    format!(
        "{} - - [{}] \"{} {} {}\" {} {} \"{}\" \"{}\"",
        remote,
        time.to_rfc3339(),
        req.method().as_str(),
        req.target(),
        req.version(),
        status.as_u16(),
        bytes,
        req.header("Referer").unwrap_or("-"),
        req.header("User-Agent").unwrap_or("-"),
    )
}

struct LogFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

struct Shared {
    file: Mutex<LogFile>,
    stopped: Mutex<bool>,
    wake: Condvar,
}

impl Shared {
    fn file(&self) -> MutexGuard<'_, LogFile> {
        self.file.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush(&self) -> io::Result<()> {
        match self.file().writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

fn open_writer(path: &Path) -> io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    Ok(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file))
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "access log closed")
}

/// Archivo de access log con flush periódico en segundo plano
pub struct AccessLog {
    shared: Arc<Shared>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl AccessLog {
    /// Abre (o crea) el archivo en modo append y arranca el thread de flush
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = open_writer(&path)?;

        let shared = Arc::new(Shared {
            file: Mutex::new(LogFile {
                path,
                writer: Some(writer),
            }),
            stopped: Mutex::new(false),
            wake: Condvar::new(),
        });

        let flusher = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("access-log-flush".to_string())
                .spawn(move || flush_loop(shared))?
        };

        Ok(Self {
            shared,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    pub fn path(&self) -> PathBuf {
        self.shared.file().path.clone()
    }

    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut file = self.shared.file();
        let writer = file.writer.as_mut().ok_or_else(closed_error)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")
    }

    pub fn flush(&self) -> io::Result<()> {
        self.shared.flush()
    }

    /// Vuelve a abrir el mismo path (después de una rotación externa)
    pub fn reopen(&self) -> io::Result<()> {
        let path = self.path();
        self.reset(path)
    }

    /// Cambia el destino. Lo pendiente se escribe al archivo anterior.
    pub fn reset(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let path = path.as_ref().to_path_buf();
        let mut file = self.shared.file();
        if file.writer.is_none() {
            return Err(closed_error());
        }

        let writer = open_writer(&path)?;
        if let Some(mut old) = file.writer.replace(writer) {
            if let Err(e) = old.flush() {
                tracing::error!(error = %e, path = %file.path.display(), "flush del access log anterior falló");
            }
        }
        file.path = path;
        tracing::info!(path = %file.path.display(), "access log reabierto");
        Ok(())
    }

    /// Detiene el flush periódico y cierra el archivo. Idempotente.
    pub fn close(&self) -> io::Result<()> {
        {
            let mut stopped = self.shared.stopped.lock().unwrap_or_else(PoisonError::into_inner);
            *stopped = true;
            self.shared.wake.notify_all();
        }
        let handle = self.flusher.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(handle) = handle {
            join_flusher(handle);
        }

        match self.shared.file().writer.take() {
            Some(mut writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for AccessLog {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::error!(error = %e, "no se pudo cerrar el access log");
        }
    }
}

/// Espera al thread de flush. Retorna `false` si terminó con panic.
fn join_flusher(handle: JoinHandle<()>) -> bool {
    match handle.join() {
        Ok(()) => true,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .copied()
                .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
                .unwrap_or("<panic sin mensaje>");
            tracing::error!(panic = message, "el thread de flush del access log terminó con panic");
            false
        }
    }
}

fn flush_loop(shared: Arc<Shared>) {
    loop {
        {
            let stopped = shared.stopped.lock().unwrap_or_else(PoisonError::into_inner);
            let (stopped, _) = shared
                .wake
                .wait_timeout_while(stopped, FLUSH_INTERVAL, |stopped| !*stopped)
                .unwrap_or_else(PoisonError::into_inner);
            if *stopped {
                return;
            }
        }
        if let Err(e) = shared.flush() {
            tracing::error!(error = %e, "flush periódico del access log falló");
        }
    }
}

/// Avanza y luego registra el request
pub struct AccessLogStage {
    log: AccessLog,
}

impl AccessLogStage {
    pub fn new(log: AccessLog) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &AccessLog {
        &self.log
    }
}

impl Stage for AccessLogStage {
    fn serve(&self, w: &mut dyn crate::sink::ResponseWriter, req: &Request, next: &mut Pipeline<'_>) {
        next.next(w, req);

        let line = format_line(req, w.status(), w.bytes_written(), &Local::now());
        if let Err(e) = self.log.write_line(&line) {
            tracing::error!(error = %e, "no se pudo escribir el access log");
        }
    }
}
