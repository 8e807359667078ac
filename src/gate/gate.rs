//! # Gate de Conexiones
//! src/gate/gate.rs
//!
//! Control de admisión con histéresis sobre un listener:
//!
//! - `accept` bloquea (sin busy-polling) mientras el gate está en pausa
//! - `admit` / `run` cuentan los requests en vuelo y deciden si el request
//!   corre normalmente, corre "en pausa" o se rechaza porque el gate cerró
//! - `close` cierra el listener y espera a que no quede nada en vuelo
//!
//! ## Histéresis
//!
//! ```text
//! en vuelo >= hi  → pausa   (transición por CAS, una sola vez)
//! en vuelo <= lo  → reanuda (transición por CAS, una sola vez)
//! hi = máximo configurado (10 si no es positivo), lo = floor(0.95 * hi)
//! ```
//!
//! Con dos umbrales el gate no oscila cuando la carga ronda el máximo.
//! El contador y los flags son atómicos: el camino de admisión no toma
//! ningún lock, a cambio de que unos pocos requests puedan pasar el máximo.

use super::listener::RawListener;
use crate::error::GateError;
use serde::Serialize;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use tracing::Span;

const DEFAULT_MAX_NUM_CONN: i32 = 10;
const LOW_WATER_RATIO: f64 = 0.95;

/// Calcula (hi, lo) para un máximo configurado
pub fn thresholds(max_num_conn: i32) -> (i32, i32) {
    let hi = if max_num_conn <= 0 { DEFAULT_MAX_NUM_CONN } else { max_num_conn };
    let lo = (f64::from(hi) * LOW_WATER_RATIO).floor() as i32;
    (hi, lo)
}

/// Par Mutex/Condvar con semántica wait/notify-all.
/// El Mutex no protege datos: el estado real vive en atómicos.
#[derive(Default)]
struct Signal {
    lock: Mutex<()>,
    cond: Condvar,
}

impl Signal {
    fn notify_all(&self) {
        // Se toma el lock para no perder la señal entre el chequeo y el wait
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.cond.notify_all();
    }

    fn wait_while(&self, mut condition: impl FnMut() -> bool) {
        let guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        let _guard = self
            .cond
            .wait_while(guard, |_| condition())
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Snapshot del estado del gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GateStats {
    pub inflight: i32,
    pub max_num_conn_hi: i32,
    pub max_num_conn_lo: i32,
    pub paused: bool,
    pub hard_paused: bool,
    pub closed: bool,
}

/// Gate de admisión sobre un listener
pub struct ConnectionGate<L: RawListener> {
    listener: L,
    closed: AtomicBool,
    paused: AtomicBool,
    hard_paused: AtomicBool,
    max_num_conn_hi: AtomicI32,
    max_num_conn_lo: AtomicI32,
    inflight: AtomicI32,
    /// Se señala al salir de pausa (blanda o dura) y al cerrar
    unpaused: Signal,
    /// Se señala cuando el contador en vuelo llega a cero
    drained: Signal,
    /// Capacidad de logging inyectada: todos los eventos cuelgan de este span
    span: Span,
}

impl<L: RawListener> ConnectionGate<L> {
    pub fn new(listener: L, max_num_conn: i32) -> Self {
        let (hi, lo) = thresholds(max_num_conn);
        let addr = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "-".to_string());

        Self {
            listener,
            closed: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            hard_paused: AtomicBool::new(false),
            max_num_conn_hi: AtomicI32::new(hi),
            max_num_conn_lo: AtomicI32::new(lo),
            inflight: AtomicI32::new(0),
            unpaused: Signal::default(),
            drained: Signal::default(),
            span: tracing::info_span!("gate", addr = %addr),
        }
    }

    /// Reemplaza el span bajo el que el gate emite sus eventos
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Acepta la siguiente conexión.
    ///
    /// Bloquea mientras haya pausa dura o blanda. Retorna `GateError::Closed`
    /// si el gate ya empezó a cerrar (también si cierra mientras esperamos).
    pub fn accept(&self) -> Result<L::Conn, GateError> {
        if self.is_closed() {
            return Err(GateError::Closed);
        }

        self.unpaused
            .wait_while(|| !self.is_closed() && (self.is_hard_paused() || self.is_paused()));

        if self.is_closed() {
            return Err(GateError::Closed);
        }

        match self.listener.accept() {
            Ok(conn) => Ok(conn),
            Err(_) if self.is_closed() => Err(GateError::Closed),
            Err(e) => Err(GateError::Io(e)),
        }
    }

    /// Toma un lugar en vuelo para un request.
    ///
    /// El lugar se libera cuando la `Admission` se suelta, incluso durante
    /// un panic. El request que cruza el máximo activa la pausa pero no se
    /// reporta como pausado; los que llegan durante la pausa sí.
    pub fn admit(&self) -> Result<Admission<'_, L>, GateError> {
        if self.is_closed() {
            return Err(GateError::Closed);
        }

        let n = self.inflight.fetch_add(1, Ordering::SeqCst) + 1;
        let mut admission = Admission { gate: self, paused: false };

        // close() pudo empezar entre el primer chequeo y el incremento:
        // el drop de `admission` devuelve el lugar
        if self.is_closed() {
            return Err(GateError::Closed);
        }

        if self.is_hard_paused() || self.is_paused() {
            admission.paused = true;
        } else {
            let hi = self.max_num_conn_hi.load(Ordering::SeqCst);
            if n >= hi
                && self
                    .paused
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                tracing::warn!(parent: &self.span, threshold = hi, inflight = n,
                    "PAUSA: se alcanzó el máximo de conexiones");
            }
        }

        Ok(admission)
    }

    /// Decisión de admisión por request.
    ///
    /// - Cerrado: llama `on_closed` y no corre el request
    /// - En pausa: llama `on_paused` (informativo) y luego `on_run`
    /// - Si no: llama `on_run`
    ///
    /// El contador en vuelo se decrementa siempre, aunque `on_run` haga panic.
    pub fn run<C, P, R>(&self, on_closed: C, on_paused: P, on_run: R)
    where
        C: FnOnce(),
        P: FnOnce(),
        R: FnOnce(),
    {
        self.run_with(&mut (), |_| on_closed(), |_| on_paused(), |_| on_run());
    }

    /// Como `run`, pasando el mismo estado mutable a cada callback
    pub fn run_with<S, C, P, R>(&self, state: &mut S, on_closed: C, on_paused: P, on_run: R)
    where
        S: ?Sized,
        C: FnOnce(&mut S),
        P: FnOnce(&mut S),
        R: FnOnce(&mut S),
    {
        let admission = match self.admit() {
            Ok(admission) => admission,
            Err(_) => return on_closed(state),
        };
        if admission.was_paused() {
            on_paused(state);
        }

        // Sin timeout: los handlers son responsables de terminar a tiempo
        on_run(state);
        drop(admission);
    }

    fn release_slot(&self) {
        let n = self.inflight.fetch_sub(1, Ordering::SeqCst) - 1;
        let lo = self.max_num_conn_lo.load(Ordering::SeqCst);

        // lo puede ser 0 (hi = 1): solo se reanuda con cero en vuelo
        if n <= lo {
            if self
                .paused
                .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                tracing::warn!(parent: &self.span, threshold = lo, inflight = n,
                    "REANUDA: por debajo del umbral de conexiones");
                self.unpaused.notify_all();
            }
            if n == 0 {
                self.drained.notify_all();
            }
        }
    }

    /// Pausa administrativa, independiente de la carga
    pub fn hard_pause(&self) {
        if self.is_closed() {
            return;
        }
        if self
            .hard_paused
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::warn!(parent: &self.span, "PAUSA DURA activada");
        }
    }

    pub fn resume_from_hard_pause(&self) {
        if self.is_closed() {
            return;
        }
        if self
            .hard_paused
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            tracing::warn!(parent: &self.span, "PAUSA DURA desactivada");
            self.unpaused.notify_all();
        }
    }

    /// Cierre ordenado e idempotente.
    ///
    /// La primera llamada cierra el listener (desbloqueando `accept`) y
    /// espera a que el contador en vuelo llegue a cero. Las siguientes no
    /// hacen nada.
    pub fn close(&self) -> Result<(), GateError> {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(());
        }

        tracing::info!(parent: &self.span, inflight = self.inflight(), "cerrando gate");
        let result = self.listener.close();
        self.unpaused.notify_all();

        self.drained.wait_while(|| self.inflight() > 0);
        tracing::info!(parent: &self.span, "gate cerrado, sin requests en vuelo");

        result.map_err(GateError::from)
    }

    /// Barrera de drenado que no cierra el gate
    pub fn wait_zero_inflight(&self) {
        self.drained.wait_while(|| self.inflight() != 0);
    }

    /// Cambia el máximo de conexiones. Solo actualiza los umbrales.
    pub fn reset_max_num_conn(&self, max_num_conn: i32) {
        let (hi, lo) = thresholds(max_num_conn);
        self.max_num_conn_hi.store(hi, Ordering::SeqCst);
        self.max_num_conn_lo.store(lo, Ordering::SeqCst);
        tracing::info!(parent: &self.span, hi, lo, "nuevo máximo de conexiones");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn is_hard_paused(&self) -> bool {
        self.hard_paused.load(Ordering::SeqCst)
    }

    pub fn inflight(&self) -> i32 {
        self.inflight.load(Ordering::SeqCst)
    }

    /// Umbrales actuales (hi, lo)
    pub fn thresholds(&self) -> (i32, i32) {
        (
            self.max_num_conn_hi.load(Ordering::SeqCst),
            self.max_num_conn_lo.load(Ordering::SeqCst),
        )
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stats(&self) -> GateStats {
        let (hi, lo) = self.thresholds();
        GateStats {
            inflight: self.inflight(),
            max_num_conn_hi: hi,
            max_num_conn_lo: lo,
            paused: self.is_paused(),
            hard_paused: self.is_hard_paused(),
            closed: self.is_closed(),
        }
    }
}

/// Lugar en vuelo de un request admitido
pub struct Admission<'g, L: RawListener> {
    gate: &'g ConnectionGate<L>,
    paused: bool,
}

impl<L: RawListener> Admission<'_, L> {
    /// `true` si el request entró mientras el gate estaba en pausa
    pub fn was_paused(&self) -> bool {
        self.paused
    }
}

impl<L: RawListener> Drop for Admission<'_, L> {
    fn drop(&mut self) {
        self.gate.release_slot();
    }
}
