//! # Gate de Admisión
//! src/gate/mod.rs
//!
//! Control de concurrencia sobre el socket que escucha:
//!
//! - `listener`: el listener crudo que el gate envuelve
//! - `gate`: histéresis de admisión, pausa dura y cierre ordenado

#[allow(clippy::module_inception)]
pub mod gate;
pub mod listener;

pub use gate::{thresholds, Admission, ConnectionGate, GateStats};
pub use listener::{RawListener, TcpGateListener};
