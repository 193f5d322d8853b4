//! Application services layer.
//!
//! This module contains the authority-side services that sit between the API
//! layer and the playback session state machine.

pub mod liveness_monitor;
pub mod session_registry;

pub use liveness_monitor::LivenessMonitor;
pub use session_registry::{SessionRegistry, SweepReport};
