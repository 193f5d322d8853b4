//! Event emitter abstraction for decoupling services from transport.
//!
//! Services depend on the [`EventEmitter`] trait rather than concrete broadcast
//! channels, enabling testing and alternative transport implementations.

use super::{SessionEvent, SyncEvent};

/// Trait for emitting domain events without knowledge of transport.
///
/// The session registry and the sync client use this trait to emit events,
/// decoupling them from how events reach clients (WebSocket, UI frontend, logs).
///
/// # Example
///
/// ```ignore
/// struct MyService {
///     emitter: Arc<dyn EventEmitter>,
/// }
///
/// impl MyService {
///     fn do_something(&self) {
///         self.emitter.emit_session(SessionEvent::Created { ... });
///     }
/// }
/// ```
pub trait EventEmitter: Send + Sync {
    /// Emits a session authority event.
    fn emit_session(&self, event: SessionEvent);

    /// Emits a sync client event.
    fn emit_sync(&self, event: SyncEvent);
}

/// No-op emitter for headless use or testing.
///
/// Events are silently discarded.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_session(&self, _event: SessionEvent) {}

    fn emit_sync(&self, _event: SyncEvent) {}
}

/// Logging emitter for debugging and development.
///
/// Logs all events at debug level.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }

    fn emit_sync(&self, event: SyncEvent) {
        tracing::debug!(?event, "sync_event");
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Recording emitter shared by service tests.

    use parking_lot::Mutex;

    use super::*;

    /// Test emitter that records every event.
    #[derive(Default)]
    pub struct RecordingEventEmitter {
        pub session: Mutex<Vec<SessionEvent>>,
        pub sync: Mutex<Vec<SyncEvent>>,
    }

    impl RecordingEventEmitter {
        /// Returns the `type` tags of recorded session events, in order.
        pub fn session_types(&self) -> Vec<String> {
            self.session
                .lock()
                .iter()
                .filter_map(|e| serde_json::to_value(e).ok())
                .filter_map(|v| v["type"].as_str().map(str::to_string))
                .collect()
        }

        /// Returns the `type` tags of recorded sync events, in order.
        pub fn sync_types(&self) -> Vec<String> {
            self.sync
                .lock()
                .iter()
                .filter_map(|e| serde_json::to_value(e).ok())
                .filter_map(|v| v["type"].as_str().map(str::to_string))
                .collect()
        }
    }

    impl EventEmitter for RecordingEventEmitter {
        fn emit_session(&self, event: SessionEvent) {
            self.session.lock().push(event);
        }

        fn emit_sync(&self, event: SyncEvent) {
            self.sync.lock().push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingEventEmitter;
    use super::*;
    use std::sync::Arc;

    #[test]
    fn recording_emitter_tracks_events() {
        let emitter = Arc::new(RecordingEventEmitter::default());

        emitter.emit_session(SessionEvent::Created {
            group_id: "grp:1".to_string(),
            host_member_id: "m1".to_string(),
            timestamp: 0,
        });
        emitter.emit_session(SessionEvent::MemberLeft {
            group_id: "grp:1".to_string(),
            member_id: "m1".to_string(),
            timestamp: 0,
        });
        emitter.emit_sync(SyncEvent::DiscoveryUpdated {
            session_count: 3,
            timestamp: 0,
        });

        assert_eq!(emitter.session_types(), vec!["created", "memberLeft"]);
        assert_eq!(emitter.sync_types(), vec!["discoveryUpdated"]);
    }
}
