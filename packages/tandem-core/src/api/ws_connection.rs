//! Tracking of event-stream WebSocket connections.
//!
//! - `WsConnectionManager`: registry of open connections with force-close
//! - `ConnectionGuard`: unregisters its connection on drop

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::utils::now_millis;

/// Manages all open event connections.
///
/// Each connection gets a child of a global token, so closing everything is a
/// single cancellation.
pub struct WsConnectionManager {
    /// connection id -> connected-at (Unix ms)
    connections: DashMap<String, u64>,
    next_id: AtomicU64,
    /// Replaced after `close_all` so new connections are still accepted.
    global_cancel: RwLock<CancellationToken>,
}

impl WsConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            next_id: AtomicU64::new(1),
            global_cancel: RwLock::new(CancellationToken::new()),
        }
    }

    /// Registers a connection; dropping the guard unregisters it.
    pub fn register(self: &Arc<Self>) -> ConnectionGuard {
        let conn_id = format!("ws-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel_token = self.global_cancel.read().child_token();

        self.connections.insert(conn_id.clone(), now_millis());
        log::info!(
            "[WS] Connection registered: {} (total: {})",
            conn_id,
            self.connections.len()
        );

        ConnectionGuard {
            id: conn_id,
            manager: Arc::clone(self),
            cancel_token,
        }
    }

    fn unregister(&self, id: &str) {
        if let Some((_, connected_at)) = self.connections.remove(id) {
            log::info!(
                "[WS] Connection closed: {} after {}ms (remaining: {})",
                id,
                now_millis().saturating_sub(connected_at),
                self.connections.len()
            );
        }
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Signals every open connection to close.
    ///
    /// Returns the number of connections signaled.
    pub fn close_all(&self) -> usize {
        let count = self.connections.len();
        if count > 0 {
            log::info!("[WS] Force-closing {} connection(s)", count);
            let mut guard = self.global_cancel.write();
            guard.cancel();
            *guard = CancellationToken::new();
        }
        count
    }
}

impl Default for WsConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Unregisters a connection when dropped, even if the handler exits early.
pub struct ConnectionGuard {
    id: String,
    manager: Arc<WsConnectionManager>,
    cancel_token: CancellationToken,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Cancelled when the manager force-closes connections.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel_token
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.manager.unregister(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_drop_unregisters() {
        let manager = Arc::new(WsConnectionManager::new());
        let first = manager.register();
        let second = manager.register();
        assert_ne!(first.id(), second.id());
        assert_eq!(manager.connection_count(), 2);

        drop(first);
        assert_eq!(manager.connection_count(), 1);
    }

    #[test]
    fn close_all_cancels_existing_but_not_later_connections() {
        let manager = Arc::new(WsConnectionManager::new());
        let open = manager.register();

        assert_eq!(manager.close_all(), 1);
        assert!(open.cancel_token().is_cancelled());

        let later = manager.register();
        assert!(!later.cancel_token().is_cancelled());
    }
}
