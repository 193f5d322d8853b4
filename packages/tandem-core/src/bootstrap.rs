//! Application bootstrap and dependency wiring.
//!
//! This module contains the composition root - the single place where the
//! session authority's services are instantiated and wired together.

use std::sync::Arc;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;

use crate::api::{AppState, WsConnectionManager};
use crate::error::{TandemError, TandemResult};
use crate::events::{BroadcastEventBridge, EventEmitter};
use crate::runtime::TokioSpawner;
use crate::services::{LivenessMonitor, SessionRegistry};
use crate::state::Config;

/// Container for all bootstrapped services.
#[derive(Clone)]
pub struct BootstrappedServices {
    /// Authoritative session state.
    pub registry: Arc<SessionRegistry>,
    /// Event bridge for emitting events to WebSocket and optional external consumers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Background eviction and teardown.
    pub liveness_monitor: Arc<LivenessMonitor>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Shared, validated configuration.
    pub config: Arc<RwLock<Config>>,
    /// Task spawner for background operations.
    pub spawner: TokioSpawner,
    /// Cancellation token for graceful shutdown.
    pub cancel_token: CancellationToken,
}

impl BootstrappedServices {
    /// Builds the API state over these services.
    pub fn app_state(&self) -> AppState {
        AppState::builder()
            .registry(Arc::clone(&self.registry))
            .event_bridge(Arc::clone(&self.event_bridge))
            .ws_manager(Arc::clone(&self.ws_manager))
            .config(Arc::clone(&self.config))
            .build()
    }

    /// Initiates graceful shutdown of all services.
    pub async fn shutdown(&self) {
        log::info!("[Bootstrap] Beginning graceful shutdown...");

        // Stops the liveness sweep and, through the server, open connections.
        self.cancel_token.cancel();

        let connections_closed = self.ws_manager.close_all();
        if connections_closed > 0 {
            log::info!(
                "[Bootstrap] Closed {} WebSocket connection(s)",
                connections_closed
            );
        }

        let sessions_ended = self.registry.clear();
        log::info!("[Bootstrap] Ended {} session(s)", sessions_ended);

        log::info!("[Bootstrap] Shutdown complete");
    }
}

/// Bootstraps the session authority's services.
///
/// Wiring order:
///
/// 1. Validate configuration
/// 2. Shared infrastructure (event bridge, cancellation token, spawner)
/// 3. Session registry (depends on the event bridge)
/// 4. Liveness monitor (depends on the registry), started immediately
///
/// Must be called inside a Tokio runtime.
///
/// # Errors
///
/// Returns [`TandemError::Configuration`] if the configuration is invalid.
pub fn bootstrap_services(config: Config) -> TandemResult<BootstrappedServices> {
    config.validate().map_err(TandemError::Configuration)?;

    let spawner = TokioSpawner::current();
    let cancel_token = CancellationToken::new();
    let event_bridge = Arc::new(BroadcastEventBridge::new(config.event_channel_capacity));

    let registry = Arc::new(SessionRegistry::new(
        config.session.clone(),
        Arc::clone(&event_bridge) as Arc<dyn EventEmitter>,
    ));

    let liveness_monitor = Arc::new(LivenessMonitor::new(
        Arc::clone(&registry),
        config.session.sweep_interval(),
        cancel_token.child_token(),
    ));
    Arc::clone(&liveness_monitor).start(&spawner);

    log::info!(
        "[Bootstrap] Session authority ready (membership timeout {}s, sweep every {}s)",
        config.session.membership_timeout_secs,
        config.session.liveness_sweep_interval_secs
    );

    Ok(BootstrappedServices {
        registry,
        event_bridge,
        liveness_monitor,
        ws_manager: Arc::new(WsConnectionManager::new()),
        config: Arc::new(RwLock::new(config)),
        spawner,
        cancel_token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let mut config = Config::default();
        config.event_channel_capacity = 0;
        assert!(matches!(
            bootstrap_services(config),
            Err(TandemError::Configuration(_))
        ));
    }

    #[tokio::test]
    async fn shutdown_ends_sessions() {
        let services = bootstrap_services(Config::default()).unwrap();
        services.registry.create("host").unwrap();
        assert_eq!(services.app_state().registry.count(), 1);

        services.shutdown().await;
        assert!(services.cancel_token.is_cancelled());
        assert_eq!(services.registry.count(), 0);
    }
}
