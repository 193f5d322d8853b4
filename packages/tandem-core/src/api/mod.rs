//! HTTP/WebSocket API layer.
//!
//! This module contains thin handlers that delegate to the session registry.
//! It provides the router construction and server startup functionality.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::events::BroadcastEventBridge;
use crate::protocol_constants::{DEFAULT_PORT_RANGE_END, DEFAULT_PORT_RANGE_START};
use crate::services::SessionRegistry;
use crate::state::Config;

pub mod http;
pub mod response;
pub mod ws;
pub mod ws_connection;

pub use ws_connection::WsConnectionManager;

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind to a TCP port.
    #[error("Failed to bind to port: {0}")]
    Bind(#[from] std::io::Error),

    /// No available ports in the specified range.
    #[error("No available ports in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },
}

/// Shared application state for the API layer.
///
/// This is a thin wrapper that holds references to services.
/// All business logic lives in the services themselves.
#[derive(Clone)]
pub struct AppState {
    /// Authoritative session state.
    pub registry: Arc<SessionRegistry>,
    /// Event bridge feeding WebSocket subscribers.
    pub event_bridge: Arc<BroadcastEventBridge>,
    /// Manages WebSocket connections.
    pub ws_manager: Arc<WsConnectionManager>,
    /// Application configuration.
    pub config: Arc<RwLock<Config>>,
}

/// Builder for constructing an `AppState`.
#[derive(Default)]
pub struct AppStateBuilder {
    registry: Option<Arc<SessionRegistry>>,
    event_bridge: Option<Arc<BroadcastEventBridge>>,
    ws_manager: Option<Arc<WsConnectionManager>>,
    config: Option<Arc<RwLock<Config>>>,
}

impl AppStateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Arc<SessionRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn event_bridge(mut self, bridge: Arc<BroadcastEventBridge>) -> Self {
        self.event_bridge = Some(bridge);
        self
    }

    /// Sets the WebSocket connection manager (a fresh one if omitted).
    pub fn ws_manager(mut self, manager: Arc<WsConnectionManager>) -> Self {
        self.ws_manager = Some(manager);
        self
    }

    pub fn config(mut self, config: Arc<RwLock<Config>>) -> Self {
        self.config = Some(config);
        self
    }

    /// Builds the `AppState`, panicking if required fields are missing.
    pub fn build(self) -> AppState {
        AppState {
            registry: self.registry.expect("registry is required"),
            event_bridge: self.event_bridge.expect("event_bridge is required"),
            ws_manager: self.ws_manager.unwrap_or_default(),
            config: self.config.expect("config is required"),
        }
    }
}

impl AppState {
    /// Creates a new builder for constructing an `AppState`.
    pub fn builder() -> AppStateBuilder {
        AppStateBuilder::new()
    }
}

async fn find_available_port(start: u16, end: u16) -> Result<(u16, TcpListener), ServerError> {
    for port in start..=end {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        match TcpListener::bind(&addr).await {
            Ok(listener) => return Ok((port, listener)),
            Err(_) => continue,
        }
    }
    Err(ServerError::NoAvailablePort { start, end })
}

/// Binds the configured port, or the first free one in the default range.
pub async fn bind_listener(preferred_port: u16) -> Result<(u16, TcpListener), ServerError> {
    if preferred_port > 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], preferred_port));
        Ok((preferred_port, TcpListener::bind(&addr).await?))
    } else {
        find_available_port(DEFAULT_PORT_RANGE_START, DEFAULT_PORT_RANGE_END).await
    }
}

/// Serves the API until `shutdown` is cancelled.
///
/// Open WebSocket connections are closed when shutdown begins so the graceful
/// drain does not wait on them.
pub async fn start_server(state: AppState, shutdown: CancellationToken) -> Result<(), ServerError> {
    let preferred_port = state.config.read().preferred_port;
    let (port, listener) = bind_listener(preferred_port).await?;

    log::info!("Server listening on http://0.0.0.0:{}", port);
    let ws_manager = Arc::clone(&state.ws_manager);
    let app = http::create_router(state);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            ws_manager.close_all();
        })
        .await?;
    Ok(())
}
