//! Tandem Core - shared library for synchronized listening sessions.
//!
//! A small group of people listens to the same queue at the same time, each on
//! their own device. One member hosts; everyone else follows. This crate holds
//! both sides: the session authority (served over HTTP by the standalone
//! server) and the member-side sync client embedded in players.
//!
//! # Architecture
//!
//! - [`identity`]: Canonical media identity across providers and legacy fields
//! - [`session`]: The playback session state machine and its snapshots
//! - [`services`]: Session registry and liveness sweep (the authority)
//! - [`sync`]: Member view, drift correction and the sync client
//! - [`arbitration`]: Sharing one local output between the session and previews
//! - [`api`]: HTTP routes and the WebSocket event stream
//! - [`events`]: Event system for real-time client communication
//! - [`state`]: Configuration
//! - [`error`]: Centralized error types
//!
//! # Abstraction Traits
//!
//! - [`TaskSpawner`](runtime::TaskSpawner): Spawning background tasks
//! - [`EventEmitter`](events::EventEmitter): Emitting domain events
//! - [`LocalPlayer`](player::LocalPlayer): Controlling the device's audio player
//! - [`SessionTransport`](sync::SessionTransport): Reaching the authority

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod arbitration;
pub mod bootstrap;
pub mod error;
pub mod events;
pub mod identity;
pub mod player;
pub mod protocol_constants;
pub mod runtime;
pub mod services;
pub mod session;
pub mod state;
pub mod sync;
pub mod utils;

// Re-export commonly used types at the crate root
pub use arbitration::{AudioOwner, LocalAudioArbiter, LocalPlaybackArbitrationState};
pub use error::{ErrorCode, TandemError, TandemResult};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EndReason, EventEmitter, LoggingEventEmitter,
    NoopEventEmitter, SessionEvent, SyncEvent,
};
pub use identity::{
    resolve, to_legacy_stream_fields, CanonicalMediaSource, CanonicalTrackIdentity,
    LegacyStreamFields, TrackReference,
};
pub use player::{LocalPlayer, PlayerError, PlayerResult};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use session::{
    CommandRequest, PlaybackPhase, PlaybackSession, RepeatMode, SessionCommand, SessionSnapshot,
};
pub use state::{Config, SessionConfig, SyncConfig};
pub use utils::now_millis;

// Re-export service types
pub use services::{LivenessMonitor, SessionRegistry};

// Re-export sync types
pub use sync::{HttpSessionTransport, InProcessTransport, SessionTransport, SyncClient};

// Re-export bootstrap types
pub use bootstrap::{bootstrap_services, BootstrappedServices};

// Re-export API types
pub use api::{start_server, AppState, AppStateBuilder, ServerError, WsConnectionManager};
