//! Fixed protocol constants that should NOT be changed.
//!
//! These values are part of contracts with external collaborators (legacy
//! clients, audio engines, the discovery indicator) and changing them would
//! break compatibility. Tunable timing lives in [`crate::state::Config`].

// ─────────────────────────────────────────────────────────────────────────────
// Legacy Field Compatibility
// ─────────────────────────────────────────────────────────────────────────────

/// Version of the legacy `{streamSource, tidalTrackId | youtubeVideoId}` shape
/// produced by [`crate::identity::to_legacy_stream_fields`].
///
/// Bump only together with a migration path for collaborators built against
/// the previous shape.
pub const LEGACY_FIELDS_CONTRACT_VERSION: u32 = 1;

/// Legacy provider tag that older clients and the audio engine use for the
/// video-platform music provider.
pub const YTMUSIC_ALIAS: &str = "ytmusic";

// ─────────────────────────────────────────────────────────────────────────────
// HTTP
// ─────────────────────────────────────────────────────────────────────────────

/// Timeout for the shared HTTP client (seconds).
///
/// Per-call advisory timeouts from [`crate::state::SyncConfig`] are shorter;
/// this is the hard upper bound.
pub const HTTP_CLIENT_TIMEOUT_SECS: u64 = 10;

/// Capacity of the broadcast channel carrying events to WebSocket clients.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// First port tried when no preferred port is configured.
pub const DEFAULT_PORT_RANGE_START: u16 = 49400;

/// Last port tried when no preferred port is configured.
pub const DEFAULT_PORT_RANGE_END: u16 = 49410;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket
// ─────────────────────────────────────────────────────────────────────────────

/// How often an event connection is checked for inactivity (seconds).
pub const WS_HEARTBEAT_CHECK_INTERVAL_SECS: u64 = 5;

/// An event connection silent for this long is closed (seconds).
pub const WS_HEARTBEAT_TIMEOUT_SECS: u64 = 30;

// ─────────────────────────────────────────────────────────────────────────────
// Application Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Service identifier reported by the health endpoint.
///
/// Clients probe `/health` and expect this exact string to identify a valid
/// session authority.
pub const SERVICE_ID: &str = "tandem";

/// Prefix for group identifiers handed out by the registry.
pub const GROUP_ID_PREFIX: &str = "grp:";
