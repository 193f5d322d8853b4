//! Configuration for the session authority and the member-side sync client.
//!
//! Each section validates itself; [`Config::validate`] checks the whole tree
//! before services are wired.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the session authority.
///
/// Governs membership liveness, inactivity teardown and who may control
/// playback.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// A member without a liveness signal for this long is evicted (seconds).
    pub membership_timeout_secs: u64,

    /// A session that is not playing and sees no activity for this long is
    /// torn down (seconds).
    pub session_idle_timeout_secs: u64,

    /// Interval between liveness sweeps (seconds).
    pub liveness_sweep_interval_secs: u64,

    /// Lets non-host members issue transport commands (play, pause, seek, skip).
    ///
    /// Queue edits are always open to every member. Device reports stay
    /// host-only regardless.
    pub allow_member_control: bool,
}

impl SessionConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.membership_timeout_secs == 0 {
            return Err("membership_timeout_secs must be >= 1".to_string());
        }
        if self.liveness_sweep_interval_secs == 0 {
            return Err(
                "liveness_sweep_interval_secs must be >= 1 (interval panics on 0)".to_string(),
            );
        }
        if self.liveness_sweep_interval_secs > self.membership_timeout_secs {
            return Err(
                "liveness_sweep_interval_secs must not exceed membership_timeout_secs".to_string(),
            );
        }
        if self.session_idle_timeout_secs == 0 {
            return Err("session_idle_timeout_secs must be >= 1".to_string());
        }
        Ok(())
    }

    pub fn membership_timeout_ms(&self) -> u64 {
        self.membership_timeout_secs.saturating_mul(1000)
    }

    pub fn session_idle_timeout_ms(&self) -> u64 {
        self.session_idle_timeout_secs.saturating_mul(1000)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_sweep_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            membership_timeout_secs: 15,
            session_idle_timeout_secs: 6 * 60 * 60,
            liveness_sweep_interval_secs: 5,
            allow_member_control: false,
        }
    }
}

/// Configuration for the member-side sync client.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SyncConfig {
    /// Interval between session discovery polls (seconds).
    pub discovery_poll_interval_secs: u64,

    /// Snapshot pull interval while acting as host (milliseconds).
    pub host_sync_interval_ms: u64,

    /// Snapshot pull interval while following (milliseconds).
    pub member_sync_interval_ms: u64,

    /// Local drift beyond this is corrected with a seek (milliseconds).
    pub drift_threshold_ms: u64,

    /// Drift is not measured for this long after a seek (milliseconds).
    pub seek_grace_ms: u64,

    /// Advisory timeout for each call to the authority (milliseconds).
    pub network_timeout_ms: u64,
}

impl SyncConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.discovery_poll_interval_secs == 0 {
            return Err("discovery_poll_interval_secs must be >= 1".to_string());
        }
        if self.host_sync_interval_ms == 0 || self.member_sync_interval_ms == 0 {
            return Err("sync intervals must be >= 1ms (interval panics on 0)".to_string());
        }
        if self.network_timeout_ms == 0 {
            return Err("network_timeout_ms must be >= 1".to_string());
        }
        Ok(())
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_poll_interval_secs)
    }

    /// Pull interval for the given role.
    pub fn sync_interval(&self, is_host: bool) -> Duration {
        Duration::from_millis(if is_host {
            self.host_sync_interval_ms
        } else {
            self.member_sync_interval_ms
        })
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            discovery_poll_interval_secs: 30,
            host_sync_interval_ms: 500,
            member_sync_interval_ms: 3_000,
            drift_threshold_ms: 1_500,
            seek_grace_ms: 3_000,
            network_timeout_ms: 5_000,
        }
    }
}

/// Configuration for Tandem.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct Config {
    // Server
    /// Preferred port for the HTTP/WS server (0 = auto-allocate).
    pub preferred_port: u16,

    /// Capacity of the event broadcast channel.
    pub event_channel_capacity: usize,

    // Sessions
    /// Session authority configuration.
    pub session: SessionConfig,

    // Sync
    /// Member-side sync configuration.
    pub sync: SyncConfig,
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.event_channel_capacity == 0 {
            return Err(
                "event_channel_capacity must be >= 1 (broadcast::channel panics on 0)".to_string(),
            );
        }
        self.session.validate()?;
        self.sync.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            preferred_port: 0,
            event_channel_capacity: crate::protocol_constants::EVENT_CHANNEL_CAPACITY,
            session: SessionConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}
