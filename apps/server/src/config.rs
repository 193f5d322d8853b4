//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to (0 = first free port in the default range).
    /// Override: `TANDEM_BIND_PORT`
    pub bind_port: u16,

    /// Seconds without a liveness signal before a member is evicted.
    /// Override: `TANDEM_MEMBERSHIP_TIMEOUT_SECS`
    pub membership_timeout_secs: u64,

    /// Seconds of inactivity before a non-playing session is torn down.
    /// Override: `TANDEM_SESSION_IDLE_TIMEOUT_SECS`
    pub session_idle_timeout_secs: u64,

    /// Seconds between liveness sweeps.
    pub liveness_sweep_interval_secs: u64,

    /// Let non-host members issue playback commands, not just queue edits.
    /// Override: `TANDEM_ALLOW_MEMBER_CONTROL`
    pub allow_member_control: bool,

    /// Capacity of the event channel feeding WebSocket subscribers.
    pub event_channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let session = tandem_core::SessionConfig::default();
        Self {
            bind_port: 49400,
            membership_timeout_secs: session.membership_timeout_secs,
            session_idle_timeout_secs: session.session_idle_timeout_secs,
            liveness_sweep_interval_secs: session.liveness_sweep_interval_secs,
            allow_member_control: session.allow_member_control,
            event_channel_capacity: tandem_core::Config::default().event_channel_capacity,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::from_yaml(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) {
        override_from_env("TANDEM_BIND_PORT", &mut self.bind_port);
        override_from_env(
            "TANDEM_MEMBERSHIP_TIMEOUT_SECS",
            &mut self.membership_timeout_secs,
        );
        override_from_env(
            "TANDEM_SESSION_IDLE_TIMEOUT_SECS",
            &mut self.session_idle_timeout_secs,
        );
        override_from_env(
            "TANDEM_ALLOW_MEMBER_CONTROL",
            &mut self.allow_member_control,
        );
        // TANDEM_LOG_LEVEL is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to tandem-core's Config type.
    pub fn to_core_config(&self) -> tandem_core::Config {
        tandem_core::Config {
            preferred_port: self.bind_port,
            event_channel_capacity: self.event_channel_capacity,
            session: tandem_core::SessionConfig {
                membership_timeout_secs: self.membership_timeout_secs,
                session_idle_timeout_secs: self.session_idle_timeout_secs,
                liveness_sweep_interval_secs: self.liveness_sweep_interval_secs,
                allow_member_control: self.allow_member_control,
            },
            ..Default::default()
        }
    }
}

/// Replaces `target` with the parsed variable; unparsable values are ignored.
fn override_from_env<T: std::str::FromStr>(name: &str, target: &mut T) {
    if let Ok(val) = std::env::var(name) {
        match val.parse() {
            Ok(parsed) => *target = parsed,
            Err(_) => log::warn!("Ignoring unparsable {}={}", name, val),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = ServerConfig::from_yaml("bind_port: 8080\nallow_member_control: true\n")
            .unwrap();
        assert_eq!(config.bind_port, 8080);
        assert!(config.allow_member_control);
        assert_eq!(config.membership_timeout_secs, 15);
    }

    #[test]
    fn core_config_carries_session_settings() {
        let config = ServerConfig {
            membership_timeout_secs: 30,
            ..Default::default()
        };
        let core = config.to_core_config();
        assert_eq!(core.preferred_port, 49400);
        assert_eq!(core.session.membership_timeout_secs, 30);
        assert!(core.validate().is_ok());
    }
}
