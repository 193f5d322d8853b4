//! Event system for real-time client communication.
//!
//! This module provides:
//! - [`EventEmitter`] trait for domain services to emit events
//! - [`BroadcastEventBridge`] for WebSocket transport
//! - Event types for the session authority and the member-side sync client

mod bridge;
mod emitter;

pub use bridge::BroadcastEventBridge;
pub use emitter::{EventEmitter, LoggingEventEmitter, NoopEventEmitter};

#[cfg(test)]
pub(crate) use emitter::testing::RecordingEventEmitter;

use serde::Serialize;

use crate::session::SessionSnapshot;

/// Events broadcast to clients.
///
/// This enum categorizes all real-time events that can be sent to connected
/// clients. Each category has its own inner event type with specific variants.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Events from the session authority.
    Session(SessionEvent),

    /// Events from a member's sync client.
    Sync(SyncEvent),
}

/// Why a session was torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    /// The last member left or was evicted.
    Empty,
    /// Nothing played and nobody acted for the idle timeout.
    Inactive,
}

/// Events related to session lifecycle, membership and shared state.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A session was created.
    Created {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "hostMemberId")]
        host_member_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A session was torn down.
    Ended {
        #[serde(rename = "groupId")]
        group_id: String,
        reason: EndReason,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A member joined.
    MemberJoined {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "memberId")]
        member_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A member left voluntarily.
    MemberLeft {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "memberId")]
        member_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A member was removed after its liveness signals stopped.
    MemberEvicted {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "memberId")]
        member_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The host role moved to another member.
    HostChanged {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "previousHostId")]
        previous_host_id: String,
        #[serde(rename = "hostMemberId")]
        host_member_id: String,
        #[serde(rename = "stateVersion")]
        state_version: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Shared state changed; carries the new snapshot.
    StateChanged {
        snapshot: Box<SessionSnapshot>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A promoted host re-broadcast the last snapshot.
    Reanchored {
        snapshot: Box<SessionSnapshot>,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Events emitted by a member's sync client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SyncEvent {
    /// Discovery found a new number of joinable sessions.
    DiscoveryUpdated {
        #[serde(rename = "sessionCount")]
        session_count: usize,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A newer snapshot replaced the member's view.
    SnapshotApplied {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "stateVersion")]
        state_version: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// Local playback was moved back onto the shared position.
    DriftCorrected {
        #[serde(rename = "groupId")]
        group_id: String,
        /// Local minus expected position, in milliseconds.
        #[serde(rename = "driftMs")]
        drift_ms: i64,
        #[serde(rename = "targetMs")]
        target_ms: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// This member inherited the host role.
    HostPromoted {
        #[serde(rename = "groupId")]
        group_id: String,
        #[serde(rename = "memberId")]
        member_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The local player failed to load or play.
    PlaybackDeviceError {
        #[serde(rename = "groupId", skip_serializing_if = "Option::is_none")]
        group_id: Option<String>,
        message: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The session disappeared or this member was evicted.
    SessionLost {
        #[serde(rename = "groupId")]
        group_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl SessionEvent {
    /// Group the event belongs to.
    pub fn group_id(&self) -> &str {
        match self {
            Self::Created { group_id, .. }
            | Self::Ended { group_id, .. }
            | Self::MemberJoined { group_id, .. }
            | Self::MemberLeft { group_id, .. }
            | Self::MemberEvicted { group_id, .. }
            | Self::HostChanged { group_id, .. } => group_id,
            Self::StateChanged { snapshot, .. } | Self::Reanchored { snapshot, .. } => {
                &snapshot.group_id
            }
        }
    }
}

impl SyncEvent {
    /// Group the event belongs to; discovery events belong to none.
    pub fn group_id(&self) -> Option<&str> {
        match self {
            Self::DiscoveryUpdated { .. } => None,
            Self::PlaybackDeviceError { group_id, .. } => group_id.as_deref(),
            Self::SnapshotApplied { group_id, .. }
            | Self::DriftCorrected { group_id, .. }
            | Self::HostPromoted { group_id, .. }
            | Self::SessionLost { group_id, .. } => Some(group_id),
        }
    }
}

impl BroadcastEvent {
    pub fn group_id(&self) -> Option<&str> {
        match self {
            Self::Session(event) => Some(event.group_id()),
            Self::Sync(event) => event.group_id(),
        }
    }
}

impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        BroadcastEvent::Session(event)
    }
}

impl From<SyncEvent> for BroadcastEvent {
    fn from(event: SyncEvent) -> Self {
        BroadcastEvent::Sync(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_event_is_tagged_by_category_and_type() {
        let event: BroadcastEvent = SessionEvent::MemberJoined {
            group_id: "grp:1".into(),
            member_id: "m1".into(),
            timestamp: 7,
        }
        .into();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["category"], "session");
        assert_eq!(json["type"], "memberJoined");
        assert_eq!(json["groupId"], "grp:1");
        assert_eq!(json["memberId"], "m1");
    }

    #[test]
    fn device_error_omits_missing_group() {
        let event = BroadcastEvent::Sync(SyncEvent::PlaybackDeviceError {
            group_id: None,
            message: "no output".into(),
            timestamp: 0,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "playbackDeviceError");
        assert!(json.get("groupId").is_none());
    }

    #[test]
    fn events_report_their_group() {
        let joined = BroadcastEvent::from(SessionEvent::MemberJoined {
            group_id: "grp:1".into(),
            member_id: "m1".into(),
            timestamp: 0,
        });
        assert_eq!(joined.group_id(), Some("grp:1"));

        let discovery = BroadcastEvent::from(SyncEvent::DiscoveryUpdated {
            session_count: 3,
            timestamp: 0,
        });
        assert_eq!(discovery.group_id(), None);
    }
}
