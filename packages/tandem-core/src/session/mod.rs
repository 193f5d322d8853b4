//! Authoritative playback state of a listening session.
//!
//! A [`PlaybackSession`] is owned by the session registry and changed only
//! through [`PlaybackSession::apply`] and its membership methods. Everything
//! members see is a [`SessionSnapshot`].

mod command;
mod membership;
mod playback;

pub use command::{CommandRequest, RepeatMode, SessionCommand};
pub use membership::{select_successor, MemberRole, SessionMembership};
pub use playback::{HostChange, PlaybackSession, SweepOutcome};

use serde::{Deserialize, Serialize};

use crate::identity::CanonicalTrackIdentity;

/// Playback phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlaybackPhase {
    /// No track loaded.
    #[default]
    Idle,
    /// Track selected, not playing.
    Loaded,
    Playing,
    Paused,
    /// Transient step inside a seek command. A seek resolves to `Playing` or
    /// `Paused` before the command returns, so this phase never appears in a
    /// published snapshot. Kept for clients that name the full phase set.
    Seeking,
}

/// Point-in-time copy of a session's shared state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub group_id: String,
    pub host_member_id: String,
    pub state_version: u64,
    pub phase: PlaybackPhase,
    pub current_index: Option<usize>,
    /// Position at `last_updated_at`.
    pub position_ms: u64,
    pub is_playing: bool,
    /// Unix timestamp in milliseconds.
    pub last_updated_at: u64,
    pub queue: Vec<CanonicalTrackIdentity>,
    #[serde(default)]
    pub repeat_mode: RepeatMode,
    #[serde(default)]
    pub members: Vec<SessionMembership>,
    /// A promoted host has not re-anchored yet.
    #[serde(default)]
    pub awaiting_anchor: bool,
}

impl SessionSnapshot {
    /// Returns the track at `current_index`.
    pub fn current_track(&self) -> Option<&CanonicalTrackIdentity> {
        self.current_index.and_then(|i| self.queue.get(i))
    }

    /// Position corrected for time elapsed since `last_updated_at`.
    pub fn effective_position_ms(&self, now: u64, track_duration_ms: Option<u64>) -> u64 {
        effective_position_ms(
            self.position_ms,
            self.is_playing,
            self.last_updated_at,
            now,
            track_duration_ms,
        )
    }

    /// Returns true if `member_id` is the host.
    pub fn is_host(&self, member_id: &str) -> bool {
        self.host_member_id == member_id
    }
}

/// Computes the true position from an anchored position.
///
/// `position + (playing ? now - anchored_at : 0)`, clamped to the track
/// duration when known. A clock behind `anchored_at` adds nothing.
pub fn effective_position_ms(
    position_ms: u64,
    is_playing: bool,
    anchored_at: u64,
    now: u64,
    track_duration_ms: Option<u64>,
) -> u64 {
    let elapsed = if is_playing {
        now.saturating_sub(anchored_at)
    } else {
        0
    };
    let position = position_ms.saturating_add(elapsed);
    match track_duration_ms {
        Some(duration) => position.min(duration),
        None => position,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resumed_session_advances_with_wall_clock() {
        let t0 = 1_700_000_000_000;
        assert_eq!(effective_position_ms(10_000, true, t0, t0 + 2_500, None), 12_500);
    }

    #[test]
    fn paused_session_does_not_advance() {
        let t0 = 1_700_000_000_000;
        assert_eq!(effective_position_ms(10_000, false, t0, t0 + 2_500, None), 10_000);
    }

    #[test]
    fn effective_position_clamps_to_duration() {
        assert_eq!(effective_position_ms(170_000, true, 0, 20_000, Some(180_000)), 180_000);
    }

    #[test]
    fn clock_behind_anchor_adds_nothing() {
        assert_eq!(effective_position_ms(5_000, true, 10_000, 9_000, None), 5_000);
    }
}
