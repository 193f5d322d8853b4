//! Commands accepted by the playback session state machine.

use serde::{Deserialize, Serialize};

use crate::identity::TrackReference;

/// Behaviour when the current track ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RepeatMode {
    /// Stop after the last track.
    #[default]
    Off,
    /// Wrap around to the first track.
    All,
    /// Replay the current track.
    One,
}

/// A state-changing request against one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionCommand {
    /// Start or resume playback.
    Play,
    /// Pause playback.
    Pause,
    /// Jump to a position in the current track.
    Seek {
        #[serde(rename = "positionMs")]
        position_ms: u64,
    },
    /// The host's player reached the end of the current track.
    TrackEnded,
    /// Skip to the next track.
    Next,
    /// Restart the current track, or go back one if near its start.
    Previous,
    /// Jump to a queue position.
    SelectIndex {
        index: usize,
        /// Start playing immediately.
        #[serde(default)]
        play: bool,
    },
    /// Append a track (resolved before insertion).
    Enqueue { track: TrackReference },
    /// Remove the queue entry at `index`.
    RemoveAt { index: usize },
    /// Move a queue entry.
    Move { from: usize, to: usize },
    /// Empty the queue.
    Clear,
    /// Change the repeat mode.
    SetRepeat { mode: RepeatMode },
    /// The host's player failed; the session stops playing.
    ReportPlaybackError { message: String },
    /// A newly promoted host re-broadcasts the last snapshot.
    Reanchor,
}

impl SessionCommand {
    /// Short name used in logs and events.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Seek { .. } => "seek",
            Self::TrackEnded => "trackEnded",
            Self::Next => "next",
            Self::Previous => "previous",
            Self::SelectIndex { .. } => "selectIndex",
            Self::Enqueue { .. } => "enqueue",
            Self::RemoveAt { .. } => "removeAt",
            Self::Move { .. } => "move",
            Self::Clear => "clear",
            Self::SetRepeat { .. } => "setRepeat",
            Self::ReportPlaybackError { .. } => "reportPlaybackError",
            Self::Reanchor => "reanchor",
        }
    }

    /// Queue edits that any member may issue.
    pub fn is_queue_edit(&self) -> bool {
        matches!(
            self,
            Self::Enqueue { .. } | Self::RemoveAt { .. } | Self::Move { .. } | Self::Clear
        )
    }

    /// Reports from the host's own player; never delegated to members.
    pub fn is_device_report(&self) -> bool {
        matches!(self, Self::TrackEnded | Self::ReportPlaybackError { .. })
    }
}

/// Command envelope as submitted by a member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    pub member_id: String,
    /// Version the issuer last applied; older versions are rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_version: Option<u64>,
    pub command: SessionCommand,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commands_use_tagged_camel_case() {
        let cmd: SessionCommand =
            serde_json::from_value(json!({ "type": "seek", "positionMs": 1500 })).unwrap();
        assert_eq!(cmd, SessionCommand::Seek { position_ms: 1500 });

        let cmd: SessionCommand =
            serde_json::from_value(json!({ "type": "selectIndex", "index": 2 })).unwrap();
        assert_eq!(cmd, SessionCommand::SelectIndex { index: 2, play: false });
    }

    #[test]
    fn request_version_is_optional() {
        let req: CommandRequest = serde_json::from_value(json!({
            "memberId": "m1",
            "command": { "type": "enqueue", "track": { "tidalTrackId": 7 } }
        }))
        .unwrap();
        assert_eq!(req.state_version, None);
        assert!(req.command.is_queue_edit());
        assert!(!req.command.is_device_report());
    }
}
