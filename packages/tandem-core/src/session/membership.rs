//! Session membership and host succession.

use serde::{Deserialize, Serialize};

/// Role of a member within a listening session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberRole {
    /// Authorized to emit state-changing playback commands.
    Host,
    /// Follows the host's playback.
    #[default]
    Member,
}

/// One member's participation in a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMembership {
    pub member_id: String,
    pub group_id: String,
    pub role: MemberRole,
    /// Unix timestamp in milliseconds.
    pub joined_at: u64,
    /// Last liveness signal, Unix timestamp in milliseconds.
    pub last_seen_at: u64,
}

impl SessionMembership {
    /// Creates a membership that joined (and was last seen) at `now`.
    pub fn new(member_id: &str, group_id: &str, role: MemberRole, now: u64) -> Self {
        Self {
            member_id: member_id.to_string(),
            group_id: group_id.to_string(),
            role,
            joined_at: now,
            last_seen_at: now,
        }
    }

    /// Records a liveness signal.
    pub fn touch(&mut self, now: u64) {
        self.last_seen_at = self.last_seen_at.max(now);
    }

    /// Returns true if no liveness signal arrived within `timeout_ms`.
    pub fn is_expired(&self, now: u64, timeout_ms: u64) -> bool {
        now.saturating_sub(self.last_seen_at) > timeout_ms
    }

    /// Returns true if this member currently holds the host role.
    pub fn is_host(&self) -> bool {
        self.role == MemberRole::Host
    }
}

/// Picks the member that inherits the host role.
///
/// The longest-standing member wins: earliest `joined_at`, ties broken by
/// the smallest member id, so every replica picks the same successor.
pub fn select_successor<'a, I>(candidates: I) -> Option<&'a SessionMembership>
where
    I: IntoIterator<Item = &'a SessionMembership>,
{
    candidates
        .into_iter()
        .min_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.member_id.cmp(&b.member_id))
        })
}
