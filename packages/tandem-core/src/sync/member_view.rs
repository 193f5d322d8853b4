//! A member's local view of the shared session.

use crate::session::SessionSnapshot;

/// Result of offering a snapshot to a [`MemberView`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The snapshot was newer and replaced the view.
    Applied,
    /// Same version as already applied; nothing to do.
    Duplicate,
    /// Older than the applied version, or for another group; ignored.
    Stale,
}

/// Last snapshot a member applied, with version ordering.
#[derive(Debug, Clone)]
pub struct MemberView {
    group_id: String,
    member_id: String,
    applied: Option<SessionSnapshot>,
}

impl MemberView {
    pub fn new(group_id: &str, member_id: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            member_id: member_id.to_string(),
            applied: None,
        }
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    pub fn snapshot(&self) -> Option<&SessionSnapshot> {
        self.applied.as_ref()
    }

    pub fn applied_version(&self) -> Option<u64> {
        self.applied.as_ref().map(|s| s.state_version)
    }

    /// Returns true if the applied snapshot names this member as host.
    pub fn is_host(&self) -> bool {
        self.applied
            .as_ref()
            .is_some_and(|s| s.is_host(&self.member_id))
    }

    /// Applies `snapshot` if it is newer than what the view holds.
    ///
    /// The first snapshot after joining is always applied.
    pub fn offer(&mut self, snapshot: SessionSnapshot) -> ApplyOutcome {
        if snapshot.group_id != self.group_id {
            log::warn!(
                "[MemberView] Ignoring snapshot for {} while in {}",
                snapshot.group_id,
                self.group_id
            );
            return ApplyOutcome::Stale;
        }
        match self.applied_version() {
            Some(current) if snapshot.state_version == current => {
                // Same shared state; liveness and anchoring metadata may be newer.
                self.applied = Some(snapshot);
                ApplyOutcome::Duplicate
            }
            Some(current) if snapshot.state_version < current => {
                log::debug!(
                    "[MemberView] Rejecting v{} (applied v{})",
                    snapshot.state_version,
                    current
                );
                ApplyOutcome::Stale
            }
            _ => {
                self.applied = Some(snapshot);
                ApplyOutcome::Applied
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::PlaybackSession;

    fn snapshot_at(version: u64) -> SessionSnapshot {
        let mut snapshot = PlaybackSession::new("grp:1", "host", 0).snapshot();
        snapshot.state_version = version;
        snapshot
    }

    #[test]
    fn first_snapshot_is_always_applied() {
        let mut view = MemberView::new("grp:1", "m1");
        assert_eq!(view.offer(snapshot_at(17)), ApplyOutcome::Applied);
        assert_eq!(view.applied_version(), Some(17));
    }

    #[test]
    fn equal_version_is_idempotent() {
        let mut view = MemberView::new("grp:1", "m1");
        view.offer(snapshot_at(7));
        let before = view.snapshot().cloned();
        assert_eq!(view.offer(snapshot_at(7)), ApplyOutcome::Duplicate);
        assert_eq!(view.snapshot().cloned(), before);
    }

    #[test]
    fn older_version_is_rejected() {
        let mut view = MemberView::new("grp:1", "m1");
        view.offer(snapshot_at(7));
        assert_eq!(view.offer(snapshot_at(6)), ApplyOutcome::Stale);
        assert_eq!(view.applied_version(), Some(7));
        assert_eq!(view.offer(snapshot_at(8)), ApplyOutcome::Applied);
    }

    #[test]
    fn foreign_group_is_ignored() {
        let mut view = MemberView::new("grp:2", "m1");
        assert_eq!(view.offer(snapshot_at(1)), ApplyOutcome::Stale);
        assert!(view.snapshot().is_none());
    }

    #[test]
    fn host_follows_applied_snapshot() {
        let mut view = MemberView::new("grp:1", "host");
        assert!(!view.is_host());
        view.offer(snapshot_at(1));
        assert!(view.is_host());
    }
}
