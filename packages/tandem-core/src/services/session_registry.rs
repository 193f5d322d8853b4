//! Session registry: the authority over which groups exist.
//!
//! Responsibilities:
//! - Creating and tearing down playback sessions
//! - Membership (join, leave, liveness) and host failover
//! - Serializing commands per group
//! - Emitting session events after every change
//!
//! # Concurrency design
//!
//! Sessions live in a `DashMap` keyed by group id, each behind its own
//! `parking_lot::Mutex`. Callers clone the `Arc` and drop the map reference
//! before locking, so a session lock is never held while touching the map.
//! Teardown uses `remove_if`, which re-checks emptiness under the shard lock.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{TandemError, TandemResult};
use crate::events::{EndReason, EventEmitter, SessionEvent};
use crate::protocol_constants::GROUP_ID_PREFIX;
use crate::session::{CommandRequest, HostChange, PlaybackSession, SessionCommand, SessionSnapshot};
use crate::state::SessionConfig;
use crate::utils::{non_blank, now_millis};

type SharedSession = Arc<Mutex<PlaybackSession>>;

/// Totals from one liveness sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted_members: usize,
    pub ended_sessions: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.evicted_members == 0 && self.ended_sessions == 0
    }
}

/// Owns every active [`PlaybackSession`].
pub struct SessionRegistry {
    sessions: DashMap<String, SharedSession>,
    emitter: Arc<dyn EventEmitter>,
    config: SessionConfig,
}

impl SessionRegistry {
    pub fn new(config: SessionConfig, emitter: Arc<dyn EventEmitter>) -> Self {
        Self {
            sessions: DashMap::new(),
            emitter,
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of active sessions, as shown by the discovery indicator.
    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshots of all sessions, oldest first.
    pub fn list(&self) -> Vec<SessionSnapshot> {
        let sessions: Vec<SharedSession> = self
            .sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        let mut listed: Vec<(u64, SessionSnapshot)> = sessions
            .iter()
            .map(|session| {
                let guard = session.lock();
                (guard.created_at(), guard.snapshot())
            })
            .collect();
        listed.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.group_id.cmp(&b.1.group_id)));
        listed.into_iter().map(|(_, snapshot)| snapshot).collect()
    }

    /// Creates a session hosted by `host_member_id`.
    pub fn create(&self, host_member_id: &str) -> TandemResult<SessionSnapshot> {
        let host = require_member_id(host_member_id)?;
        let now = now_millis();
        let group_id = format!("{}{}", GROUP_ID_PREFIX, Uuid::new_v4());
        let session = PlaybackSession::new(&group_id, &host, now);
        let snapshot = session.snapshot();

        self.sessions
            .insert(group_id.clone(), Arc::new(Mutex::new(session)));

        log::info!("[SessionRegistry] Created {} hosted by {}", group_id, host);
        self.emitter.emit_session(SessionEvent::Created {
            group_id,
            host_member_id: host,
            timestamp: now,
        });
        Ok(snapshot)
    }

    /// Adds a member to a session. Joining again only refreshes liveness.
    pub fn join(&self, group_id: &str, member_id: &str) -> TandemResult<SessionSnapshot> {
        let member_id = require_member_id(member_id)?;
        let session = self.session(group_id)?;
        let now = now_millis();

        let (joined, snapshot) = {
            let mut guard = session.lock();
            // Emptied but not yet removed: already torn down for callers.
            if guard.is_empty() {
                return Err(TandemError::SessionNotFound(group_id.to_string()));
            }
            let joined = guard.add_member(&member_id, now);
            (joined, guard.snapshot())
        };

        if joined {
            log::info!("[SessionRegistry] {} joined {}", member_id, group_id);
            self.emitter.emit_session(SessionEvent::MemberJoined {
                group_id: group_id.to_string(),
                member_id,
                timestamp: now,
            });
        }
        Ok(snapshot)
    }

    /// Removes a member. The last member leaving tears the session down.
    pub fn leave(&self, group_id: &str, member_id: &str) -> TandemResult<()> {
        let session = self.session(group_id)?;
        let now = now_millis();

        let (host_change, snapshot, now_empty) = {
            let mut guard = session.lock();
            let host_change = guard.remove_member(member_id, now)?;
            (host_change, guard.snapshot(), guard.is_empty())
        };

        log::info!("[SessionRegistry] {} left {}", member_id, group_id);
        self.emitter.emit_session(SessionEvent::MemberLeft {
            group_id: group_id.to_string(),
            member_id: member_id.to_string(),
            timestamp: now,
        });

        if now_empty {
            self.end_if(group_id, EndReason::Empty, now, |s| s.is_empty());
        } else if let Some(change) = host_change {
            self.emit_host_change(change, snapshot, now);
        }
        Ok(())
    }

    /// Records a liveness signal.
    pub fn heartbeat(&self, group_id: &str, member_id: &str) -> TandemResult<()> {
        let session = self.session(group_id)?;
        if session.lock().touch_member(member_id, now_millis()) {
            Ok(())
        } else {
            Err(TandemError::NotMember(member_id.to_string()))
        }
    }

    /// Reads a session.
    ///
    /// With a `member_id` the read doubles as a liveness signal and fails with
    /// `NotMember` once that member has been evicted.
    pub fn snapshot(&self, group_id: &str, member_id: Option<&str>) -> TandemResult<SessionSnapshot> {
        let session = self.session(group_id)?;
        let mut guard = session.lock();
        if let Some(member_id) = member_id {
            if !guard.touch_member(member_id, now_millis()) {
                return Err(TandemError::NotMember(member_id.to_string()));
            }
        }
        Ok(guard.snapshot())
    }

    /// Applies a command and returns the resulting snapshot.
    pub fn apply_command(
        &self,
        group_id: &str,
        request: &CommandRequest,
    ) -> TandemResult<SessionSnapshot> {
        let session = self.session(group_id)?;
        let now = now_millis();

        let (changed, snapshot) = {
            let mut guard = session.lock();
            let changed = guard.apply(request, now, self.config.allow_member_control)?;
            (changed, guard.snapshot())
        };

        if changed {
            self.emitter.emit_session(SessionEvent::StateChanged {
                snapshot: Box::new(snapshot.clone()),
                timestamp: now,
            });
        } else if matches!(request.command, SessionCommand::Reanchor) {
            log::info!(
                "[SessionRegistry] {} re-anchored {} at v{}",
                request.member_id,
                group_id,
                snapshot.state_version
            );
            self.emitter.emit_session(SessionEvent::Reanchored {
                snapshot: Box::new(snapshot.clone()),
                timestamp: now,
            });
        }
        Ok(snapshot)
    }

    /// Evicts lapsed members and tears down empty or idle sessions.
    pub fn sweep(&self, now: u64) -> SweepReport {
        let membership_timeout = self.config.membership_timeout_ms();
        let idle_timeout = self.config.session_idle_timeout_ms();
        let sessions: Vec<(String, SharedSession)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        let mut report = SweepReport::default();
        for (group_id, session) in sessions {
            let (outcome, snapshot, empty, inactive) = {
                let mut guard = session.lock();
                let outcome = guard.evict_expired(now, membership_timeout);
                (
                    outcome,
                    guard.snapshot(),
                    guard.is_empty(),
                    guard.is_inactive(now, idle_timeout),
                )
            };

            for member_id in outcome.evicted {
                log::info!(
                    "[SessionRegistry] Evicted {} from {} (no liveness signal)",
                    member_id,
                    group_id
                );
                report.evicted_members += 1;
                self.emitter.emit_session(SessionEvent::MemberEvicted {
                    group_id: group_id.clone(),
                    member_id,
                    timestamp: now,
                });
            }

            let ended = if empty {
                self.end_if(&group_id, EndReason::Empty, now, |s| s.is_empty())
            } else if inactive {
                self.end_if(&group_id, EndReason::Inactive, now, |s| {
                    s.is_inactive(now, idle_timeout)
                })
            } else {
                false
            };

            if ended {
                report.ended_sessions += 1;
            } else if let Some(change) = outcome.host_change {
                self.emit_host_change(change, snapshot, now);
            }
        }
        report
    }

    /// Tears every session down (server shutdown).
    pub fn clear(&self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }

    fn session(&self, group_id: &str) -> TandemResult<SharedSession> {
        self.sessions
            .get(group_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| TandemError::SessionNotFound(group_id.to_string()))
    }

    /// Removes the session if `condition` still holds under the shard lock.
    fn end_if<F>(&self, group_id: &str, reason: EndReason, now: u64, condition: F) -> bool
    where
        F: Fn(&PlaybackSession) -> bool,
    {
        let removed = self
            .sessions
            .remove_if(group_id, |_, session| condition(&session.lock()))
            .is_some();
        if removed {
            log::info!("[SessionRegistry] Ended {} ({:?})", group_id, reason);
            self.emitter.emit_session(SessionEvent::Ended {
                group_id: group_id.to_string(),
                reason,
                timestamp: now,
            });
        }
        removed
    }

    fn emit_host_change(&self, change: HostChange, snapshot: SessionSnapshot, now: u64) {
        self.emitter.emit_session(SessionEvent::HostChanged {
            group_id: snapshot.group_id.clone(),
            previous_host_id: change.previous,
            host_member_id: change.promoted,
            state_version: snapshot.state_version,
            timestamp: now,
        });
        self.emitter.emit_session(SessionEvent::StateChanged {
            snapshot: Box::new(snapshot),
            timestamp: now,
        });
    }
}

fn require_member_id(member_id: &str) -> TandemResult<String> {
    non_blank(Some(member_id))
        .ok_or_else(|| TandemError::InvalidRequest("memberId must not be blank".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::RecordingEventEmitter;
    use crate::identity::{RawId, TrackReference};
    use crate::session::PlaybackPhase;

    fn registry_with(config: SessionConfig) -> (SessionRegistry, Arc<RecordingEventEmitter>) {
        let emitter = Arc::new(RecordingEventEmitter::default());
        let registry = SessionRegistry::new(config, emitter.clone());
        (registry, emitter)
    }

    fn registry() -> (SessionRegistry, Arc<RecordingEventEmitter>) {
        registry_with(SessionConfig::default())
    }

    fn enqueue(member: &str, id: u64, version: Option<u64>) -> CommandRequest {
        CommandRequest {
            member_id: member.to_string(),
            state_version: version,
            command: SessionCommand::Enqueue {
                track: TrackReference {
                    tidal_track_id: Some(RawId::from(id)),
                    ..Default::default()
                },
            },
        }
    }

    #[test]
    fn create_hands_out_unique_groups_at_version_zero() {
        let (registry, emitter) = registry();
        let a = registry.create("host-a").unwrap();
        let b = registry.create("host-b").unwrap();

        assert_ne!(a.group_id, b.group_id);
        assert!(a.group_id.starts_with(GROUP_ID_PREFIX));
        assert_eq!(a.state_version, 0);
        assert_eq!(a.host_member_id, "host-a");
        assert_eq!(registry.count(), 2);
        assert_eq!(emitter.session_types(), vec!["created", "created"]);
    }

    #[test]
    fn create_rejects_blank_member() {
        let (registry, _) = registry();
        assert!(matches!(
            registry.create("   "),
            Err(TandemError::InvalidRequest(_))
        ));
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn join_unknown_group_is_not_found() {
        let (registry, _) = registry();
        assert!(matches!(
            registry.join("grp:missing", "m1"),
            Err(TandemError::SessionNotFound(_))
        ));
    }

    #[test]
    fn joining_twice_is_idempotent() {
        let (registry, emitter) = registry();
        let group = registry.create("host").unwrap().group_id;
        registry.join(&group, "guest").unwrap();
        let snapshot = registry.join(&group, "guest").unwrap();

        assert_eq!(snapshot.members.len(), 2);
        assert_eq!(snapshot.state_version, 0);
        assert_eq!(emitter.session_types(), vec!["created", "memberJoined"]);
    }

    #[test]
    fn last_member_leaving_ends_session() {
        let (registry, emitter) = registry();
        let group = registry.create("host").unwrap().group_id;
        registry.leave(&group, "host").unwrap();

        assert_eq!(registry.count(), 0);
        assert!(matches!(
            registry.snapshot(&group, None),
            Err(TandemError::SessionNotFound(_))
        ));
        assert_eq!(emitter.session_types(), vec!["created", "memberLeft", "ended"]);
    }

    #[test]
    fn host_leaving_promotes_earliest_member() {
        let (registry, emitter) = registry();
        let group = registry.create("host").unwrap().group_id;
        registry.join(&group, "guest").unwrap();
        registry.leave(&group, "host").unwrap();

        let snapshot = registry.snapshot(&group, Some("guest")).unwrap();
        assert_eq!(snapshot.host_member_id, "guest");
        assert!(snapshot.awaiting_anchor);
        assert_eq!(snapshot.state_version, 1);
        assert!(emitter.session_types().contains(&"hostChanged".to_string()));
    }

    #[test]
    fn commands_emit_state_changes_and_reject_stale_versions() {
        let (registry, emitter) = registry();
        let group = registry.create("host").unwrap().group_id;

        let snapshot = registry
            .apply_command(&group, &enqueue("host", 1, Some(0)))
            .unwrap();
        assert_eq!(snapshot.phase, PlaybackPhase::Loaded);
        assert_eq!(snapshot.state_version, 1);

        match registry.apply_command(&group, &enqueue("host", 2, Some(0))) {
            Err(TandemError::StaleCommand { current }) => assert_eq!(current.state_version, 1),
            other => panic!("expected stale command, got {:?}", other),
        }
        assert_eq!(emitter.session_types(), vec!["created", "stateChanged"]);
    }

    #[test]
    fn reanchor_rebroadcasts_without_version_bump() {
        let (registry, emitter) = registry();
        let group = registry.create("host").unwrap().group_id;
        registry.join(&group, "guest").unwrap();
        registry.leave(&group, "host").unwrap();

        let request = CommandRequest {
            member_id: "guest".into(),
            state_version: Some(1),
            command: SessionCommand::Reanchor,
        };
        let snapshot = registry.apply_command(&group, &request).unwrap();
        assert_eq!(snapshot.state_version, 1);
        assert!(!snapshot.awaiting_anchor);
        assert_eq!(emitter.session_types().last().unwrap(), "reanchored");
    }

    #[test]
    fn snapshot_for_evicted_member_is_not_member() {
        let (registry, _) = registry();
        let group = registry.create("host").unwrap().group_id;
        assert!(matches!(
            registry.snapshot(&group, Some("ghost")),
            Err(TandemError::NotMember(_))
        ));
        assert!(matches!(
            registry.heartbeat(&group, "ghost"),
            Err(TandemError::NotMember(_))
        ));
    }

    #[test]
    fn sweep_fails_over_to_live_member() {
        let (registry, emitter) = registry();
        let group = registry.create("a").unwrap().group_id;
        registry.join(&group, "b").unwrap();
        registry.join(&group, "c").unwrap();

        let later = now_millis() + 20_000;
        {
            let session = registry.session(&group).unwrap();
            let mut guard = session.lock();
            guard.touch_member("b", later);
            guard.touch_member("c", later);
        }

        let report = registry.sweep(later + 1);
        assert_eq!(report.evicted_members, 1);
        assert_eq!(report.ended_sessions, 0);

        let snapshot = registry.snapshot(&group, None).unwrap();
        assert_eq!(snapshot.host_member_id, "b");
        let types = emitter.session_types();
        assert!(types.contains(&"memberEvicted".to_string()));
        assert!(types.contains(&"hostChanged".to_string()));
    }

    #[test]
    fn sweep_ends_sessions_without_members() {
        let (registry, emitter) = registry();
        registry.create("host").unwrap();

        let report = registry.sweep(now_millis() + 60_000);
        assert_eq!(
            report,
            SweepReport {
                evicted_members: 1,
                ended_sessions: 1
            }
        );
        assert_eq!(registry.count(), 0);
        assert_eq!(emitter.session_types().last().unwrap(), "ended");
    }

    #[test]
    fn sweep_ends_idle_sessions() {
        let (registry, _) = registry_with(SessionConfig {
            membership_timeout_secs: 3_600,
            session_idle_timeout_secs: 60,
            ..Default::default()
        });
        registry.create("host").unwrap();

        assert!(registry.sweep(now_millis() + 1_000).is_empty());
        let report = registry.sweep(now_millis() + 61_000);
        assert_eq!(report.ended_sessions, 1);
        assert_eq!(report.evicted_members, 0);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn list_returns_oldest_first() {
        let (registry, _) = registry();
        let first = registry.create("h1").unwrap().group_id;
        registry.create("h2").unwrap();
        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().any(|s| s.group_id == first));
    }
}
