//! Playback session state machine.
//!
//! Phases: `Idle → Loaded → Playing ⇄ Paused`, with `Seeking` as a transient
//! step inside a seek. Every accepted change bumps `state_version` and
//! re-anchors `position_ms` at `last_updated_at`. Requests carrying an older
//! version are rejected with the authoritative snapshot.

use std::collections::BTreeMap;

use crate::error::{TandemError, TandemResult};
use crate::identity::{resolve, CanonicalTrackIdentity, TrackReference};

use super::command::{CommandRequest, RepeatMode, SessionCommand};
use super::membership::{select_successor, MemberRole, SessionMembership};
use super::{effective_position_ms, PlaybackPhase, SessionSnapshot};

/// Past this point `previous` restarts the current track instead of going back.
const PREVIOUS_RESTART_THRESHOLD_MS: u64 = 3_000;

/// Host role moved from one member to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostChange {
    pub previous: String,
    pub promoted: String,
}

/// Result of a liveness sweep over one session.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Members removed for lack of liveness signals.
    pub evicted: Vec<String>,
    /// Set when the host was among the evicted.
    pub host_change: Option<HostChange>,
}

/// Authoritative shared playback state of one group.
#[derive(Debug, Clone)]
pub struct PlaybackSession {
    group_id: String,
    host_member_id: String,
    members: BTreeMap<String, SessionMembership>,
    queue: Vec<CanonicalTrackIdentity>,
    current_index: Option<usize>,
    position_ms: u64,
    is_playing: bool,
    phase: PlaybackPhase,
    repeat_mode: RepeatMode,
    state_version: u64,
    last_updated_at: u64,
    created_at: u64,
    last_activity_at: u64,
    awaiting_anchor: bool,
}

impl PlaybackSession {
    /// Creates an idle session whose only member is the host.
    pub fn new(group_id: &str, host_member_id: &str, now: u64) -> Self {
        let mut members = BTreeMap::new();
        members.insert(
            host_member_id.to_string(),
            SessionMembership::new(host_member_id, group_id, MemberRole::Host, now),
        );
        Self {
            group_id: group_id.to_string(),
            host_member_id: host_member_id.to_string(),
            members,
            queue: Vec::new(),
            current_index: None,
            position_ms: 0,
            is_playing: false,
            phase: PlaybackPhase::Idle,
            repeat_mode: RepeatMode::Off,
            state_version: 0,
            last_updated_at: now,
            created_at: now,
            last_activity_at: now,
            awaiting_anchor: false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn host_member_id(&self) -> &str {
        &self.host_member_id
    }

    pub fn state_version(&self) -> u64 {
        self.state_version
    }

    pub fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn queue(&self) -> &[CanonicalTrackIdentity] {
        &self.queue
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn awaiting_anchor(&self) -> bool {
        self.awaiting_anchor
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, member_id: &str) -> bool {
        self.members.contains_key(member_id)
    }

    /// Returns true once the last member has left.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Position corrected for time elapsed since the last change.
    pub fn effective_position(&self, now: u64) -> u64 {
        effective_position_ms(
            self.position_ms,
            self.is_playing,
            self.last_updated_at,
            now,
            None,
        )
    }

    /// Returns true if nothing is playing and nobody acted for `timeout_ms`.
    pub fn is_inactive(&self, now: u64, timeout_ms: u64) -> bool {
        !self.is_playing && now.saturating_sub(self.last_activity_at) > timeout_ms
    }

    /// Copies the shared state for members.
    pub fn snapshot(&self) -> SessionSnapshot {
        let mut members: Vec<SessionMembership> = self.members.values().cloned().collect();
        members.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.member_id.cmp(&b.member_id))
        });
        SessionSnapshot {
            group_id: self.group_id.clone(),
            host_member_id: self.host_member_id.clone(),
            state_version: self.state_version,
            phase: self.phase,
            current_index: self.current_index,
            position_ms: self.position_ms,
            is_playing: self.is_playing,
            last_updated_at: self.last_updated_at,
            queue: self.queue.clone(),
            repeat_mode: self.repeat_mode,
            members,
            awaiting_anchor: self.awaiting_anchor,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Membership
    // ─────────────────────────────────────────────────────────────────────────

    /// Adds a member, or refreshes liveness of an existing one.
    ///
    /// Returns true if the member is new.
    pub fn add_member(&mut self, member_id: &str, now: u64) -> bool {
        if let Some(existing) = self.members.get_mut(member_id) {
            existing.touch(now);
            return false;
        }
        self.members.insert(
            member_id.to_string(),
            SessionMembership::new(member_id, &self.group_id, MemberRole::Member, now),
        );
        self.last_activity_at = now;
        true
    }

    /// Records a liveness signal. Returns false for unknown members.
    pub fn touch_member(&mut self, member_id: &str, now: u64) -> bool {
        match self.members.get_mut(member_id) {
            Some(member) => {
                member.touch(now);
                true
            }
            None => false,
        }
    }

    /// Removes a member, promoting a successor if it was the host.
    pub fn remove_member(&mut self, member_id: &str, now: u64) -> TandemResult<Option<HostChange>> {
        let removed = self
            .members
            .remove(member_id)
            .ok_or_else(|| TandemError::NotMember(member_id.to_string()))?;
        self.last_activity_at = now;
        if removed.is_host() {
            Ok(self.promote_successor(removed.member_id, now))
        } else {
            Ok(None)
        }
    }

    /// Evicts members without a liveness signal for `timeout_ms`.
    pub fn evict_expired(&mut self, now: u64, timeout_ms: u64) -> SweepOutcome {
        let expired: Vec<String> = self
            .members
            .values()
            .filter(|m| m.is_expired(now, timeout_ms))
            .map(|m| m.member_id.clone())
            .collect();

        let mut host_evicted = false;
        for member_id in &expired {
            if let Some(removed) = self.members.remove(member_id) {
                host_evicted |= removed.is_host();
            }
        }

        let host_change = if host_evicted {
            self.promote_successor(self.host_member_id.clone(), now)
        } else {
            None
        };

        SweepOutcome {
            evicted: expired,
            host_change,
        }
    }

    /// Hands the host role to the longest-standing remaining member.
    ///
    /// The promoted host must re-anchor before it may change state.
    fn promote_successor(&mut self, previous: String, now: u64) -> Option<HostChange> {
        let promoted = select_successor(self.members.values())?.member_id.clone();
        if let Some(member) = self.members.get_mut(&promoted) {
            member.role = MemberRole::Host;
        }
        self.host_member_id = promoted.clone();
        self.awaiting_anchor = true;
        let position = self.effective_position(now);
        self.commit(now, position);

        log::info!(
            "[Session {}] Host {} -> {} (version {})",
            self.group_id,
            previous,
            promoted,
            self.state_version
        );
        Some(HostChange { previous, promoted })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies one command.
    ///
    /// Returns `Ok(true)` when state changed (and `state_version` advanced),
    /// `Ok(false)` when the command restated the current state.
    pub fn apply(
        &mut self,
        request: &CommandRequest,
        now: u64,
        allow_member_control: bool,
    ) -> TandemResult<bool> {
        let member_id = request.member_id.as_str();
        if !self.is_member(member_id) {
            return Err(TandemError::NotMember(member_id.to_string()));
        }

        if let Some(version) = request.state_version {
            if version < self.state_version {
                log::debug!(
                    "[Session {}] Rejecting stale {} from {} (v{} < v{})",
                    self.group_id,
                    request.command.name(),
                    member_id,
                    version,
                    self.state_version
                );
                return Err(TandemError::StaleCommand {
                    current: Box::new(self.snapshot()),
                });
            }
            if version > self.state_version {
                return Err(TandemError::InvalidRequest(format!(
                    "unknown state version {} (session is at {})",
                    version, self.state_version
                )));
            }
        }

        self.touch_member(member_id, now);
        let is_host = self.host_member_id == member_id;

        if matches!(request.command, SessionCommand::Reanchor) {
            if !is_host {
                return Err(TandemError::NotHost(member_id.to_string()));
            }
            if self.awaiting_anchor {
                self.awaiting_anchor = false;
                log::info!(
                    "[Session {}] Host {} re-anchored at version {}",
                    self.group_id,
                    member_id,
                    self.state_version
                );
            }
            return Ok(false);
        }

        if is_host && self.awaiting_anchor {
            return Err(TandemError::HostUnavailable(format!(
                "host {} has not re-anchored yet",
                member_id
            )));
        }

        if !is_host {
            let delegated = request.command.is_queue_edit()
                || (allow_member_control && !request.command.is_device_report());
            if !delegated {
                return Err(TandemError::NotHost(member_id.to_string()));
            }
        }

        self.last_activity_at = now;
        let changed = self.transition(&request.command, now)?;
        if changed {
            log::debug!(
                "[Session {}] {} by {} -> {:?} v{}",
                self.group_id,
                request.command.name(),
                member_id,
                self.phase,
                self.state_version
            );
        }
        Ok(changed)
    }

    fn transition(&mut self, command: &SessionCommand, now: u64) -> TandemResult<bool> {
        match command {
            SessionCommand::Play => self.play(now),
            SessionCommand::Pause => self.pause(now),
            SessionCommand::Seek { position_ms } => self.seek(*position_ms, now),
            SessionCommand::TrackEnded => self.track_ended(now),
            SessionCommand::Next => self.next(now),
            SessionCommand::Previous => self.previous(now),
            SessionCommand::SelectIndex { index, play } => self.select_index(*index, *play, now),
            SessionCommand::Enqueue { track } => Ok(self.enqueue(track, now)),
            SessionCommand::RemoveAt { index } => self.remove_at(*index, now),
            SessionCommand::Move { from, to } => self.move_entry(*from, *to, now),
            SessionCommand::Clear => Ok(self.clear(now)),
            SessionCommand::SetRepeat { mode } => Ok(self.set_repeat(*mode, now)),
            SessionCommand::ReportPlaybackError { message } => {
                Ok(self.report_playback_error(message, now))
            }
            SessionCommand::Reanchor => Ok(false),
        }
    }

    /// Re-anchors the position and advances the version.
    fn commit(&mut self, now: u64, position_ms: u64) {
        self.position_ms = position_ms;
        self.last_updated_at = now;
        self.state_version += 1;
    }

    fn require_loaded(&self, action: &str) -> TandemResult<usize> {
        match (self.phase, self.current_index) {
            (PlaybackPhase::Idle, _) | (_, None) => Err(TandemError::InvalidTransition(format!(
                "cannot {} with no track loaded",
                action
            ))),
            (_, Some(index)) => Ok(index),
        }
    }

    fn play(&mut self, now: u64) -> TandemResult<bool> {
        self.require_loaded("play")?;
        if self.is_playing {
            return Ok(false);
        }
        let position = self.effective_position(now);
        self.is_playing = true;
        self.phase = PlaybackPhase::Playing;
        self.commit(now, position);
        Ok(true)
    }

    fn pause(&mut self, now: u64) -> TandemResult<bool> {
        self.require_loaded("pause")?;
        if !self.is_playing {
            return Ok(false);
        }
        let position = self.effective_position(now);
        self.is_playing = false;
        self.phase = PlaybackPhase::Paused;
        self.commit(now, position);
        Ok(true)
    }

    fn seek(&mut self, position_ms: u64, now: u64) -> TandemResult<bool> {
        self.require_loaded("seek")?;
        let resolved = if self.is_playing {
            PlaybackPhase::Playing
        } else {
            PlaybackPhase::Paused
        };
        log::trace!(
            "[Session {}] {:?} -> {:?} -> {:?} at {}ms",
            self.group_id,
            self.phase,
            PlaybackPhase::Seeking,
            resolved,
            position_ms
        );
        self.phase = resolved;
        self.commit(now, position_ms);
        Ok(true)
    }

    fn track_ended(&mut self, now: u64) -> TandemResult<bool> {
        let index = self.require_loaded("advance")?;
        if !self.is_playing {
            return Err(TandemError::InvalidTransition(
                "track end reported while not playing".to_string(),
            ));
        }
        match self.repeat_mode {
            RepeatMode::One => {}
            _ if index + 1 < self.queue.len() => self.current_index = Some(index + 1),
            RepeatMode::All => self.current_index = Some(0),
            RepeatMode::Off => {
                self.is_playing = false;
                self.phase = PlaybackPhase::Loaded;
            }
        }
        self.commit(now, 0);
        Ok(true)
    }

    fn next(&mut self, now: u64) -> TandemResult<bool> {
        let index = self.require_loaded("skip")?;
        let target = if index + 1 < self.queue.len() {
            index + 1
        } else if self.repeat_mode != RepeatMode::Off {
            0
        } else {
            return Err(TandemError::InvalidTransition(
                "already at the last track".to_string(),
            ));
        };
        self.select(target, self.is_playing, now);
        Ok(true)
    }

    fn previous(&mut self, now: u64) -> TandemResult<bool> {
        let index = self.require_loaded("go back")?;
        let target = if index == 0 || self.effective_position(now) > PREVIOUS_RESTART_THRESHOLD_MS
        {
            index
        } else {
            index - 1
        };
        self.select(target, self.is_playing, now);
        Ok(true)
    }

    fn select_index(&mut self, index: usize, play: bool, now: u64) -> TandemResult<bool> {
        if index >= self.queue.len() {
            return Err(TandemError::InvalidRequest(format!(
                "index {} out of range (queue has {} tracks)",
                index,
                self.queue.len()
            )));
        }
        self.select(index, play, now);
        Ok(true)
    }

    fn select(&mut self, index: usize, play: bool, now: u64) {
        self.current_index = Some(index);
        self.is_playing = play;
        self.phase = if play {
            PlaybackPhase::Playing
        } else {
            PlaybackPhase::Loaded
        };
        self.commit(now, 0);
    }

    fn enqueue(&mut self, track: &TrackReference, now: u64) -> bool {
        let identity = resolve(track);
        self.queue.push(identity);
        if self.current_index.is_none() {
            self.current_index = Some(0);
            self.is_playing = false;
            self.phase = PlaybackPhase::Loaded;
            self.commit(now, 0);
        } else {
            let position = self.effective_position(now);
            self.commit(now, position);
        }
        true
    }

    fn remove_at(&mut self, index: usize, now: u64) -> TandemResult<bool> {
        if index >= self.queue.len() {
            return Err(TandemError::InvalidRequest(format!(
                "index {} out of range (queue has {} tracks)",
                index,
                self.queue.len()
            )));
        }
        self.queue.remove(index);

        if self.queue.is_empty() {
            self.reset_to_idle(now);
            return Ok(true);
        }

        let current = self.current_index.unwrap_or(0);
        if index < current {
            self.current_index = Some(current - 1);
            let position = self.effective_position(now);
            self.commit(now, position);
        } else if index == current {
            let replacement = current.min(self.queue.len() - 1);
            self.select(replacement, self.is_playing, now);
        } else {
            let position = self.effective_position(now);
            self.commit(now, position);
        }
        Ok(true)
    }

    fn move_entry(&mut self, from: usize, to: usize, now: u64) -> TandemResult<bool> {
        let len = self.queue.len();
        if from >= len || to >= len {
            return Err(TandemError::InvalidRequest(format!(
                "move {} -> {} out of range (queue has {} tracks)",
                from, to, len
            )));
        }
        if from == to {
            return Ok(false);
        }
        let entry = self.queue.remove(from);
        self.queue.insert(to, entry);

        if let Some(current) = self.current_index {
            self.current_index = Some(if current == from {
                to
            } else if from < current && to >= current {
                current - 1
            } else if from > current && to <= current {
                current + 1
            } else {
                current
            });
        }
        let position = self.effective_position(now);
        self.commit(now, position);
        Ok(true)
    }

    fn clear(&mut self, now: u64) -> bool {
        if self.queue.is_empty() {
            return false;
        }
        self.queue.clear();
        self.reset_to_idle(now);
        true
    }

    fn reset_to_idle(&mut self, now: u64) {
        self.current_index = None;
        self.is_playing = false;
        self.phase = PlaybackPhase::Idle;
        self.commit(now, 0);
    }

    fn set_repeat(&mut self, mode: RepeatMode, now: u64) -> bool {
        if self.repeat_mode == mode {
            return false;
        }
        self.repeat_mode = mode;
        let position = self.effective_position(now);
        self.commit(now, position);
        true
    }

    fn report_playback_error(&mut self, message: &str, now: u64) -> bool {
        if self.phase == PlaybackPhase::Idle
            || (self.phase == PlaybackPhase::Loaded && !self.is_playing)
        {
            return false;
        }
        log::warn!(
            "[Session {}] Host playback failed, degrading to loaded: {}",
            self.group_id,
            message
        );
        let position = self.effective_position(now);
        self.is_playing = false;
        self.phase = PlaybackPhase::Loaded;
        self.commit(now, position);
        true
    }
}
