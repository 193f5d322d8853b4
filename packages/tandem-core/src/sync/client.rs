//! Member-side synchronization client.
//!
//! Responsibilities:
//! - Discovery polling for the "sessions nearby" indicator
//! - Creating, joining and leaving sessions
//! - Pulling snapshots at a role-dependent interval
//! - Submitting commands and applying the confirmed snapshot
//! - Reconciling the local player with the applied snapshot (track, play
//!   state, drift)
//! - Re-anchoring after being promoted to host
//! - Reporting the end of a track when hosting, so the session advances
//!
//! Snapshot application and command submission are serialized behind one
//! async mutex, so the view never moves backwards mid-reconcile.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::arbitration::LocalAudioArbiter;
use crate::error::{TandemError, TandemResult};
use crate::events::{EventEmitter, SyncEvent};
use crate::identity::CanonicalTrackIdentity;
use crate::player::LocalPlayer;
use crate::runtime::TaskSpawner;
use crate::session::{CommandRequest, SessionCommand, SessionSnapshot};
use crate::state::SyncConfig;
use crate::utils::now_millis;

use super::drift::{DriftCorrector, DriftDecision};
use super::member_view::{ApplyOutcome, MemberView};
use super::transport::SessionTransport;

/// Mutable client state guarded by the apply/submit mutex.
struct ClientState {
    view: Option<MemberView>,
    drift: DriftCorrector,
    /// Queue position and identity currently loaded into the local player.
    loaded: Option<(usize, CanonicalTrackIdentity)>,
}

/// Keeps one member's local player in step with a shared session.
pub struct SyncClient {
    member_id: String,
    transport: Arc<dyn SessionTransport>,
    player: Arc<dyn LocalPlayer>,
    arbiter: Arc<LocalAudioArbiter>,
    emitter: Arc<dyn EventEmitter>,
    config: SyncConfig,
    state: Mutex<ClientState>,
    authenticated: AtomicBool,
    is_host: AtomicBool,
    discovered: SyncMutex<Option<usize>>,
    /// Root of every background task owned by this client.
    cancel_token: CancellationToken,
    /// Child token of the active session's sync loop.
    session_token: SyncMutex<Option<CancellationToken>>,
}

impl SyncClient {
    pub fn new(
        member_id: &str,
        transport: Arc<dyn SessionTransport>,
        player: Arc<dyn LocalPlayer>,
        arbiter: Arc<LocalAudioArbiter>,
        emitter: Arc<dyn EventEmitter>,
        config: SyncConfig,
    ) -> Self {
        let drift = DriftCorrector::new(config.drift_threshold_ms, config.seek_grace_ms);
        Self {
            member_id: member_id.to_string(),
            transport,
            player,
            arbiter,
            emitter,
            config,
            state: Mutex::new(ClientState {
                view: None,
                drift,
                loaded: None,
            }),
            authenticated: AtomicBool::new(false),
            is_host: AtomicBool::new(false),
            discovered: SyncMutex::new(None),
            cancel_token: CancellationToken::new(),
            session_token: SyncMutex::new(None),
        }
    }

    pub fn member_id(&self) -> &str {
        &self.member_id
    }

    /// Background loops skip their cycles while signed out.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    /// Whether the last applied snapshot names this member as host.
    pub fn is_host(&self) -> bool {
        self.is_host.load(Ordering::SeqCst)
    }

    /// Last session count seen by discovery; `None` until the first success.
    pub fn discovered_sessions(&self) -> Option<usize> {
        *self.discovered.lock()
    }

    /// Group of the current session, if any.
    pub async fn group_id(&self) -> Option<String> {
        let state = self.state.lock().await;
        state.view.as_ref().map(|v| v.group_id().to_string())
    }

    /// Last applied snapshot, if in a session.
    pub async fn snapshot(&self) -> Option<SessionSnapshot> {
        let state = self.state.lock().await;
        state.view.as_ref().and_then(|v| v.snapshot().cloned())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Starts discovery polling.
    pub fn start<S: TaskSpawner>(self: &Arc<Self>, spawner: &S) {
        let client = Arc::clone(self);
        let token = self.cancel_token.child_token();
        spawner.spawn(async move { client.discovery_loop(token).await });
    }

    /// Creates a session hosted by this member and starts following it.
    pub async fn create_session<S: TaskSpawner>(
        self: &Arc<Self>,
        spawner: &S,
    ) -> TandemResult<SessionSnapshot> {
        self.leave_session().await?;
        let snapshot = self
            .bounded("create", self.transport.create(&self.member_id))
            .await?;
        self.enter_session(snapshot, spawner).await
    }

    /// Joins an existing session and starts following it.
    pub async fn join_session<S: TaskSpawner>(
        self: &Arc<Self>,
        group_id: &str,
        spawner: &S,
    ) -> TandemResult<SessionSnapshot> {
        if self.group_id().await.as_deref() == Some(group_id) {
            return self.snapshot().await.ok_or_else(|| {
                TandemError::Internal("joined session without a snapshot".to_string())
            });
        }
        self.leave_session().await?;
        let snapshot = self
            .bounded("join", self.transport.join(group_id, &self.member_id))
            .await?;
        self.enter_session(snapshot, spawner).await
    }

    /// Leaves the current session. A no-op when not in one.
    ///
    /// Stops the sync loop and releases the local output without resuming
    /// anything. An authority that already forgot the session is not an error.
    pub async fn leave_session(&self) -> TandemResult<()> {
        self.stop_sync_loop();
        let mut state = self.state.lock().await;
        let Some(view) = state.view.take() else {
            return Ok(());
        };
        self.reset_local(&mut state).await;

        let group_id = view.group_id().to_string();
        log::info!("[SyncClient] Leaving {}", group_id);
        match self
            .bounded("leave", self.transport.leave(&group_id, &self.member_id))
            .await
        {
            Ok(()) | Err(TandemError::SessionNotFound(_)) | Err(TandemError::NotMember(_)) => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Stops every background task and leaves the current session.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        if let Err(e) = self.leave_session().await {
            log::warn!("[SyncClient] Leave during shutdown failed: {}", e);
        }
    }

    async fn enter_session<S: TaskSpawner>(
        self: &Arc<Self>,
        snapshot: SessionSnapshot,
        spawner: &S,
    ) -> TandemResult<SessionSnapshot> {
        {
            let mut state = self.state.lock().await;
            log::info!(
                "[SyncClient] Entered {} at v{} (host {})",
                snapshot.group_id,
                snapshot.state_version,
                snapshot.host_member_id
            );
            state.view = Some(MemberView::new(&snapshot.group_id, &self.member_id));
            self.handle_snapshot(&mut state, snapshot.clone()).await;
        }

        let token = self.cancel_token.child_token();
        *self.session_token.lock() = Some(token.clone());
        let client = Arc::clone(self);
        spawner.spawn(async move { client.sync_loop(token).await });
        Ok(snapshot)
    }

    fn stop_sync_loop(&self) {
        if let Some(token) = self.session_token.lock().take() {
            token.cancel();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Commands
    // ─────────────────────────────────────────────────────────────────────────

    /// Submits a command and applies the confirmed snapshot.
    ///
    /// A stale command resynchronizes the view to the authority's snapshot
    /// and is still reported to the caller.
    pub async fn submit(&self, command: SessionCommand) -> TandemResult<SessionSnapshot> {
        let mut state = self.state.lock().await;
        let (group_id, base_version) = match state.view.as_ref() {
            Some(view) => (view.group_id().to_string(), view.applied_version()),
            None => {
                return Err(TandemError::InvalidRequest(
                    "not in a session".to_string(),
                ))
            }
        };

        let request = CommandRequest {
            member_id: self.member_id.clone(),
            state_version: base_version,
            command,
        };
        match self
            .bounded("submit", self.transport.submit(&group_id, &request))
            .await
        {
            Ok(snapshot) => {
                self.handle_snapshot(&mut state, snapshot.clone()).await;
                Ok(snapshot)
            }
            Err(TandemError::StaleCommand { current }) => {
                log::debug!(
                    "[SyncClient] {} was stale, resyncing to v{}",
                    request.command.name(),
                    current.state_version
                );
                self.handle_snapshot(&mut state, (*current).clone()).await;
                Err(TandemError::StaleCommand { current })
            }
            Err(e @ (TandemError::SessionNotFound(_) | TandemError::NotMember(_))) => {
                self.lose_session(&mut state).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Background loops
    // ─────────────────────────────────────────────────────────────────────────

    async fn discovery_loop(self: Arc<Self>, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.discovery_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    log::debug!("[SyncClient] Discovery loop stopped");
                    break;
                }
                _ = interval.tick() => self.discover_once().await,
            }
        }
    }

    /// One discovery poll. Failures leave the indicator unchanged.
    pub async fn discover_once(&self) {
        if !self.is_authenticated() {
            return;
        }
        match self.bounded("discover", self.transport.discover()).await {
            Ok(count) => {
                let changed = self.discovered.lock().replace(count) != Some(count);
                if changed {
                    self.emitter.emit_sync(SyncEvent::DiscoveryUpdated {
                        session_count: count,
                        timestamp: now_millis(),
                    });
                }
            }
            Err(e) => log::debug!("[SyncClient] Discovery failed: {}", e),
        }
    }

    async fn sync_loop(self: Arc<Self>, token: CancellationToken) {
        loop {
            let interval = self.config.sync_interval(self.is_host());
            tokio::select! {
                _ = token.cancelled() => {
                    log::debug!("[SyncClient] Sync loop stopped");
                    break;
                }
                _ = tokio::time::sleep(interval) => self.sync_once().await,
            }
        }
    }

    /// One pull-and-reconcile cycle.
    pub async fn sync_once(&self) {
        if !self.is_authenticated() {
            return;
        }
        let mut state = self.state.lock().await;
        let Some(group_id) = state.view.as_ref().map(|v| v.group_id().to_string()) else {
            return;
        };

        match self
            .bounded(
                "snapshot",
                self.transport.fetch_snapshot(&group_id, &self.member_id),
            )
            .await
        {
            Ok(snapshot) => self.handle_snapshot(&mut state, snapshot).await,
            Err(TandemError::SessionNotFound(_)) | Err(TandemError::NotMember(_)) => {
                self.lose_session(&mut state).await;
            }
            Err(e) if e.is_transient() => {
                log::debug!("[SyncClient] No update this cycle: {}", e);
            }
            Err(e) => log::warn!("[SyncClient] Snapshot pull failed: {}", e),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reconciliation
    // ─────────────────────────────────────────────────────────────────────────

    /// Offers a snapshot to the view and brings the player in line.
    ///
    /// When the host's player has finished the current track, the advance is
    /// reported and the confirmed snapshot is applied in the same pass.
    async fn handle_snapshot(&self, state: &mut ClientState, snapshot: SessionSnapshot) {
        let mut next = Some(snapshot);
        let mut advanced = false;

        while let Some(snapshot) = next.take() {
            let Some(view) = state.view.as_mut() else {
                return;
            };
            let outcome = view.offer(snapshot.clone());
            if outcome == ApplyOutcome::Stale {
                return;
            }
            self.is_host
                .store(snapshot.is_host(&self.member_id), Ordering::SeqCst);

            if !advanced && self.track_finished(state, &snapshot) {
                advanced = true;
                next = self.report_track_end(state, &snapshot).await;
                continue;
            }

            match outcome {
                ApplyOutcome::Applied => {
                    self.emitter.emit_sync(SyncEvent::SnapshotApplied {
                        group_id: snapshot.group_id.clone(),
                        state_version: snapshot.state_version,
                        timestamp: now_millis(),
                    });
                    self.reconcile(state, &snapshot).await;
                }
                ApplyOutcome::Duplicate => self.correct_drift(state, &snapshot).await,
                ApplyOutcome::Stale => {}
            }

            if snapshot.awaiting_anchor && snapshot.is_host(&self.member_id) {
                self.reanchor(state, &snapshot).await;
            }
        }
    }

    /// Whether the host's player stopped at the end of the shared track.
    ///
    /// The session must also place playback near the end, so a seek away from
    /// a finished track is reconciled instead of reported as an advance.
    fn track_finished(&self, state: &ClientState, snapshot: &SessionSnapshot) -> bool {
        if !snapshot.is_host(&self.member_id) || snapshot.awaiting_anchor || !snapshot.is_playing
        {
            return false;
        }
        let Some((index, track)) = state.loaded.as_ref() else {
            return false;
        };
        if snapshot.current_index != Some(*index) || snapshot.current_track() != Some(track) {
            return false;
        }
        if self.player.is_playing() {
            return false;
        }
        let Some(duration) = self.player.duration_ms().filter(|d| *d > 0) else {
            return false;
        };
        let expected = snapshot.effective_position_ms(now_millis(), Some(duration));
        self.player.position_ms() >= duration
            && expected.saturating_add(self.config.drift_threshold_ms) >= duration
    }

    /// Submits `TrackEnded` and returns the snapshot to apply next.
    async fn report_track_end(
        &self,
        state: &mut ClientState,
        snapshot: &SessionSnapshot,
    ) -> Option<SessionSnapshot> {
        log::info!(
            "[SyncClient] Track {:?} finished in {}, advancing",
            snapshot.current_index,
            snapshot.group_id
        );
        // Repeat may select the same track again; it has to be reloaded.
        state.loaded = None;
        state.drift.reset();

        let request = CommandRequest {
            member_id: self.member_id.clone(),
            state_version: Some(snapshot.state_version),
            command: SessionCommand::TrackEnded,
        };
        match self
            .bounded("advance", self.transport.submit(&snapshot.group_id, &request))
            .await
        {
            Ok(advanced) => Some(advanced),
            Err(TandemError::StaleCommand { current }) => Some(*current),
            Err(e) => {
                log::warn!("[SyncClient] Could not report track end: {}", e);
                None
            }
        }
    }

    async fn reconcile(&self, state: &mut ClientState, snapshot: &SessionSnapshot) {
        let desired = snapshot
            .current_index
            .zip(snapshot.current_track().cloned());

        let Some((index, track)) = desired else {
            state.loaded = None;
            state.drift.reset();
            self.arbiter.request_shared_pause().await;
            return;
        };

        if state.loaded.as_ref() != Some(&(index, track.clone())) {
            log::info!("[SyncClient] Loading {} (index {})", track, index);
            if let Err(e) = self.player.load(&track).await {
                state.loaded = None;
                self.device_error(state, snapshot, e.to_string()).await;
                return;
            }
            state.loaded = Some((index, track));
            state.drift.reset();

            let expected = snapshot.effective_position_ms(now_millis(), self.player.duration_ms());
            if expected > 0 {
                self.player.seek(expected).await;
                state.drift.note_seek(Instant::now());
            }
        }

        if snapshot.is_playing {
            if let Err(e) = self.arbiter.request_shared_play().await {
                self.device_error(state, snapshot, e.to_string()).await;
                return;
            }
        } else {
            self.arbiter.request_shared_pause().await;
        }
        self.correct_drift(state, snapshot).await;
    }

    /// Seeks the local player back onto the shared position when it drifted.
    ///
    /// Never emits session state. The seek completes under the state lock so
    /// a later reconcile cannot load another track underneath it.
    async fn correct_drift(&self, state: &mut ClientState, snapshot: &SessionSnapshot) {
        let Some((index, _)) = state.loaded.as_ref() else {
            return;
        };
        if snapshot.current_index != Some(*index) {
            return;
        }

        let expected = snapshot.effective_position_ms(now_millis(), self.player.duration_ms());
        let now = Instant::now();
        if let DriftDecision::Correct {
            target_ms,
            drift_ms,
        } = state.drift.evaluate(self.player.position_ms(), expected, now)
        {
            log::debug!(
                "[SyncClient] Drift {}ms, seeking to {}ms",
                drift_ms,
                target_ms
            );
            self.player.seek(target_ms).await;
            state.drift.note_seek(Instant::now());
            self.emitter.emit_sync(SyncEvent::DriftCorrected {
                group_id: snapshot.group_id.clone(),
                drift_ms,
                target_ms,
                timestamp: now_millis(),
            });
        }
    }

    /// Surfaces a local player failure; the host also degrades the session.
    async fn device_error(
        &self,
        state: &mut ClientState,
        snapshot: &SessionSnapshot,
        message: String,
    ) {
        log::warn!("[SyncClient] Player error in {}: {}", snapshot.group_id, message);
        self.emitter.emit_sync(SyncEvent::PlaybackDeviceError {
            group_id: Some(snapshot.group_id.clone()),
            message: message.clone(),
            timestamp: now_millis(),
        });

        if !snapshot.is_host(&self.member_id) || !snapshot.is_playing {
            return;
        }
        let request = CommandRequest {
            member_id: self.member_id.clone(),
            state_version: Some(snapshot.state_version),
            command: SessionCommand::ReportPlaybackError { message },
        };
        match self
            .bounded("report", self.transport.submit(&snapshot.group_id, &request))
            .await
        {
            Ok(degraded) => {
                if let Some(view) = state.view.as_mut() {
                    view.offer(degraded);
                }
            }
            Err(e) => log::warn!("[SyncClient] Could not report player error: {}", e),
        }
    }

    /// Confirms a promotion so the session accepts commands from us again.
    async fn reanchor(&self, state: &mut ClientState, snapshot: &SessionSnapshot) {
        log::info!(
            "[SyncClient] Promoted to host of {}, re-anchoring at v{}",
            snapshot.group_id,
            snapshot.state_version
        );
        let request = CommandRequest {
            member_id: self.member_id.clone(),
            state_version: Some(snapshot.state_version),
            command: SessionCommand::Reanchor,
        };
        match self
            .bounded("reanchor", self.transport.submit(&snapshot.group_id, &request))
            .await
        {
            Ok(anchored) => {
                self.emitter.emit_sync(SyncEvent::HostPromoted {
                    group_id: snapshot.group_id.clone(),
                    member_id: self.member_id.clone(),
                    timestamp: now_millis(),
                });
                if let Some(view) = state.view.as_mut() {
                    view.offer(anchored);
                }
            }
            Err(e) => log::debug!("[SyncClient] Re-anchor failed, retrying next cycle: {}", e),
        }
    }

    async fn lose_session(&self, state: &mut ClientState) {
        self.stop_sync_loop();
        let Some(view) = state.view.take() else {
            return;
        };
        log::warn!("[SyncClient] Session {} ended", view.group_id());
        self.reset_local(state).await;
        self.emitter.emit_sync(SyncEvent::SessionLost {
            group_id: view.group_id().to_string(),
            timestamp: now_millis(),
        });
    }

    async fn reset_local(&self, state: &mut ClientState) {
        state.loaded = None;
        state.drift.reset();
        self.is_host.store(false, Ordering::SeqCst);
        self.arbiter.release().await;
    }

    /// Bounds a call to the authority by the advisory network timeout.
    async fn bounded<T, F>(&self, what: &str, call: F) -> TandemResult<T>
    where
        F: Future<Output = TandemResult<T>>,
    {
        let timeout = self.config.network_timeout();
        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(TandemError::NetworkTimeout(format!(
                "{} exceeded {}ms",
                what,
                timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::events::{NoopEventEmitter, RecordingEventEmitter};
    use crate::identity::{RawId, TrackReference};
    use crate::player::testing::FakePlayer;
    use crate::runtime::TokioSpawner;
    use crate::services::SessionRegistry;
    use crate::session::PlaybackPhase;
    use crate::state::SessionConfig;
    use crate::sync::InProcessTransport;

    struct Member {
        client: Arc<SyncClient>,
        player: Arc<FakePlayer>,
        preview: Arc<FakePlayer>,
        arbiter: Arc<LocalAudioArbiter>,
        events: Arc<RecordingEventEmitter>,
    }

    fn member(id: &str, transport: Arc<dyn SessionTransport>) -> Member {
        let player = Arc::new(FakePlayer::new());
        let preview = Arc::new(FakePlayer::new());
        let arbiter = Arc::new(LocalAudioArbiter::new(player.clone(), preview.clone()));
        let events = Arc::new(RecordingEventEmitter::default());
        let client = Arc::new(SyncClient::new(
            id,
            transport,
            player.clone(),
            arbiter.clone(),
            events.clone(),
            SyncConfig::default(),
        ));
        client.set_authenticated(true);
        Member {
            client,
            player,
            preview,
            arbiter,
            events,
        }
    }

    fn authority() -> (Arc<SessionRegistry>, Arc<dyn SessionTransport>) {
        let registry = Arc::new(SessionRegistry::new(
            SessionConfig::default(),
            Arc::new(NoopEventEmitter),
        ));
        let transport = Arc::new(InProcessTransport::new(Arc::clone(&registry)));
        (registry, transport)
    }

    fn tidal(id: u64) -> SessionCommand {
        SessionCommand::Enqueue {
            track: TrackReference {
                tidal_track_id: Some(RawId::from(id)),
                ..Default::default()
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn follower_converges_on_host_state() {
        let (_, transport) = authority();
        let spawner = TokioSpawner::current();
        let host = member("host", transport.clone());
        let guest = member("guest", transport);

        let group = host.client.create_session(&spawner).await.unwrap().group_id;
        guest.client.join_session(&group, &spawner).await.unwrap();
        assert!(host.client.is_host());
        assert!(!guest.client.is_host());

        host.client.submit(tidal(42)).await.unwrap();
        assert_eq!(
            host.player.loaded_track().unwrap().provider_track_id(),
            "42"
        );
        let confirmed = host.client.submit(SessionCommand::Play).await.unwrap();
        assert_eq!(confirmed.phase, PlaybackPhase::Playing);
        assert!(host.player.is_playing());

        guest.client.sync_once().await;
        assert_eq!(
            guest.player.loaded_track().unwrap().provider_track_id(),
            "42"
        );
        assert!(guest.player.is_playing());
        assert_eq!(
            guest.client.snapshot().await.unwrap().state_version,
            confirmed.state_version
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stale_submit_resyncs_and_reports() {
        let (_, transport) = authority();
        let spawner = TokioSpawner::current();
        let host = member("host", transport.clone());
        let guest = member("guest", transport);

        let group = host.client.create_session(&spawner).await.unwrap().group_id;
        guest.client.join_session(&group, &spawner).await.unwrap();
        host.client.submit(tidal(1)).await.unwrap();

        let err = guest.client.submit(tidal(2)).await.unwrap_err();
        assert!(matches!(err, TandemError::StaleCommand { .. }));
        assert_eq!(guest.client.snapshot().await.unwrap().state_version, 1);
        assert!(guest.player.loaded_track().is_some());

        // Now based on the current version, the edit goes through.
        let snapshot = guest.client.submit(tidal(2)).await.unwrap();
        assert_eq!(snapshot.queue.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drift_beyond_threshold_is_corrected() {
        let (_, transport) = authority();
        let spawner = TokioSpawner::current();
        let host = member("host", transport);

        host.client.create_session(&spawner).await.unwrap();
        host.client.submit(tidal(7)).await.unwrap();
        host.client.submit(SessionCommand::Play).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        host.player.set_position(90_000);
        host.client.sync_once().await;

        assert!(host.player.position_ms() < 90_000);
        assert_eq!(host.player.seeks.lock().last(), Some(&host.player.position_ms()));
        assert!(host
            .events
            .sync_types()
            .contains(&"driftCorrected".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn host_advances_when_player_finishes_track() {
        let (registry, transport) = authority();
        let spawner = TokioSpawner::current();
        let host = member("host", transport);

        let group = host.client.create_session(&spawner).await.unwrap().group_id;
        host.client.submit(tidal(1)).await.unwrap();
        host.client.submit(tidal(2)).await.unwrap();
        let playing = host.client.submit(SessionCommand::Play).await.unwrap();

        *host.player.duration.lock() = Some(1_000);
        host.player.set_position(1_000);
        host.player.playing.store(false, Ordering::SeqCst);
        host.client.sync_once().await;

        let snapshot = registry.snapshot(&group, None).unwrap();
        assert_eq!(snapshot.current_index, Some(1));
        assert!(snapshot.is_playing);
        assert_eq!(snapshot.state_version, playing.state_version + 1);
        assert_eq!(
            host.player.loaded_track().and_then(|t| t.tidal_numeric_id()),
            Some(2)
        );
        assert!(host.player.is_playing());

        // The new track is underway; further pulls must not advance again.
        host.client.sync_once().await;
        assert_eq!(registry.snapshot(&group, None).unwrap().current_index, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn follower_never_reports_track_end() {
        let (registry, transport) = authority();
        let spawner = TokioSpawner::current();
        let host = member("host", transport.clone());
        let guest = member("guest", transport);

        let group = host.client.create_session(&spawner).await.unwrap().group_id;
        host.client.submit(tidal(1)).await.unwrap();
        host.client.submit(tidal(2)).await.unwrap();
        host.client.submit(SessionCommand::Play).await.unwrap();
        guest.client.join_session(&group, &spawner).await.unwrap();

        *guest.player.duration.lock() = Some(1_000);
        guest.player.set_position(1_000);
        guest.player.playing.store(false, Ordering::SeqCst);
        guest.client.sync_once().await;

        assert_eq!(registry.snapshot(&group, None).unwrap().current_index, Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_snapshot_leaves_role_unchanged() {
        let (registry, transport) = authority();
        let spawner = TokioSpawner::current();
        let host = member("host", transport);

        let group = host.client.create_session(&spawner).await.unwrap().group_id;
        host.client.submit(tidal(1)).await.unwrap();
        assert!(host.client.is_host());

        let mut old = registry.snapshot(&group, None).unwrap();
        old.state_version = 0;
        old.host_member_id = "someone-else".to_string();
        {
            let mut state = host.client.state.lock().await;
            host.client.handle_snapshot(&mut state, old).await;
        }
        assert!(host.client.is_host());
    }

    #[tokio::test(start_paused = true)]
    async fn promoted_member_reanchors() {
        let (registry, transport) = authority();
        let spawner = TokioSpawner::current();
        let host = member("host", transport.clone());
        let guest = member("guest", transport);

        let group = host.client.create_session(&spawner).await.unwrap().group_id;
        guest.client.join_session(&group, &spawner).await.unwrap();
        host.client.leave_session().await.unwrap();

        guest.client.sync_once().await;
        assert!(guest.client.is_host());
        let snapshot = registry.snapshot(&group, None).unwrap();
        assert_eq!(snapshot.host_member_id, "guest");
        assert!(!snapshot.awaiting_anchor);
        assert!(guest
            .events
            .sync_types()
            .contains(&"hostPromoted".to_string()));

        guest.client.submit(tidal(3)).await.unwrap();
        guest.client.submit(SessionCommand::Play).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn torn_down_session_is_reported_lost() {
        let (registry, transport) = authority();
        let spawner = TokioSpawner::current();
        let host = member("host", transport.clone());
        let guest = member("guest", transport);

        let group = host.client.create_session(&spawner).await.unwrap().group_id;
        guest.client.join_session(&group, &spawner).await.unwrap();
        registry.leave(&group, "guest").unwrap();
        registry.leave(&group, "host").unwrap();

        guest.client.sync_once().await;
        assert_eq!(guest.client.group_id().await, None);
        assert_eq!(guest.events.sync_types().last().unwrap(), "sessionLost");
    }

    #[tokio::test(start_paused = true)]
    async fn host_reports_player_failure() {
        let (registry, transport) = authority();
        let spawner = TokioSpawner::current();
        let host = member("host", transport);

        let group = host.client.create_session(&spawner).await.unwrap().group_id;
        host.client.submit(tidal(9)).await.unwrap();
        host.player.fail_play.store(true, Ordering::SeqCst);
        host.client.submit(SessionCommand::Play).await.unwrap();

        let snapshot = registry.snapshot(&group, None).unwrap();
        assert_eq!(snapshot.phase, PlaybackPhase::Loaded);
        assert!(!snapshot.is_playing);
        assert!(host
            .events
            .sync_types()
            .contains(&"playbackDeviceError".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_releases_output_without_resume() {
        let (registry, transport) = authority();
        let spawner = TokioSpawner::current();
        let host = member("host", transport);

        let group = host.client.create_session(&spawner).await.unwrap().group_id;
        host.client.submit(tidal(5)).await.unwrap();
        host.client.submit(SessionCommand::Play).await.unwrap();

        let clip = host.player.loaded_track().unwrap();
        host.arbiter.start_preview("clip", &clip).await.unwrap();
        assert!(!host.player.is_playing());

        host.client.leave_session().await.unwrap();
        assert!(!host.player.is_playing());
        assert!(!host.preview.is_playing());
        assert!(matches!(
            registry.snapshot(&group, None),
            Err(TandemError::SessionNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn discovery_polls_only_while_authenticated() {
        let (registry, transport) = authority();
        let spawner = TokioSpawner::current();
        let watcher = member("watcher", transport);

        watcher.client.start(&spawner);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(watcher.client.discovered_sessions(), Some(0));

        registry.create("a").unwrap();
        registry.create("b").unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(watcher.client.discovered_sessions(), Some(2));

        watcher.client.set_authenticated(false);
        registry.create("c").unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(watcher.client.discovered_sessions(), Some(2));

        watcher.client.shutdown().await;
    }

    struct HangingTransport;

    #[async_trait]
    impl SessionTransport for HangingTransport {
        async fn discover(&self) -> TandemResult<usize> {
            std::future::pending().await
        }
        async fn create(&self, _member_id: &str) -> TandemResult<SessionSnapshot> {
            std::future::pending().await
        }
        async fn join(&self, _group_id: &str, _member_id: &str) -> TandemResult<SessionSnapshot> {
            std::future::pending().await
        }
        async fn leave(&self, _group_id: &str, _member_id: &str) -> TandemResult<()> {
            std::future::pending().await
        }
        async fn fetch_snapshot(
            &self,
            _group_id: &str,
            _member_id: &str,
        ) -> TandemResult<SessionSnapshot> {
            std::future::pending().await
        }
        async fn submit(
            &self,
            _group_id: &str,
            _request: &CommandRequest,
        ) -> TandemResult<SessionSnapshot> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_authority_times_out() {
        let watcher = member("watcher", Arc::new(HangingTransport));
        let spawner = TokioSpawner::current();

        let err = watcher.client.create_session(&spawner).await.unwrap_err();
        assert!(matches!(err, TandemError::NetworkTimeout(_)));

        watcher.client.discover_once().await;
        assert_eq!(watcher.client.discovered_sessions(), None);
    }
}
