//! Local audio arbitration.
//!
//! A client has one physical output but two sources that want it: the shared
//! session stream and short previews (a sample of a search result, say). At
//! most one of them owns the output. Starting a preview pauses the shared
//! stream and remembers whether it was playing; ending the preview resumes it
//! only in that case.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::TandemResult;
use crate::identity::CanonicalTrackIdentity;
use crate::player::LocalPlayer;

/// Which source currently owns the local output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioOwner {
    SharedSession,
    Preview,
    #[default]
    None,
}

/// Per-client arbitration state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalPlaybackArbitrationState {
    pub owner: AudioOwner,
    /// The shared stream was playing when the current preview took over.
    pub was_playing: bool,
    pub active_preview: Option<String>,
}

/// Mediates between the shared session player and the preview player.
pub struct LocalAudioArbiter {
    shared: Arc<dyn LocalPlayer>,
    preview: Arc<dyn LocalPlayer>,
    state: Mutex<LocalPlaybackArbitrationState>,
}

impl LocalAudioArbiter {
    pub fn new(shared: Arc<dyn LocalPlayer>, preview: Arc<dyn LocalPlayer>) -> Self {
        Self {
            shared,
            preview,
            state: Mutex::new(LocalPlaybackArbitrationState::default()),
        }
    }

    pub async fn state(&self) -> LocalPlaybackArbitrationState {
        self.state.lock().await.clone()
    }

    /// Starts a preview, taking the output from the shared stream.
    ///
    /// A preview already playing is stopped outright; the shared stream's
    /// `was_playing` from before the first preview carries over. If the new
    /// preview fails to load or play, preview state is cleared and the shared
    /// stream resumes if it was the one paused.
    pub async fn start_preview(
        &self,
        preview_id: &str,
        track: &CanonicalTrackIdentity,
    ) -> TandemResult<()> {
        let mut state = self.state.lock().await;
        self.start_preview_locked(&mut state, preview_id, track).await
    }

    /// Starts `preview_id`, or ends it if it is the active preview.
    ///
    /// Returns true if a preview is playing afterwards.
    pub async fn toggle_preview(
        &self,
        preview_id: &str,
        track: &CanonicalTrackIdentity,
    ) -> TandemResult<bool> {
        let mut state = self.state.lock().await;
        if state.active_preview.as_deref() == Some(preview_id) {
            self.end_preview_locked(&mut state).await?;
            Ok(false)
        } else {
            self.start_preview_locked(&mut state, preview_id, track)
                .await?;
            Ok(true)
        }
    }

    /// Ends the active preview (explicit stop or natural end).
    pub async fn end_preview(&self) -> TandemResult<()> {
        let mut state = self.state.lock().await;
        self.end_preview_locked(&mut state).await
    }

    /// Plays the shared stream, or defers until the preview ends.
    ///
    /// Returns false if deferred.
    pub async fn request_shared_play(&self) -> TandemResult<bool> {
        let mut state = self.state.lock().await;
        if state.owner == AudioOwner::Preview {
            state.was_playing = true;
            return Ok(false);
        }
        if !self.shared.is_playing() {
            self.shared.play().await?;
        }
        state.owner = AudioOwner::SharedSession;
        Ok(true)
    }

    /// Pauses the shared stream; while previewing, cancels a deferred resume.
    pub async fn request_shared_pause(&self) {
        let mut state = self.state.lock().await;
        if state.owner == AudioOwner::Preview {
            state.was_playing = false;
            return;
        }
        if self.shared.is_playing() {
            self.shared.pause().await;
        }
        state.owner = AudioOwner::None;
    }

    /// Stops everything without resuming anything (leave, teardown).
    pub async fn release(&self) {
        let mut state = self.state.lock().await;
        if state.owner == AudioOwner::Preview {
            self.preview.pause().await;
        }
        if self.shared.is_playing() {
            self.shared.pause().await;
        }
        *state = LocalPlaybackArbitrationState::default();
        log::debug!("[Arbiter] Released local output");
    }

    async fn start_preview_locked(
        &self,
        state: &mut LocalPlaybackArbitrationState,
        preview_id: &str,
        track: &CanonicalTrackIdentity,
    ) -> TandemResult<()> {
        if state.owner == AudioOwner::Preview {
            log::debug!(
                "[Arbiter] Replacing preview {:?} with {}",
                state.active_preview,
                preview_id
            );
            self.preview.pause().await;
        } else {
            state.was_playing = self.shared.is_playing();
            if state.was_playing {
                self.shared.pause().await;
            }
        }
        state.owner = AudioOwner::Preview;
        state.active_preview = Some(preview_id.to_string());

        let started = match self.preview.load(track).await {
            Ok(()) => self.preview.play().await,
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            log::warn!("[Arbiter] Preview {} failed: {}", preview_id, e);
            if let Err(resume) = self.finish_preview(state).await {
                log::warn!("[Arbiter] Shared stream did not resume: {}", resume);
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn end_preview_locked(&self, state: &mut LocalPlaybackArbitrationState) -> TandemResult<()> {
        if state.owner != AudioOwner::Preview {
            return Ok(());
        }
        self.preview.pause().await;
        self.finish_preview(state).await
    }

    /// Clears preview state and hands the output back.
    async fn finish_preview(&self, state: &mut LocalPlaybackArbitrationState) -> TandemResult<()> {
        state.active_preview = None;
        state.owner = AudioOwner::None;
        if std::mem::take(&mut state.was_playing) {
            self.shared.play().await?;
            state.owner = AudioOwner::SharedSession;
        }
        Ok(())
    }
}
