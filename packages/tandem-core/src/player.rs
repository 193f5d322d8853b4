//! Control surface of the external local audio player.
//!
//! Decoding, buffering and output are owned by the player implementation.
//! The synchronization engine only needs the handful of operations below.

use async_trait::async_trait;
use thiserror::Error;

use crate::identity::CanonicalTrackIdentity;

/// Errors reported by a local player.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlayerError {
    /// The track could not be loaded (network, decode, unsupported source).
    #[error("Failed to load track: {0}")]
    Load(String),

    /// Playback could not be started or changed.
    #[error("Playback failed: {0}")]
    Playback(String),

    /// The output device is not available.
    #[error("Audio output unavailable")]
    Unavailable,
}

/// Result alias for player operations.
pub type PlayerResult<T> = Result<T, PlayerError>;

/// Trait for controlling a local audio player.
///
/// Implementations may be asynchronous internally. `load` and `play` may
/// fail; the caller decides how the session reacts.
#[async_trait]
pub trait LocalPlayer: Send + Sync {
    /// Loads a track without starting playback.
    async fn load(&self, track: &CanonicalTrackIdentity) -> PlayerResult<()>;

    /// Starts or resumes playback of the loaded track.
    async fn play(&self) -> PlayerResult<()>;

    /// Pauses playback.
    async fn pause(&self);

    /// Seeks within the loaded track.
    async fn seek(&self, position_ms: u64);

    /// Sets output volume; values outside `0.0..=1.0` are clamped.
    async fn set_volume(&self, volume: f32);

    /// Returns whether audio is currently playing.
    fn is_playing(&self) -> bool;

    /// Returns the current position within the loaded track.
    fn position_ms(&self) -> u64;

    /// Returns the duration of the loaded track, if known.
    fn duration_ms(&self) -> Option<u64>;
}
