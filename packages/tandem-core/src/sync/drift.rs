//! Drift detection between the local player and the shared position.

use std::time::Duration;

use tokio::time::Instant;

/// What to do about the local player's position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftDecision {
    /// Within the threshold.
    InSync,
    /// Seek the local player to `target_ms`.
    Correct { target_ms: u64, drift_ms: i64 },
    /// A seek is still settling; the player's position is not trustworthy yet.
    Suppressed,
}

/// Decides when local playback needs a corrective seek.
///
/// Corrections are local only and never produce session commands.
#[derive(Debug, Clone)]
pub struct DriftCorrector {
    threshold_ms: u64,
    seek_grace: Duration,
    last_seek_at: Option<Instant>,
}

impl DriftCorrector {
    pub fn new(threshold_ms: u64, seek_grace_ms: u64) -> Self {
        Self {
            threshold_ms,
            seek_grace: Duration::from_millis(seek_grace_ms),
            last_seek_at: None,
        }
    }

    /// Records a seek issued to the local player.
    pub fn note_seek(&mut self, at: Instant) {
        self.last_seek_at = Some(at);
    }

    /// Forgets seek history (track changed, session left).
    pub fn reset(&mut self) {
        self.last_seek_at = None;
    }

    pub fn seek_in_flight(&self, now: Instant) -> bool {
        self.last_seek_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.seek_grace)
    }

    pub fn evaluate(&self, local_ms: u64, expected_ms: u64, now: Instant) -> DriftDecision {
        if self.seek_in_flight(now) {
            return DriftDecision::Suppressed;
        }
        let drift_ms = local_ms as i64 - expected_ms as i64;
        if drift_ms.unsigned_abs() > self.threshold_ms {
            DriftDecision::Correct {
                target_ms: expected_ms,
                drift_ms,
            }
        } else {
            DriftDecision::InSync
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_drift_is_tolerated() {
        let corrector = DriftCorrector::new(1_500, 3_000);
        let now = Instant::now();
        assert_eq!(corrector.evaluate(10_000, 11_400, now), DriftDecision::InSync);
        assert_eq!(corrector.evaluate(11_500, 10_000, now), DriftDecision::InSync);
    }

    #[test]
    fn large_drift_is_corrected_in_either_direction() {
        let corrector = DriftCorrector::new(1_500, 3_000);
        let now = Instant::now();
        assert_eq!(
            corrector.evaluate(10_000, 12_000, now),
            DriftDecision::Correct {
                target_ms: 12_000,
                drift_ms: -2_000
            }
        );
        assert_eq!(
            corrector.evaluate(14_000, 12_000, now),
            DriftDecision::Correct {
                target_ms: 12_000,
                drift_ms: 2_000
            }
        );
    }

    #[test]
    fn recent_seek_suppresses_correction() {
        let mut corrector = DriftCorrector::new(1_500, 3_000);
        let seeked = Instant::now();
        corrector.note_seek(seeked);

        assert_eq!(
            corrector.evaluate(0, 60_000, seeked + Duration::from_millis(500)),
            DriftDecision::Suppressed
        );
        assert!(matches!(
            corrector.evaluate(0, 60_000, seeked + Duration::from_millis(3_000)),
            DriftDecision::Correct { .. }
        ));

        corrector.note_seek(seeked);
        corrector.reset();
        assert!(!corrector.seek_in_flight(seeked));
    }
}
