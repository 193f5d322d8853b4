//! Background membership liveness sweep.
//!
//! Periodically asks the [`SessionRegistry`] to evict members whose liveness
//! signals stopped and to tear down empty or idle sessions.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::runtime::TaskSpawner;
use crate::services::session_registry::SessionRegistry;
use crate::utils::now_millis;

/// Runs [`SessionRegistry::sweep`] on a fixed interval until cancelled.
pub struct LivenessMonitor {
    registry: Arc<SessionRegistry>,
    interval: Duration,
    cancel_token: CancellationToken,
}

impl LivenessMonitor {
    pub fn new(
        registry: Arc<SessionRegistry>,
        interval: Duration,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            registry,
            interval,
            cancel_token,
        }
    }

    /// Spawns the sweep loop.
    pub fn start<S: TaskSpawner>(self: Arc<Self>, spawner: &S) {
        spawner.spawn(async move { self.run().await });
    }

    /// Sweeps until the cancellation token fires.
    pub async fn run(self: Arc<Self>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; nothing can have lapsed yet.
        interval.tick().await;

        log::info!(
            "[LivenessMonitor] Sweeping every {}ms",
            self.interval.as_millis()
        );

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    log::info!("[LivenessMonitor] Shutting down sweep loop");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.registry.sweep(now_millis());
                    if !report.is_empty() {
                        log::info!(
                            "[LivenessMonitor] Evicted {} member(s), ended {} session(s)",
                            report.evicted_members,
                            report.ended_sessions
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventEmitter;
    use crate::state::SessionConfig;

    #[tokio::test]
    async fn monitor_evicts_lapsed_members() {
        let registry = Arc::new(SessionRegistry::new(
            SessionConfig {
                membership_timeout_secs: 0,
                ..Default::default()
            },
            Arc::new(NoopEventEmitter),
        ));
        registry.create("host").unwrap();

        let token = CancellationToken::new();
        let monitor = Arc::new(LivenessMonitor::new(
            Arc::clone(&registry),
            Duration::from_millis(10),
            token.clone(),
        ));
        let handle = tokio::spawn(monitor.run());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(registry.count(), 0);

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor stops on cancel")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_stops_when_cancelled() {
        let registry = Arc::new(SessionRegistry::new(
            SessionConfig::default(),
            Arc::new(NoopEventEmitter),
        ));
        let token = CancellationToken::new();
        let monitor = Arc::new(LivenessMonitor::new(
            registry,
            Duration::from_secs(5),
            token.clone(),
        ));
        let handle = tokio::spawn(monitor.run());

        tokio::time::sleep(Duration::from_secs(12)).await;
        assert!(!handle.is_finished());
        token.cancel();
        handle.await.unwrap();
    }
}
