use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::signal::unix::SignalKind;
use tokio::time;

/// Periodic re-entrancy-guarded driver for the analyzer tick (§5
/// "Scheduling"). If the previous tick is still running when the interval
/// fires again, the new tick is skipped and logged rather than overlapping.
pub struct Scheduler {
    poll_interval: Duration,
    soft_duration_warning: Duration,
    busy: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            soft_duration_warning: Duration::from_secs(120),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run `tick` on every interval until SIGINT or SIGTERM. `tick` must be
    /// cheap to clone/call repeatedly; it receives no arguments and returns
    /// a future that completes when that tick's work is done.
    pub async fn run<F, Fut>(&self, tick: F) -> anyhow::Result<()>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = ()>,
    {
        let mut interval = time::interval(self.poll_interval);
        let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.busy.swap(true, Ordering::AcqRel) {
                        tracing::warn!("skipping tick: previous tick still running");
                        continue;
                    }
                    let started = Instant::now();
                    tick().await;
                    let elapsed = started.elapsed();
                    if elapsed > self.soft_duration_warning {
                        tracing::warn!(elapsed_ms = elapsed.as_millis() as u64, "tick exceeded soft duration target");
                    }
                    self.busy.store(false, Ordering::Release);
                }
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("received SIGINT, shutting down");
                    break;
                }
                _ = sigterm.recv() => {
                    tracing::info!("received SIGTERM, shutting down");
                    break;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

    use super::*;

    #[tokio::test]
    async fn overlapping_tick_is_skipped_not_queued() {
        let busy = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicU32::new(0));

        // Directly exercise the guard logic without a real timer, since the
        // scheduler's public `run` loop only exits on a signal.
        let first_entered = !busy.swap(true, Ordering::AcqRel);
        assert!(first_entered);
        let second_entered = !busy.swap(true, Ordering::AcqRel);
        assert!(!second_entered, "second tick must observe busy=true and be skipped");
        busy.store(false, Ordering::Release);
        calls.fetch_add(1, AtomicOrdering::SeqCst);
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 1);
    }
}
