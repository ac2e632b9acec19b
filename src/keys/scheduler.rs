//! Periodic rotation and cleanup sweeps
//!
//! The manager holds no sweep mutex of its own; [`RotationScheduler`] keeps a
//! "sweep in progress" flag so a timer tick that lands while a previous sweep
//! is still running is skipped instead of overlapping it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::manager::KeyLifecycleManager;
use super::metadata::{CleanupReport, RotationReport};

/// Result of one full sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    pub rotation: RotationReport,
    pub cleanup: CleanupReport,
}

/// Runs auto-rotation followed by cleanup, one sweep at a time
pub struct RotationScheduler {
    manager: Arc<KeyLifecycleManager>,
    sweeping: AtomicBool,
}

/// Clears the in-progress flag when the sweep ends, even by panic
struct SweepGuard<'a>(&'a AtomicBool);

impl Drop for SweepGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl RotationScheduler {
    pub fn new(manager: Arc<KeyLifecycleManager>) -> Self {
        Self {
            manager,
            sweeping: AtomicBool::new(false),
        }
    }

    /// Whether a sweep is running right now
    pub fn is_sweeping(&self) -> bool {
        self.sweeping.load(Ordering::Acquire)
    }

    /// Run one sweep, or return `None` if another sweep is in flight
    pub fn run_sweep(&self) -> Option<SweepReport> {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("key sweep already in progress, skipping");
            return None;
        }
        let _guard = SweepGuard(&self.sweeping);

        let rotation = self.manager.perform_auto_rotation();
        let cleanup = self.manager.cleanup_old_keys();

        tracing::debug!(
            rotated = rotation.rotated.len(),
            rotation_failures = rotation.failed.len(),
            removed = cleanup.removed.len(),
            cleanup_failures = cleanup.failed.len(),
            "key sweep complete"
        );

        Some(SweepReport { rotation, cleanup })
    }

    /// Sweep every `period` on the current tokio runtime
    ///
    /// The first sweep runs immediately. Sweeps touch the key registry store,
    /// so each one runs on the blocking pool. Abort the returned handle to
    /// stop.
    pub fn spawn(self: Arc<Self>, period: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let scheduler = Arc::clone(&self);
                match tokio::task::spawn_blocking(move || scheduler.run_sweep()).await {
                    Ok(Some(report)) if !report.rotation.is_clean() => {
                        tracing::warn!(
                            failures = report.rotation.failed.len(),
                            "scheduled sweep finished with rotation failures"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "scheduled key sweep panicked");
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NoopAuditSink;
    use crate::clock::ManualClock;
    use crate::config::settings::KeyPolicy;
    use crate::keys::KeyStatus;
    use crate::storage::MemoryStore;

    fn manager(clock: Arc<ManualClock>) -> Arc<KeyLifecycleManager> {
        Arc::new(KeyLifecycleManager::new(
            Arc::new(MemoryStore::new()),
            clock,
            Arc::new(NoopAuditSink),
            KeyPolicy::default(),
        ))
    }

    #[test]
    fn test_sweep_rotates_and_cleans() {
        let clock = Arc::new(ManualClock::starting_now());
        let manager = manager(clock.clone());
        let first = manager.generate_master_key("encryption").unwrap();
        manager.rotate_key(&first).unwrap();

        clock.advance(chrono::Duration::days(400));
        let scheduler = RotationScheduler::new(manager.clone());
        let report = scheduler.run_sweep().unwrap();

        assert_eq!(report.rotation.rotated.len(), 1);
        // the original key and the one just deprecated are both past max age
        assert_eq!(report.cleanup.removed.len(), 2);
        assert!(!report.cleanup.removed.contains(&report.rotation.rotated[0].new_key_id));
        assert!(!scheduler.is_sweeping());
    }

    #[test]
    fn test_overlapping_sweep_is_skipped() {
        let clock = Arc::new(ManualClock::starting_now());
        let scheduler = RotationScheduler::new(manager(clock));

        scheduler.sweeping.store(true, Ordering::Release);
        assert!(scheduler.run_sweep().is_none());

        scheduler.sweeping.store(false, Ordering::Release);
        assert!(scheduler.run_sweep().is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_spawned_scheduler_rotates_due_keys() {
        let clock = Arc::new(ManualClock::starting_now());
        let manager = manager(clock.clone());
        let old = manager.generate_master_key("encryption").unwrap();
        clock.advance(chrono::Duration::days(91));

        let scheduler = Arc::new(RotationScheduler::new(manager.clone()));
        let handle = scheduler.spawn(Duration::from_millis(20));

        let mut rotated = false;
        for _ in 0..100 {
            if manager.key_metadata(&old).map(|m| m.status) == Some(KeyStatus::Deprecated) {
                rotated = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();

        assert!(rotated);
        assert_eq!(manager.get_key_health_status().active_keys, 1);
    }
}
