//! Tracks a beacon sync running inside the execution engine.

use std::{fmt, sync::Arc, time::Duration};

use alloy_primitives::B256;
use keel_primitives::SyncProgress;
use keel_rpc::L2EngineClient;
use parking_lot::Mutex;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::SyncResult;

/// Default interval between watchdog checks.
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Observable tracker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Idle,
    InProgress,
    /// The engine stopped making progress for longer than the timeout.
    OutOfSync,
}

#[derive(Debug, Default)]
struct TrackerInner {
    triggered: bool,
    out_of_sync: bool,
    last_synced_verified_block_id: Option<u64>,
    last_synced_verified_block_hash: Option<B256>,
    last_sync_progress: Option<SyncProgress>,
    last_progressed_at: Option<Instant>,
    /// Target of the last beacon sync that stalled.
    stalled_target: Option<u64>,
}

/// Watches the engine's P2P sync progress and flags a stall.
///
/// [`SyncProgressTracker::update_meta`] returns the tracker to idle, but the target of a
/// stalled sync is remembered so it is not retried until the verified head moves.
pub struct SyncProgressTracker {
    l2: Arc<dyn L2EngineClient>,
    timeout: Duration,
    check_interval: Duration,
    inner: Mutex<TrackerInner>,
}

impl fmt::Debug for SyncProgressTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncProgressTracker")
            .field("timeout", &self.timeout)
            .field("check_interval", &self.check_interval)
            .field("inner", &*self.inner.lock())
            .finish_non_exhaustive()
    }
}

impl SyncProgressTracker {
    pub fn new(l2: Arc<dyn L2EngineClient>, timeout: Duration) -> Self {
        Self {
            l2,
            timeout,
            check_interval: DEFAULT_CHECK_INTERVAL,
            inner: Mutex::new(TrackerInner::default()),
        }
    }

    pub fn with_check_interval(mut self, check_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self
    }

    pub fn state(&self) -> TrackerState {
        let inner = self.inner.lock();
        if inner.out_of_sync {
            TrackerState::OutOfSync
        } else if inner.triggered {
            TrackerState::InProgress
        } else {
            TrackerState::Idle
        }
    }

    pub fn triggered(&self) -> bool {
        self.inner.lock().triggered
    }

    pub fn out_of_sync(&self) -> bool {
        self.inner.lock().out_of_sync
    }

    /// Whether a beacon sync towards `block_id` should not be started: the running one
    /// stalled, or an earlier one towards the same target did.
    pub fn beacon_sync_stalled(&self, block_id: u64) -> bool {
        let inner = self.inner.lock();
        inner.out_of_sync || inner.stalled_target == Some(block_id)
    }

    pub fn last_synced_verified_block_id(&self) -> Option<u64> {
        self.inner.lock().last_synced_verified_block_id
    }

    pub fn last_synced_verified_block_hash(&self) -> Option<B256> {
        self.inner.lock().last_synced_verified_block_hash
    }

    /// Marks a beacon sync towards `block_id` as started.
    pub fn trigger(&self, block_id: u64, block_hash: B256) {
        let mut inner = self.inner.lock();
        inner.triggered = true;
        inner.out_of_sync = false;
        inner.last_synced_verified_block_id = Some(block_id);
        inner.last_synced_verified_block_hash = Some(block_hash);
        inner.last_sync_progress = None;
        inner.last_progressed_at = Some(Instant::now());
    }

    /// Records the local head after a beacon sync and returns to idle.
    pub fn update_meta(&self, block_id: u64, block_hash: B256) {
        let mut inner = self.inner.lock();
        inner.triggered = false;
        inner.out_of_sync = false;
        inner.last_synced_verified_block_id = Some(block_id);
        inner.last_synced_verified_block_hash = Some(block_hash);
        inner.last_sync_progress = None;
        inner.last_progressed_at = None;
    }

    /// Returns true if a beacon sync towards `block_id` would target a new block.
    pub fn head_changed(&self, block_id: u64) -> bool {
        let inner = self.inner.lock();
        !inner.triggered || inner.last_synced_verified_block_id != Some(block_id)
    }

    /// Runs the watchdog until `cancel` fires.
    pub async fn track(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = self.check().await {
                        warn!(%err, "failed to check beacon sync progress");
                    }
                }
            }
        }
        debug!("sync progress watchdog stopped");
    }

    /// One watchdog tick.
    pub(crate) async fn check(&self) -> SyncResult<()> {
        let target = {
            let inner = self.inner.lock();
            if !inner.triggered || inner.out_of_sync {
                return Ok(());
            }
            inner.last_synced_verified_block_id.unwrap_or_default()
        };

        let progress = self.l2.sync_progress().await?;
        let head = match progress {
            Some(_) => None,
            None => self.l2.header_by_number(None).await?,
        };

        let now = Instant::now();
        let mut inner = self.inner.lock();
        let advanced = match (progress, inner.last_sync_progress) {
            (None, _) => head.is_some_and(|h| h.number >= target),
            (Some(_), None) => true,
            (Some(p), Some(prev)) => {
                p.advanced_since(&prev)
                    || p.highest_block > prev.highest_block
                    || p.current_block >= target
            }
        };

        if progress.is_some() {
            inner.last_sync_progress = progress;
        }

        if advanced {
            inner.last_progressed_at = Some(now);
            if progress.is_none() {
                debug!(%target, "beacon sync reached target");
            }
            return Ok(());
        }

        let stalled_for = inner
            .last_progressed_at
            .map_or(Duration::ZERO, |at| now.saturating_duration_since(at));
        if stalled_for > self.timeout {
            inner.out_of_sync = true;
            inner.stalled_target = Some(target);
            warn!(
                %target,
                ?stalled_for,
                timeout = ?self.timeout,
                "beacon sync made no progress, marking out of sync"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use keel_primitives::BlockHeader;
    use keel_rpc::MockL2EngineClient;

    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(60);

    fn tracker(l2: MockL2EngineClient) -> SyncProgressTracker {
        SyncProgressTracker::new(Arc::new(l2), TIMEOUT)
    }

    mod state_tests {
        use super::*;

        #[test]
        fn test_trigger_and_update_meta() {
            let t = tracker(MockL2EngineClient::new());
            assert_eq!(t.state(), TrackerState::Idle);
            assert!(t.head_changed(5));

            t.trigger(5, B256::repeat_byte(5));
            assert_eq!(t.state(), TrackerState::InProgress);
            assert!(!t.head_changed(5));
            assert!(t.head_changed(6));

            t.update_meta(4, B256::repeat_byte(4));
            assert_eq!(t.state(), TrackerState::Idle);
            assert_eq!(t.last_synced_verified_block_id(), Some(4));
            assert_eq!(t.last_synced_verified_block_hash(), Some(B256::repeat_byte(4)));
            assert!(t.head_changed(4));
        }
    }

    mod watchdog_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_idle_tracker_never_queries_engine() {
            let mut l2 = MockL2EngineClient::new();
            l2.expect_sync_progress().times(0);
            let t = tracker(l2);

            t.check().await.unwrap();

            assert_eq!(t.state(), TrackerState::Idle);
        }

        #[tokio::test(start_paused = true)]
        async fn test_stall_marks_out_of_sync_until_update_meta() {
            // Scenario: engine reports the same progress past the timeout.
            // Expected: OutOfSync, then Idle after update_meta. The stalled target stays
            // blocked while newer targets are allowed.
            let mut l2 = MockL2EngineClient::new();
            l2.expect_sync_progress().returning(|| {
                Ok(Some(SyncProgress {
                    current_block: 10,
                    highest_block: 100,
                    ..Default::default()
                }))
            });
            let t = tracker(l2);
            t.trigger(100, B256::ZERO);

            t.check().await.unwrap();
            assert_eq!(t.state(), TrackerState::InProgress);

            tokio::time::advance(TIMEOUT + Duration::from_secs(1)).await;
            t.check().await.unwrap();
            assert_eq!(t.state(), TrackerState::OutOfSync);

            assert!(t.out_of_sync());
            assert!(t.beacon_sync_stalled(100));

            t.update_meta(10, B256::ZERO);
            assert_eq!(t.state(), TrackerState::Idle);
            assert!(!t.out_of_sync());
            assert!(!t.triggered());
            assert!(t.beacon_sync_stalled(100));
            assert!(!t.beacon_sync_stalled(150));

            t.trigger(150, B256::repeat_byte(1));
            assert_eq!(t.state(), TrackerState::InProgress);
        }

        #[tokio::test(start_paused = true)]
        async fn test_progress_resets_stall_timer() {
            let current = Arc::new(AtomicU64::new(10));
            let mut l2 = MockL2EngineClient::new();
            {
                let current = current.clone();
                l2.expect_sync_progress().returning(move || {
                    Ok(Some(SyncProgress {
                        current_block: current.load(Ordering::SeqCst),
                        highest_block: 100,
                        ..Default::default()
                    }))
                });
            }
            let t = tracker(l2);
            t.trigger(100, B256::ZERO);
            t.check().await.unwrap();

            for _ in 0..5 {
                tokio::time::advance(TIMEOUT - Duration::from_secs(1)).await;
                current.fetch_add(5, Ordering::SeqCst);
                t.check().await.unwrap();
            }

            assert_eq!(t.state(), TrackerState::InProgress);
        }

        #[tokio::test(start_paused = true)]
        async fn test_not_syncing_at_target_counts_as_progress() {
            let mut l2 = MockL2EngineClient::new();
            l2.expect_sync_progress().returning(|| Ok(None));
            l2.expect_header_by_number()
                .returning(|_| Ok(Some(BlockHeader::new(100, B256::ZERO, B256::ZERO))));
            let t = tracker(l2);
            t.trigger(100, B256::ZERO);

            tokio::time::advance(TIMEOUT * 2).await;
            t.check().await.unwrap();

            assert_eq!(t.state(), TrackerState::InProgress);
        }

        #[tokio::test(start_paused = true)]
        async fn test_not_syncing_below_target_times_out() {
            let mut l2 = MockL2EngineClient::new();
            l2.expect_sync_progress().returning(|| Ok(None));
            l2.expect_header_by_number()
                .returning(|_| Ok(Some(BlockHeader::new(3, B256::ZERO, B256::ZERO))));
            let t = tracker(l2);
            t.trigger(100, B256::ZERO);

            tokio::time::advance(TIMEOUT * 2).await;
            t.check().await.unwrap();

            assert_eq!(t.state(), TrackerState::OutOfSync);
        }

        #[tokio::test(start_paused = true)]
        async fn test_track_stops_on_cancel() {
            let mut l2 = MockL2EngineClient::new();
            l2.expect_sync_progress().returning(|| Ok(None));
            l2.expect_header_by_number()
                .returning(|_| Ok(Some(BlockHeader::new(3, B256::ZERO, B256::ZERO))));
            let t = Arc::new(tracker(l2).with_check_interval(Duration::from_secs(10)));
            t.trigger(100, B256::ZERO);

            let cancel = CancellationToken::new();
            let handle = {
                let t = t.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { t.track(cancel).await })
            };

            tokio::time::sleep(TIMEOUT + Duration::from_secs(15)).await;
            assert_eq!(t.state(), TrackerState::OutOfSync);

            cancel.cancel();
            handle.await.unwrap();
        }
    }
}
