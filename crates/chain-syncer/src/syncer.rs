use std::{fmt, sync::Arc, time::Duration};

use keel_primitives::BlockHeader;
use keel_rpc::{BlobClient, CheckpointClient, L1Client, L2EngineClient};
use keel_state::{HeadState, StateError};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::{
    BeaconSyncer, CalldataSyncer, CalldataSyncerConfig, SyncError, SyncProgressTracker,
    SyncResult,
};

/// What the orchestrator did on its last pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    #[default]
    Idle,
    /// The engine was handed a beacon sync target and catches up over P2P.
    BeaconTriggered,
    /// Blocks are rebuilt from L1 proposals.
    Replaying,
}

/// Everything [`next_sync_step`] decides on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncInputs {
    pub p2p_sync_enabled: bool,
    pub last_verified_block_id: u64,
    pub ahead_of_head: bool,
    pub tracker_triggered: bool,
    pub tracker_out_of_sync: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStep {
    /// Start (or keep) a beacon sync towards this verified block.
    TriggerBeaconSync(u64),
    /// A beacon sync ended; move the L1 cursor to the engine head before replaying.
    ReanchorThenReplay,
    Replay,
}

pub fn next_sync_step(inputs: &SyncInputs) -> SyncStep {
    let need_beacon_sync = inputs.p2p_sync_enabled
        && inputs.last_verified_block_id > 0
        && !inputs.ahead_of_head
        && !inputs.tracker_out_of_sync;

    if need_beacon_sync {
        SyncStep::TriggerBeaconSync(inputs.last_verified_block_id)
    } else if inputs.tracker_triggered {
        SyncStep::ReanchorThenReplay
    } else {
        SyncStep::Replay
    }
}

/// Whether the local L2 head is close enough to the verified head to replay from L1.
///
/// One block of lag behind the verified head is tolerated. If a beacon sync was started,
/// the head must also have reached its target.
pub fn ahead_of_head_to_sync(
    l2_head: u64,
    verified_block_id: u64,
    last_synced_verified_block_id: Option<u64>,
) -> bool {
    let target = verified_block_id.saturating_sub(1);
    l2_head >= target && last_synced_verified_block_id.is_none_or(|synced| l2_head >= synced)
}

#[derive(Debug, Clone)]
pub struct ChainSyncerConfig {
    pub p2p_sync_enabled: bool,
    pub p2p_sync_timeout: Duration,
    pub progress_check_interval: Duration,
    pub calldata: CalldataSyncerConfig,
}

/// Chooses between beacon sync and L1 replay on every sync attempt.
pub struct L2ChainSyncer {
    state: Arc<HeadState>,
    l1: Arc<dyn L1Client>,
    l2: Arc<dyn L2EngineClient>,
    tracker: Arc<SyncProgressTracker>,
    beacon: Option<BeaconSyncer>,
    calldata: CalldataSyncer,
    mode: Mutex<SyncMode>,
}

impl fmt::Debug for L2ChainSyncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("L2ChainSyncer")
            .field("mode", &self.mode())
            .field("tracker", &self.tracker)
            .field("calldata", &self.calldata)
            .finish_non_exhaustive()
    }
}

impl L2ChainSyncer {
    /// Beacon sync is only available when a checkpoint client is given.
    pub async fn new(
        state: Arc<HeadState>,
        l1: Arc<dyn L1Client>,
        l2: Arc<dyn L2EngineClient>,
        checkpoint: Option<Arc<dyn CheckpointClient>>,
        blobs: Arc<dyn BlobClient>,
        config: ChainSyncerConfig,
    ) -> SyncResult<Self> {
        let tracker = Arc::new(
            SyncProgressTracker::new(l2.clone(), config.p2p_sync_timeout)
                .with_check_interval(config.progress_check_interval),
        );

        let beacon = match checkpoint {
            Some(checkpoint) if config.p2p_sync_enabled => {
                Some(BeaconSyncer::new(l2.clone(), checkpoint, tracker.clone()))
            }
            _ => None,
        };

        let calldata = CalldataSyncer::new(
            state.clone(),
            l1.clone(),
            l2.clone(),
            blobs,
            tracker.clone(),
            config.calldata,
        )
        .await?;

        Ok(Self {
            state,
            l1,
            l2,
            tracker,
            beacon,
            calldata,
            mode: Mutex::new(SyncMode::Idle),
        })
    }

    pub fn beacon_syncer(&self) -> Option<&BeaconSyncer> {
        self.beacon.as_ref()
    }

    pub fn calldata_syncer(&self) -> &CalldataSyncer {
        &self.calldata
    }

    pub fn progress_tracker(&self) -> &Arc<SyncProgressTracker> {
        &self.tracker
    }

    pub fn mode(&self) -> SyncMode {
        *self.mode.lock()
    }

    /// Runs one sync attempt against L1 up to `l1_end`.
    pub async fn sync(&self, l1_end: BlockHeader) -> SyncResult<()> {
        let vars = self.l1.protocol_state_vars().await?;

        // Blocks arriving over P2P only show up in the engine.
        if self.tracker.triggered() {
            if let Some(head) = self.l2.header_by_number(None).await? {
                self.state.update_l2_head(head);
            }
        }

        let inputs = SyncInputs {
            p2p_sync_enabled: self.beacon.is_some(),
            last_verified_block_id: vars.last_verified_block_id,
            ahead_of_head: ahead_of_head_to_sync(
                self.state.l2_head().number,
                vars.last_verified_block_id,
                self.tracker.last_synced_verified_block_id(),
            ),
            tracker_triggered: self.tracker.triggered(),
            tracker_out_of_sync: self.tracker.beacon_sync_stalled(vars.last_verified_block_id),
        };
        let step = next_sync_step(&inputs);
        debug!(?inputs, ?step, %l1_end, "sync step");

        match step {
            SyncStep::TriggerBeaconSync(block_id) => {
                if let Some(beacon) = &self.beacon {
                    beacon.trigger_beacon_sync(block_id).await?;
                }
                *self.mode.lock() = SyncMode::BeaconTriggered;
                return Ok(());
            }
            SyncStep::ReanchorThenReplay => self.reanchor().await?,
            SyncStep::Replay => {}
        }

        *self.mode.lock() = SyncMode::Replaying;
        self.calldata.process_l1_blocks(l1_end).await
    }

    /// Resumes L1 replay from wherever the beacon sync left the engine.
    async fn reanchor(&self) -> SyncResult<()> {
        let head = self
            .l2
            .header_by_number(None)
            .await?
            .ok_or(SyncError::State(StateError::MissingL2Head))?;

        let l1_current = self.state.reset_l1_current(head.number).await?;
        self.tracker.update_meta(head.number, head.hash);
        self.state.update_l2_head(head);
        info!(l2_head = %head, %l1_current, "beacon sync finished, resuming L1 replay");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod ahead_of_head_tests {
        use super::*;

        #[test]
        fn test_one_block_of_lag_tolerated() {
            assert!(ahead_of_head_to_sync(9, 10, None));
            assert!(ahead_of_head_to_sync(10, 10, None));
            assert!(!ahead_of_head_to_sync(8, 10, None));
        }

        #[test]
        fn test_genesis_is_never_behind() {
            assert!(ahead_of_head_to_sync(0, 0, None));
            assert!(ahead_of_head_to_sync(0, 1, None));
        }

        #[test]
        fn test_last_synced_target_must_be_reached() {
            assert!(!ahead_of_head_to_sync(9, 10, Some(12)));
            assert!(ahead_of_head_to_sync(12, 10, Some(12)));
        }
    }

    mod step_tests {
        use super::*;

        fn inputs() -> SyncInputs {
            SyncInputs {
                p2p_sync_enabled: true,
                last_verified_block_id: 50,
                ahead_of_head: false,
                tracker_triggered: false,
                tracker_out_of_sync: false,
            }
        }

        #[test]
        fn test_far_behind_triggers_beacon_sync() {
            assert_eq!(next_sync_step(&inputs()), SyncStep::TriggerBeaconSync(50));
        }

        #[test]
        fn test_replay_when_beacon_sync_not_applicable() {
            let cases = [
                SyncInputs {
                    p2p_sync_enabled: false,
                    ..inputs()
                },
                SyncInputs {
                    last_verified_block_id: 0,
                    ..inputs()
                },
                SyncInputs {
                    ahead_of_head: true,
                    ..inputs()
                },
                SyncInputs {
                    tracker_out_of_sync: true,
                    ..inputs()
                },
            ];

            for case in cases {
                assert_eq!(next_sync_step(&case), SyncStep::Replay, "{case:?}");
            }
        }

        #[test]
        fn test_finished_or_stalled_beacon_sync_reanchors() {
            let caught_up = SyncInputs {
                ahead_of_head: true,
                tracker_triggered: true,
                ..inputs()
            };
            assert_eq!(next_sync_step(&caught_up), SyncStep::ReanchorThenReplay);

            let stalled = SyncInputs {
                tracker_triggered: true,
                tracker_out_of_sync: true,
                ..inputs()
            };
            assert_eq!(next_sync_step(&stalled), SyncStep::ReanchorThenReplay);
        }

        #[test]
        fn test_running_beacon_sync_keeps_target() {
            let running = SyncInputs {
                tracker_triggered: true,
                ..inputs()
            };
            assert_eq!(next_sync_step(&running), SyncStep::TriggerBeaconSync(50));
        }
    }
}
