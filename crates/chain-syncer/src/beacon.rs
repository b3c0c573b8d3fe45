use std::{fmt, sync::Arc};

use alloy_primitives::B256;
use alloy_rpc_types_engine::{ForkchoiceState, PayloadStatusEnum};
use keel_common::metrics::BEACON_SYNC_TRIGGERS_TOTAL;
use keel_rpc::{CheckpointClient, L2EngineClient};
use tracing::{debug, info};

use crate::{SyncError, SyncProgressTracker, SyncResult};

/// Fails unless the engine reported one of the `accepted` statuses.
pub(crate) fn ensure_status(
    method: &'static str,
    status: &PayloadStatusEnum,
    accepted: &[fn(&PayloadStatusEnum) -> bool],
) -> SyncResult<()> {
    if accepted.iter().any(|f| f(status)) {
        Ok(())
    } else {
        Err(SyncError::Engine {
            method,
            status: status.to_string(),
        })
    }
}

pub(crate) fn ensure_valid(method: &'static str, status: &PayloadStatusEnum) -> SyncResult<()> {
    ensure_status(method, status, &[PayloadStatusEnum::is_valid])
}

/// Hands the engine a trusted target block and lets it sync to it over P2P.
pub struct BeaconSyncer {
    l2: Arc<dyn L2EngineClient>,
    checkpoint: Arc<dyn CheckpointClient>,
    tracker: Arc<SyncProgressTracker>,
}

impl fmt::Debug for BeaconSyncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeaconSyncer").finish_non_exhaustive()
    }
}

impl BeaconSyncer {
    pub fn new(
        l2: Arc<dyn L2EngineClient>,
        checkpoint: Arc<dyn CheckpointClient>,
        tracker: Arc<SyncProgressTracker>,
    ) -> Self {
        Self {
            l2,
            checkpoint,
            tracker,
        }
    }

    /// Points the engine at checkpoint block `block_id`.
    ///
    /// Does nothing if a sync towards the same block is already running. Never inserts
    /// blocks itself.
    pub async fn trigger_beacon_sync(&self, block_id: u64) -> SyncResult<()> {
        if self.tracker.triggered() && !self.tracker.head_changed(block_id) {
            debug!(%block_id, "beacon sync already triggered for this block");
            return Ok(());
        }

        let payload = self
            .checkpoint
            .payload_by_number(block_id)
            .await?
            .ok_or(SyncError::MissingCheckpointBlock(block_id))?;
        let block_hash = payload.block_hash;

        let status = self.l2.new_payload(payload).await?;
        ensure_status(
            "engine_newPayload",
            &status.status,
            &[
                PayloadStatusEnum::is_valid,
                PayloadStatusEnum::is_syncing,
                |s| matches!(s, PayloadStatusEnum::Accepted),
            ],
        )?;

        let fcu = self
            .l2
            .forkchoice_updated(
                ForkchoiceState {
                    head_block_hash: block_hash,
                    safe_block_hash: B256::ZERO,
                    finalized_block_hash: B256::ZERO,
                },
                None,
            )
            .await?;
        ensure_status(
            "engine_forkchoiceUpdated",
            &fcu.payload_status.status,
            &[PayloadStatusEnum::is_syncing, PayloadStatusEnum::is_valid],
        )?;

        self.tracker.trigger(block_id, block_hash);
        BEACON_SYNC_TRIGGERS_TOTAL.inc();
        info!(%block_id, %block_hash, "beacon sync triggered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use alloy_rpc_types_engine::{ExecutionPayloadV1, ForkchoiceUpdated, PayloadStatus};
    use keel_rpc::{MockCheckpointClient, MockL2EngineClient};

    use super::*;

    fn payload(number: u64) -> ExecutionPayloadV1 {
        ExecutionPayloadV1 {
            parent_hash: B256::ZERO,
            fee_recipient: Default::default(),
            state_root: B256::ZERO,
            receipts_root: B256::ZERO,
            logs_bloom: Default::default(),
            prev_randao: B256::ZERO,
            block_number: number,
            gas_limit: 30_000_000,
            gas_used: 0,
            timestamp: 0,
            extra_data: Default::default(),
            base_fee_per_gas: Default::default(),
            block_hash: B256::with_last_byte(number as u8),
            transactions: vec![],
        }
    }

    fn checkpoint() -> MockCheckpointClient {
        let mut cp = MockCheckpointClient::new();
        cp.expect_payload_by_number()
            .returning(|n| Ok(Some(payload(n))));
        cp
    }

    fn syncer(
        l2: MockL2EngineClient,
        cp: MockCheckpointClient,
    ) -> (BeaconSyncer, Arc<SyncProgressTracker>) {
        let l2: Arc<dyn L2EngineClient> = Arc::new(l2);
        let tracker = Arc::new(SyncProgressTracker::new(l2.clone(), Duration::from_secs(60)));
        (BeaconSyncer::new(l2, Arc::new(cp), tracker.clone()), tracker)
    }

    #[test]
    fn test_debug_hides_clients() {
        let (syncer, _) = syncer(MockL2EngineClient::new(), MockCheckpointClient::new());
        assert_eq!(format!("{syncer:?}"), "BeaconSyncer { .. }");
    }

    #[tokio::test]
    async fn test_trigger_records_target() {
        let mut l2 = MockL2EngineClient::new();
        l2.expect_new_payload()
            .times(1)
            .returning(|_| Ok(PayloadStatus::from_status(PayloadStatusEnum::Syncing)));
        l2.expect_forkchoice_updated()
            .withf(|state, attrs| {
                state.head_block_hash == B256::with_last_byte(9) && attrs.is_none()
            })
            .times(1)
            .returning(|_, _| Ok(ForkchoiceUpdated::from_status(PayloadStatusEnum::Syncing)));
        let (syncer, tracker) = syncer(l2, checkpoint());

        syncer.trigger_beacon_sync(9).await.unwrap();

        assert!(tracker.triggered());
        assert_eq!(tracker.last_synced_verified_block_id(), Some(9));
        assert_eq!(
            tracker.last_synced_verified_block_hash(),
            Some(B256::with_last_byte(9))
        );
    }

    #[tokio::test]
    async fn test_same_target_is_noop() {
        let mut l2 = MockL2EngineClient::new();
        l2.expect_new_payload()
            .times(1)
            .returning(|_| Ok(PayloadStatus::from_status(PayloadStatusEnum::Valid)));
        l2.expect_forkchoice_updated()
            .times(1)
            .returning(|_, _| Ok(ForkchoiceUpdated::from_status(PayloadStatusEnum::Valid)));
        let (syncer, _) = syncer(l2, checkpoint());

        syncer.trigger_beacon_sync(9).await.unwrap();
        syncer.trigger_beacon_sync(9).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_payload_is_rejected() {
        let mut l2 = MockL2EngineClient::new();
        l2.expect_new_payload().returning(|_| {
            Ok(PayloadStatus::from_status(PayloadStatusEnum::Invalid {
                validation_error: "bad state root".to_string(),
            }))
        });
        l2.expect_forkchoice_updated().times(0);
        let (syncer, tracker) = syncer(l2, checkpoint());

        let res = syncer.trigger_beacon_sync(9).await;

        assert!(matches!(
            res,
            Err(SyncError::Engine {
                method: "engine_newPayload",
                ..
            })
        ));
        assert!(!tracker.triggered());
    }

    #[tokio::test]
    async fn test_missing_checkpoint_block() {
        let mut cp = MockCheckpointClient::new();
        cp.expect_payload_by_number().returning(|_| Ok(None));
        let (syncer, _) = syncer(MockL2EngineClient::new(), cp);

        let res = syncer.trigger_beacon_sync(9).await;

        assert!(matches!(res, Err(SyncError::MissingCheckpointBlock(9))));
    }
}
