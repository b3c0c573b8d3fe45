use alloy_primitives::{Address, Bytes, B256};
use alloy_rpc_types_engine::{
    ExecutionPayloadV1, ForkchoiceState, ForkchoiceUpdated, PayloadId, PayloadStatus,
    TransitionConfiguration,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use keel_primitives::{
    BlockHeader, L1Origin, ProposedBlock, ProtocolConfig, ProtocolStateVars, SyncProgress,
};

use crate::{L2PayloadAttributes, RpcResult};

/// Stream of new chain heads from a subscription.
pub type HeaderStream = BoxStream<'static, BlockHeader>;

/// Read access to L1 and the inbox contract.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait L1Client: Send + Sync {
    async fn block_number(&self) -> RpcResult<u64>;

    /// Returns `None` if the height is above the current head.
    async fn header_by_number(&self, number: u64) -> RpcResult<Option<BlockHeader>>;

    async fn subscribe_new_heads(&self) -> RpcResult<HeaderStream>;

    /// Block proposals emitted in `from..=to`, in emission order.
    async fn block_proposed_events(&self, from: u64, to: u64) -> RpcResult<Vec<ProposedBlock>>;

    /// Recovers the calldata tx list from the proposing transaction.
    async fn proposal_tx_list(&self, tx_hash: B256) -> RpcResult<Bytes>;

    async fn protocol_state_vars(&self) -> RpcResult<ProtocolStateVars>;

    async fn protocol_config(&self) -> RpcResult<ProtocolConfig>;

    /// L1 height at which the given block was proposed.
    async fn proposed_in(&self, block_id: u64) -> RpcResult<u64>;
}

/// Access to the L2 execution engine, both its public and authenticated APIs.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait L2EngineClient: Send + Sync {
    /// Header at `number`, or the latest header if `None`.
    async fn header_by_number(&self, number: Option<u64>) -> RpcResult<Option<BlockHeader>>;

    async fn subscribe_new_heads(&self) -> RpcResult<HeaderStream>;

    async fn peer_count(&self) -> RpcResult<u64>;

    /// Current P2P sync status, `None` when the engine is not syncing.
    async fn sync_progress(&self) -> RpcResult<Option<SyncProgress>>;

    /// L1 origin recorded for a block, `None` for unknown blocks or blocks synced over P2P.
    async fn l1_origin_by_id(&self, block_id: u64) -> RpcResult<Option<L1Origin>>;

    async fn nonce_at(&self, address: Address, block_number: u64) -> RpcResult<u64>;

    /// Base fee for the child of `parent_number`, from the L2 anchor contract.
    async fn base_fee(
        &self,
        parent_number: u64,
        l1_height: u64,
        parent_gas_used: u32,
    ) -> RpcResult<u64>;

    async fn forkchoice_updated(
        &self,
        state: ForkchoiceState,
        attributes: Option<L2PayloadAttributes>,
    ) -> RpcResult<ForkchoiceUpdated>;

    async fn get_payload(&self, payload_id: PayloadId) -> RpcResult<ExecutionPayloadV1>;

    async fn new_payload(&self, payload: ExecutionPayloadV1) -> RpcResult<PayloadStatus>;

    async fn exchange_transition_configuration(
        &self,
        config: TransitionConfiguration,
    ) -> RpcResult<TransitionConfiguration>;
}

/// Trusted L2 node serving verified blocks.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait CheckpointClient: Send + Sync {
    async fn payload_by_number(&self, number: u64) -> RpcResult<Option<ExecutionPayloadV1>>;
}

/// Beacon node access for blob-carried tx lists.
#[cfg_attr(feature = "test-utils", mockall::automock)]
#[async_trait]
pub trait BlobClient: Send + Sync {
    /// Raw blob matching `blob_hash` from the slot covering `l1_timestamp`.
    async fn blob_data(&self, l1_timestamp: u64, blob_hash: B256) -> RpcResult<Bytes>;
}
