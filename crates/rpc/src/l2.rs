use std::time::Duration;

use alloy::{
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
    rpc::types::{TransactionInput, TransactionRequest},
};
use alloy_eips::{BlockId, BlockNumberOrTag};
use alloy_primitives::{Address, U64};
use alloy_rpc_types_engine::{
    ExecutionPayloadV1, ForkchoiceState, ForkchoiceUpdated, PayloadId, PayloadStatus,
    TransitionConfiguration,
};
use alloy_sol_types::SolCall;
use async_trait::async_trait;
use futures::StreamExt;
use keel_primitives::{BlockHeader, L1Origin, SyncProgress};
use tracing::debug;

use crate::{
    bindings::ITaikoL2,
    convert::{header_from_rpc, RawSyncStatus},
    engine::RpcL1Origin,
    timing::timed,
    EngineRpcClient, HeaderStream, L2EngineClient, L2PayloadAttributes, RpcError, RpcResult,
};

const TARGET: &str = "l2";

/// L2 execution engine client: public namespaces over websocket, engine API over
/// authenticated HTTP.
#[derive(Debug, Clone)]
pub struct L2RpcClient {
    provider: DynProvider,
    engine: EngineRpcClient,
    anchor: Address,
    timeout: Duration,
}

impl L2RpcClient {
    pub async fn connect(
        ws_url: &str,
        engine: EngineRpcClient,
        anchor: Address,
        timeout: Duration,
    ) -> RpcResult<Self> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(ws_url))
            .await?
            .erased();
        debug!(%ws_url, %anchor, "connected to L2");
        Ok(Self {
            provider,
            engine,
            anchor,
            timeout,
        })
    }

    pub fn engine(&self) -> &EngineRpcClient {
        &self.engine
    }
}

fn is_not_found(err: &RpcError) -> bool {
    match err {
        RpcError::Transport(err) => err
            .as_error_resp()
            .is_some_and(|resp| resp.message.contains("not found")),
        _ => false,
    }
}

#[async_trait]
impl L2EngineClient for L2RpcClient {
    async fn header_by_number(&self, number: Option<u64>) -> RpcResult<Option<BlockHeader>> {
        let tag = number.map_or(BlockNumberOrTag::Latest, BlockNumberOrTag::Number);
        let block = timed(
            "eth_getBlockByNumber",
            TARGET,
            self.timeout,
            self.provider.get_block_by_number(tag),
        )
        .await?;
        Ok(block.map(|b| header_from_rpc(&b.header)))
    }

    async fn subscribe_new_heads(&self) -> RpcResult<HeaderStream> {
        let sub = self.provider.subscribe_blocks().await?;
        Ok(sub
            .into_stream()
            .map(|header| header_from_rpc(&header))
            .boxed())
    }

    async fn peer_count(&self) -> RpcResult<u64> {
        let count: U64 = timed(
            "net_peerCount",
            TARGET,
            self.timeout,
            self.provider.raw_request("net_peerCount".into(), ()),
        )
        .await?;
        Ok(count.to())
    }

    async fn sync_progress(&self) -> RpcResult<Option<SyncProgress>> {
        let status: RawSyncStatus = timed(
            "eth_syncing",
            TARGET,
            self.timeout,
            self.provider.raw_request("eth_syncing".into(), ()),
        )
        .await?;
        Ok(status.into_progress())
    }

    async fn l1_origin_by_id(&self, block_id: u64) -> RpcResult<Option<L1Origin>> {
        let res: RpcResult<Option<RpcL1Origin>> = timed(
            "taiko_l1OriginByID",
            TARGET,
            self.timeout,
            self.provider
                .raw_request("taiko_l1OriginByID".into(), (U64::from(block_id),)),
        )
        .await;

        match res {
            Ok(origin) => Ok(origin.map(Into::into)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn nonce_at(&self, address: Address, block_number: u64) -> RpcResult<u64> {
        timed(
            "eth_getTransactionCount",
            TARGET,
            self.timeout,
            self.provider
                .get_transaction_count(address)
                .block_id(BlockId::number(block_number)),
        )
        .await
    }

    async fn base_fee(
        &self,
        parent_number: u64,
        l1_height: u64,
        parent_gas_used: u32,
    ) -> RpcResult<u64> {
        let call = ITaikoL2::getBasefeeCall {
            l1Height: l1_height,
            parentGasUsed: parent_gas_used,
        };
        let req = TransactionRequest::default()
            .to(self.anchor)
            .input(TransactionInput::new(call.abi_encode().into()));

        let out = timed(
            "getBasefee",
            TARGET,
            self.timeout,
            self.provider
                .call(req)
                .block(BlockId::number(parent_number)),
        )
        .await?;

        let base_fee = ITaikoL2::getBasefeeCall::abi_decode_returns(&out)?;
        u64::try_from(base_fee)
            .map_err(|_| RpcError::UnexpectedResponse(format!("base fee {base_fee} overflows")))
    }

    async fn forkchoice_updated(
        &self,
        state: ForkchoiceState,
        attributes: Option<L2PayloadAttributes>,
    ) -> RpcResult<ForkchoiceUpdated> {
        self.engine.forkchoice_updated(state, attributes).await
    }

    async fn get_payload(&self, payload_id: PayloadId) -> RpcResult<ExecutionPayloadV1> {
        self.engine.get_payload(payload_id).await
    }

    async fn new_payload(&self, payload: ExecutionPayloadV1) -> RpcResult<PayloadStatus> {
        self.engine.new_payload(payload).await
    }

    async fn exchange_transition_configuration(
        &self,
        config: TransitionConfiguration,
    ) -> RpcResult<TransitionConfiguration> {
        self.engine.exchange_transition_configuration(config).await
    }
}
