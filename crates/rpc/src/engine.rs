use std::{sync::Arc, time::Duration};

use alloy_primitives::{Address, Bytes, B256, U256, U64};
use alloy_rpc_types_engine::{
    ExecutionPayloadV1, ForkchoiceState, ForkchoiceUpdated, JwtSecret, PayloadAttributes,
    PayloadId, PayloadStatus, TransitionConfiguration,
};
use jsonrpsee::{
    core::client::ClientT,
    http_client::{transport::HttpBackend, HttpClient, HttpClientBuilder, RpcLogger, RpcService},
    rpc_params,
};
use keel_primitives::{L1Origin, ProposedBlock};
use reth_rpc_layer::{AuthClientLayer, AuthClientService};
use serde::{Deserialize, Serialize};

use crate::{timing::timed, RpcResult};

const TARGET: &str = "execution_engine";

type AuthHttpClient = HttpClient<RpcLogger<RpcService<AuthClientService<HttpBackend>>>>;

fn http_client(http_url: &str, secret: JwtSecret) -> RpcResult<AuthHttpClient> {
    let middleware = tower::ServiceBuilder::new().layer(AuthClientLayer::new(secret));

    Ok(HttpClientBuilder::default()
        .set_http_middleware(middleware)
        .build(http_url)?)
}

/// Block-level inputs the engine needs beyond the standard payload attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L2BlockMetadata {
    pub beneficiary: Address,
    pub gas_limit: U64,
    pub timestamp: U64,
    /// RLP-encoded transactions, anchor first.
    pub tx_list: Bytes,
    pub mix_hash: B256,
    pub extra_data: Bytes,
}

/// Wire form of an L1 origin, as returned by `taiko_l1OriginByID` and passed in payload
/// attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcL1Origin {
    #[serde(rename = "blockID")]
    pub block_id: U64,
    #[serde(default)]
    pub l2_block_hash: B256,
    pub l1_block_height: U64,
    pub l1_block_hash: B256,
}

impl From<L1Origin> for RpcL1Origin {
    fn from(origin: L1Origin) -> Self {
        Self {
            block_id: U64::from(origin.block_id),
            l2_block_hash: origin.l2_block_hash,
            l1_block_height: U64::from(origin.l1_block_height),
            l1_block_hash: origin.l1_block_hash,
        }
    }
}

impl From<RpcL1Origin> for L1Origin {
    fn from(origin: RpcL1Origin) -> Self {
        Self {
            block_id: origin.block_id.to(),
            l2_block_hash: origin.l2_block_hash,
            l1_block_height: origin.l1_block_height.to(),
            l1_block_hash: origin.l1_block_hash,
        }
    }
}

/// Payload attributes extended with the proposal the block is rebuilt from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct L2PayloadAttributes {
    #[serde(flatten)]
    pub inner: PayloadAttributes,
    pub base_fee_per_gas: U256,
    pub block_metadata: L2BlockMetadata,
    pub l1_origin: RpcL1Origin,
}

impl L2PayloadAttributes {
    /// Builds the attributes for the block described by `proposal`.
    ///
    /// `tx_list` must already contain the anchor transaction. The recorded L1 origin is the
    /// L1 block that emitted the proposal.
    pub fn from_proposal(proposal: &ProposedBlock, tx_list: Bytes, base_fee: u64) -> Self {
        let meta = &proposal.meta;
        Self {
            inner: PayloadAttributes {
                timestamp: meta.timestamp,
                prev_randao: meta.difficulty,
                suggested_fee_recipient: meta.beneficiary,
                withdrawals: None,
                parent_beacon_block_root: None,
            },
            base_fee_per_gas: U256::from(base_fee),
            block_metadata: L2BlockMetadata {
                beneficiary: meta.beneficiary,
                gas_limit: U64::from(meta.gas_limit),
                timestamp: U64::from(meta.timestamp),
                tx_list,
                mix_hash: meta.difficulty,
                extra_data: Bytes::copy_from_slice(meta.extra_data.as_slice()),
            },
            l1_origin: RpcL1Origin {
                block_id: U64::from(meta.id),
                l2_block_hash: B256::ZERO,
                l1_block_height: U64::from(proposal.l1_block_number),
                l1_block_hash: proposal.l1_block_hash,
            },
        }
    }
}

/// JWT-authenticated engine API client.
#[derive(Debug, Clone)]
pub struct EngineRpcClient {
    client: Arc<AuthHttpClient>,
    timeout: Duration,
}

impl EngineRpcClient {
    pub fn from_url_secret(
        http_url: &str,
        secret: JwtSecret,
        timeout: Duration,
    ) -> RpcResult<Self> {
        Ok(Self {
            client: Arc::new(http_client(http_url, secret)?),
            timeout,
        })
    }

    pub async fn forkchoice_updated(
        &self,
        state: ForkchoiceState,
        attributes: Option<L2PayloadAttributes>,
    ) -> RpcResult<ForkchoiceUpdated> {
        timed(
            "engine_forkchoiceUpdatedV1",
            TARGET,
            self.timeout,
            self.client
                .request("engine_forkchoiceUpdatedV1", rpc_params![state, attributes]),
        )
        .await
    }

    pub async fn get_payload(&self, payload_id: PayloadId) -> RpcResult<ExecutionPayloadV1> {
        timed(
            "engine_getPayloadV1",
            TARGET,
            self.timeout,
            self.client
                .request("engine_getPayloadV1", rpc_params![payload_id]),
        )
        .await
    }

    pub async fn new_payload(&self, payload: ExecutionPayloadV1) -> RpcResult<PayloadStatus> {
        timed(
            "engine_newPayloadV1",
            TARGET,
            self.timeout,
            self.client
                .request("engine_newPayloadV1", rpc_params![payload]),
        )
        .await
    }

    pub async fn exchange_transition_configuration(
        &self,
        config: TransitionConfiguration,
    ) -> RpcResult<TransitionConfiguration> {
        timed(
            "engine_exchangeTransitionConfigurationV1",
            TARGET,
            self.timeout,
            self.client
                .request("engine_exchangeTransitionConfigurationV1", rpc_params![config]),
        )
        .await
    }
}
