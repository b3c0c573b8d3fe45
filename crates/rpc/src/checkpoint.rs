use std::time::Duration;

use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy_eips::BlockNumberOrTag;
use alloy_rpc_types_engine::ExecutionPayloadV1;
use async_trait::async_trait;

use crate::{convert::payload_from_block, timing::timed, CheckpointClient, RpcResult};

const TARGET: &str = "checkpoint";

/// Client of the trusted node that serves beacon sync targets.
#[derive(Debug, Clone)]
pub struct CheckpointRpcClient {
    provider: DynProvider,
    timeout: Duration,
}

impl CheckpointRpcClient {
    pub async fn connect(url: &str, timeout: Duration) -> RpcResult<Self> {
        let provider = ProviderBuilder::new().connect(url).await?.erased();
        Ok(Self { provider, timeout })
    }
}

#[async_trait]
impl CheckpointClient for CheckpointRpcClient {
    async fn payload_by_number(&self, number: u64) -> RpcResult<Option<ExecutionPayloadV1>> {
        let block = timed(
            "eth_getBlockByNumber",
            TARGET,
            self.timeout,
            self.provider
                .get_block_by_number(BlockNumberOrTag::Number(number))
                .full(),
        )
        .await?;

        block.as_ref().map(payload_from_block).transpose()
    }
}
