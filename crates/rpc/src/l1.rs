use std::time::Duration;

use alloy::{
    providers::{DynProvider, Provider, ProviderBuilder, WsConnect},
    rpc::types::{Filter, TransactionInput, TransactionRequest},
};
use alloy_consensus::Transaction as _;
use alloy_eips::BlockNumberOrTag;
use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use futures::StreamExt;
use keel_primitives::{BlockHeader, ProposedBlock, ProtocolConfig, ProtocolStateVars};
use tracing::debug;

use crate::{
    bindings::IInbox,
    convert::{header_from_rpc, proposed_block_from_log},
    timing::timed,
    HeaderStream, L1Client, RpcError, RpcResult,
};

const TARGET: &str = "l1";

/// L1 node client over a websocket provider.
#[derive(Debug, Clone)]
pub struct L1RpcClient {
    provider: DynProvider,
    inbox: Address,
    timeout: Duration,
}

impl L1RpcClient {
    pub async fn connect(ws_url: &str, inbox: Address, timeout: Duration) -> RpcResult<Self> {
        let provider = ProviderBuilder::new()
            .connect_ws(WsConnect::new(ws_url))
            .await?
            .erased();
        debug!(%ws_url, %inbox, "connected to L1");
        Ok(Self {
            provider,
            inbox,
            timeout,
        })
    }

    async fn call_inbox<C: SolCall + Send>(
        &self,
        method: &'static str,
        call: C,
    ) -> RpcResult<C::Return> {
        let req = TransactionRequest::default()
            .to(self.inbox)
            .input(TransactionInput::new(call.abi_encode().into()));
        let out = timed(method, TARGET, self.timeout, self.provider.call(req)).await?;
        Ok(C::abi_decode_returns(&out)?)
    }

    async fn header(&self, block: BlockNumberOrTag) -> RpcResult<Option<BlockHeader>> {
        let block = timed(
            "eth_getBlockByNumber",
            TARGET,
            self.timeout,
            self.provider.get_block_by_number(block),
        )
        .await?;
        Ok(block.map(|b| header_from_rpc(&b.header)))
    }
}

#[async_trait]
impl L1Client for L1RpcClient {
    async fn block_number(&self) -> RpcResult<u64> {
        timed(
            "eth_blockNumber",
            TARGET,
            self.timeout,
            self.provider.get_block_number(),
        )
        .await
    }

    async fn header_by_number(&self, number: u64) -> RpcResult<Option<BlockHeader>> {
        self.header(BlockNumberOrTag::Number(number)).await
    }

    async fn subscribe_new_heads(&self) -> RpcResult<HeaderStream> {
        let sub = self.provider.subscribe_blocks().await?;
        Ok(sub
            .into_stream()
            .map(|header| header_from_rpc(&header))
            .boxed())
    }

    async fn block_proposed_events(&self, from: u64, to: u64) -> RpcResult<Vec<ProposedBlock>> {
        let filter = Filter::new()
            .address(self.inbox)
            .event_signature(IInbox::BlockProposed::SIGNATURE_HASH)
            .from_block(from)
            .to_block(to);

        let logs = timed(
            "eth_getLogs",
            TARGET,
            self.timeout,
            self.provider.get_logs(&filter),
        )
        .await?;

        let mut events = logs
            .iter()
            .map(proposed_block_from_log)
            .collect::<RpcResult<Vec<_>>>()?;
        events.sort_by_key(|e| (e.l1_block_number, e.log_index));
        Ok(events)
    }

    async fn proposal_tx_list(&self, tx_hash: B256) -> RpcResult<Bytes> {
        let tx = timed(
            "eth_getTransactionByHash",
            TARGET,
            self.timeout,
            self.provider.get_transaction_by_hash(tx_hash),
        )
        .await?
        .ok_or_else(|| RpcError::NotFound(format!("proposal tx {tx_hash}")))?;

        let call = IInbox::proposeBlockCall::abi_decode(tx.input())?;
        Ok(call.txList)
    }

    async fn protocol_state_vars(&self) -> RpcResult<ProtocolStateVars> {
        let vars = self
            .call_inbox("getStateVariables", IInbox::getStateVariablesCall {})
            .await?;
        Ok(ProtocolStateVars {
            genesis_height: vars.a.genesisHeight,
            genesis_timestamp: vars.a.genesisTimestamp,
            num_blocks: vars.b.numBlocks,
            last_verified_block_id: vars.b.lastVerifiedBlockId,
        })
    }

    async fn protocol_config(&self) -> RpcResult<ProtocolConfig> {
        let config = self
            .call_inbox("getConfig", IInbox::getConfigCall {})
            .await?;
        Ok(ProtocolConfig {
            chain_id: config.chainId,
            block_max_proposals: config.blockMaxProposals,
            block_ring_buffer_size: config.blockRingBufferSize,
            block_max_gas_limit: config.blockMaxGasLimit,
            block_max_tx_list_bytes: config.blockMaxTxListBytes,
        })
    }

    async fn proposed_in(&self, block_id: u64) -> RpcResult<u64> {
        let block = self
            .call_inbox("getBlock", IInbox::getBlockCall { blockId: block_id })
            .await?;
        Ok(block.proposedIn)
    }
}
