//! Conversions from wire types into driver primitives.

use alloy::rpc::types::{Block, Header, Log};
use alloy_eips::eip2718::Encodable2718;
use alloy_primitives::{Bytes, U256, U64};
use alloy_rpc_types_engine::ExecutionPayloadV1;
use keel_primitives::{BlockHeader, BlockMetadata, ProposedBlock, SyncProgress};
use serde::Deserialize;

use crate::{bindings::IInbox, RpcError, RpcResult};

pub(crate) fn header_from_rpc(header: &Header) -> BlockHeader {
    BlockHeader {
        number: header.inner.number,
        hash: header.hash,
        parent_hash: header.inner.parent_hash,
        timestamp: header.inner.timestamp,
        state_root: header.inner.state_root,
        gas_used: header.inner.gas_used,
        base_fee_per_gas: header.inner.base_fee_per_gas,
    }
}

fn metadata_from_event(meta: &IInbox::BlockMetadata) -> BlockMetadata {
    BlockMetadata {
        id: meta.id,
        l1_height: meta.l1Height,
        l1_hash: meta.l1Hash,
        beneficiary: meta.coinbase,
        gas_limit: meta.gasLimit,
        timestamp: meta.timestamp,
        tx_list_hash: meta.txListHash,
        tx_list_byte_offset: meta.txListByteOffset,
        tx_list_byte_size: meta.txListByteSize,
        blob_used: meta.blobUsed,
        blob_hash: meta.blobHash,
        difficulty: meta.difficulty,
        extra_data: meta.extraData,
    }
}

pub(crate) fn proposed_block_from_log(log: &Log) -> RpcResult<ProposedBlock> {
    let decoded = log.log_decode::<IInbox::BlockProposed>()?;
    let event = &decoded.inner.data;

    let missing = |field: &str| RpcError::UnexpectedResponse(format!("log without {field}"));

    Ok(ProposedBlock {
        meta: metadata_from_event(&event.meta),
        l1_block_number: log.block_number.ok_or_else(|| missing("block number"))?,
        l1_block_hash: log.block_hash.ok_or_else(|| missing("block hash"))?,
        tx_hash: log.transaction_hash.ok_or_else(|| missing("tx hash"))?,
        log_index: log.log_index.ok_or_else(|| missing("log index"))?,
    })
}

/// Rebuilds the execution payload of a full block fetched over the eth namespace.
pub(crate) fn payload_from_block(block: &Block) -> RpcResult<ExecutionPayloadV1> {
    let txs = block.transactions.as_transactions().ok_or_else(|| {
        RpcError::UnexpectedResponse(format!(
            "block {} fetched without full transactions",
            block.header.hash
        ))
    })?;

    let header = &block.header.inner;
    Ok(ExecutionPayloadV1 {
        parent_hash: header.parent_hash,
        fee_recipient: header.beneficiary,
        state_root: header.state_root,
        receipts_root: header.receipts_root,
        logs_bloom: header.logs_bloom,
        prev_randao: header.mix_hash,
        block_number: header.number,
        gas_limit: header.gas_limit,
        gas_used: header.gas_used,
        timestamp: header.timestamp,
        extra_data: header.extra_data.clone(),
        base_fee_per_gas: U256::from(header.base_fee_per_gas.unwrap_or_default()),
        block_hash: block.header.hash,
        transactions: txs
            .iter()
            .map(|tx| Bytes::from(tx.inner.inner().encoded_2718()))
            .collect(),
    })
}

/// `eth_syncing` result: `false`, or a progress object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawSyncStatus {
    NotSyncing(bool),
    Syncing(RawSyncProgress),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSyncProgress {
    starting_block: U64,
    current_block: U64,
    highest_block: U64,
    #[serde(default)]
    synced_accounts: U64,
    #[serde(default)]
    synced_storage: U64,
}

impl RawSyncStatus {
    pub(crate) fn into_progress(self) -> Option<SyncProgress> {
        match self {
            RawSyncStatus::NotSyncing(_) => None,
            RawSyncStatus::Syncing(p) => Some(SyncProgress {
                starting_block: p.starting_block.to(),
                current_block: p.current_block.to(),
                highest_block: p.highest_block.to(),
                synced_accounts: p.synced_accounts.to(),
                synced_storage: p.synced_storage.to(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_sync_status_not_syncing() {
        let status: RawSyncStatus = serde_json::from_value(json!(false)).unwrap();
        assert_eq!(status.into_progress(), None);
    }

    #[test]
    fn test_sync_status_syncing() {
        let status: RawSyncStatus = serde_json::from_value(json!({
            "startingBlock": "0x0",
            "currentBlock": "0x64",
            "highestBlock": "0x3e8",
            "syncedAccounts": "0x10",
        }))
        .unwrap();

        let progress = status.into_progress().unwrap();
        assert_eq!(progress.current_block, 100);
        assert_eq!(progress.highest_block, 1000);
        assert_eq!(progress.synced_accounts, 16);
        assert_eq!(progress.synced_storage, 0);
    }
}
