use alloy_primitives::{Address, B256};

/// Metadata of a single L2 block as recorded by the L1 inbox contract.
///
/// This is the authoritative input for rebuilding one L2 block: together with the referenced
/// transaction list it fully determines the block contents.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BlockMetadata {
    /// L2 block id, equal to the L2 block number.
    pub id: u64,
    /// L1 block the proposal anchors to.
    pub l1_height: u64,
    pub l1_hash: B256,
    pub beneficiary: Address,
    pub gas_limit: u32,
    pub timestamp: u64,
    pub tx_list_hash: B256,
    pub tx_list_byte_offset: u32,
    pub tx_list_byte_size: u32,
    /// Whether the tx list lives in a blob instead of the proposing call's calldata.
    pub blob_used: bool,
    pub blob_hash: B256,
    /// Used as `prevRandao` of the built block.
    pub difficulty: B256,
    pub extra_data: B256,
}

/// A block proposal event observed on L1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedBlock {
    pub meta: BlockMetadata,
    /// L1 block that emitted the event.
    pub l1_block_number: u64,
    pub l1_block_hash: B256,
    /// Transaction carrying the proposal, used to recover calldata tx lists.
    pub tx_hash: B256,
    pub log_index: u64,
}

impl ProposedBlock {
    pub fn block_id(&self) -> u64 {
        self.meta.id
    }
}
