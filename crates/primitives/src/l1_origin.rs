use alloy_primitives::B256;

/// Links an L2 block to the L1 block whose proposal produced it.
///
/// The execution engine records one of these for every block inserted through payload
/// attributes. Blocks that arrived over P2P have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct L1Origin {
    pub block_id: u64,
    pub l2_block_hash: B256,
    pub l1_block_height: u64,
    pub l1_block_hash: B256,
}
