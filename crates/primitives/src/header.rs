use std::fmt;

use alloy_primitives::B256;

/// Minimal view of an L1 or L2 block header.
///
/// Heads are replaced as a whole whenever a new one is observed, so this is a plain `Copy`
/// value with no interior mutability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlockHeader {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub state_root: B256,
    pub gas_used: u64,
    pub base_fee_per_gas: Option<u64>,
}

impl BlockHeader {
    /// Creates a header from the fields every consumer relies on.
    pub fn new(number: u64, hash: B256, parent_hash: B256) -> Self {
        Self {
            number,
            hash,
            parent_hash,
            ..Default::default()
        }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_state_root(mut self, state_root: B256) -> Self {
        self.state_root = state_root;
        self
    }

    pub fn with_gas_used(mut self, gas_used: u64) -> Self {
        self.gas_used = gas_used;
        self
    }

    pub fn with_base_fee(mut self, base_fee_per_gas: u64) -> Self {
        self.base_fee_per_gas = Some(base_fee_per_gas);
        self
    }

    /// Returns true if `self` directly extends `parent`.
    pub fn is_child_of(&self, parent: &BlockHeader) -> bool {
        self.number == parent.number + 1 && self.parent_hash == parent.hash
    }
}

impl fmt::Display for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.number, self.hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_child_of() {
        let parent = BlockHeader::new(10, B256::repeat_byte(1), B256::ZERO);
        let child = BlockHeader::new(11, B256::repeat_byte(2), B256::repeat_byte(1));
        let orphan = BlockHeader::new(11, B256::repeat_byte(3), B256::repeat_byte(9));

        assert!(child.is_child_of(&parent));
        assert!(!orphan.is_child_of(&parent));
        assert!(!parent.is_child_of(&child));
    }

    #[test]
    fn test_display() {
        let header = BlockHeader::new(7, B256::ZERO, B256::ZERO);
        assert!(header.to_string().starts_with("7@0x0000"));
    }
}
