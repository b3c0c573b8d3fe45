/// Snapshot of the inbox contract's state variables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolStateVars {
    /// L1 height at which the inbox was deployed.
    pub genesis_height: u64,
    pub genesis_timestamp: u64,
    /// Number of proposed blocks, including the genesis block.
    pub num_blocks: u64,
    pub last_verified_block_id: u64,
}

impl ProtocolStateVars {
    /// Blocks proposed but not yet verified.
    pub fn pending_blocks(&self) -> u64 {
        self.num_blocks
            .saturating_sub(self.last_verified_block_id)
            .saturating_sub(1)
    }
}

/// Static inbox configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProtocolConfig {
    pub chain_id: u64,
    pub block_max_proposals: u64,
    pub block_ring_buffer_size: u64,
    pub block_max_gas_limit: u32,
    pub block_max_tx_list_bytes: u64,
}

impl ProtocolConfig {
    /// Proposal slots still available given the current state.
    pub fn available_slots(&self, vars: &ProtocolStateVars) -> u64 {
        self.block_max_proposals.saturating_sub(vars.pending_blocks())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pending_and_available_slots() {
        let vars = ProtocolStateVars {
            genesis_height: 100,
            genesis_timestamp: 0,
            num_blocks: 11,
            last_verified_block_id: 4,
        };
        let config = ProtocolConfig {
            block_max_proposals: 8,
            ..Default::default()
        };

        assert_eq!(vars.pending_blocks(), 6);
        assert_eq!(config.available_slots(&vars), 2);
    }

    #[test]
    fn test_pending_never_underflows() {
        let vars = ProtocolStateVars {
            num_blocks: 1,
            last_verified_block_id: 0,
            ..Default::default()
        };
        assert_eq!(vars.pending_blocks(), 0);

        let config = ProtocolConfig::default();
        let busy = ProtocolStateVars {
            num_blocks: 50,
            ..Default::default()
        };
        assert_eq!(config.available_slots(&busy), 0);
    }
}
