/// Execution engine P2P sync status, as reported by `eth_syncing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SyncProgress {
    pub starting_block: u64,
    pub current_block: u64,
    pub highest_block: u64,
    pub synced_accounts: u64,
    pub synced_storage: u64,
}

impl SyncProgress {
    /// Returns true if `self` shows forward movement compared to `prev`.
    pub fn advanced_since(&self, prev: &SyncProgress) -> bool {
        self.current_block > prev.current_block
            || self.synced_accounts > prev.synced_accounts
            || self.synced_storage > prev.synced_storage
    }
}
