use keel_rpc::RpcError;
use keel_state::StateError;
use thiserror::Error;

/// Errors that abort a sync attempt.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("rpc: {0}")]
    Rpc(#[from] RpcError),

    #[error("head state: {0}")]
    State(#[from] StateError),

    /// The engine answered with a status other than the one required.
    #[error("{method} returned {status}")]
    Engine { method: &'static str, status: String },

    #[error("parent block {0} not found in execution engine")]
    MissingParent(u64),

    #[error("block {0} not found in execution engine")]
    MissingBlock(u64),

    #[error("missing L1 header at height {0}")]
    MissingL1Header(u64),

    #[error("checkpoint node has no block {0}")]
    MissingCheckpointBlock(u64),

    #[error("no common ancestor for block {block_id} within {depth} blocks")]
    NoCommonAncestor { block_id: u64, depth: u64 },

    #[error("anchor transaction: {0}")]
    Anchor(String),
}

impl SyncError {
    /// Whether the error is expected to clear on a later attempt without operator action.
    pub fn is_recoverable(&self) -> bool {
        !self.is_fatal()
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::NoCommonAncestor { .. } | SyncError::Anchor(_)
        )
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
