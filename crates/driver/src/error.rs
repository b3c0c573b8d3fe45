use keel_chain_syncer::SyncError;
use keel_state::StateError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("head state: {0}")]
    State(#[from] StateError),

    #[error("chain syncer: {0}")]
    Sync(#[from] SyncError),

    #[error("driver already started")]
    AlreadyStarted,
}

pub type DriverResult<T> = Result<T, DriverError>;
