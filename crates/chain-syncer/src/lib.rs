//! Keeps the L2 execution engine in sync with the chain recorded on L1.
//!
//! [`L2ChainSyncer`] decides on every attempt whether to let the engine catch up over P2P
//! through the [`BeaconSyncer`] or to rebuild blocks from L1 proposals through the
//! [`CalldataSyncer`]. The [`SyncProgressTracker`] watches a running P2P sync and flags it
//! once it stalls.

mod beacon;
pub mod calldata;
mod error;
mod progress;
mod syncer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;


pub use beacon::BeaconSyncer;
pub use calldata::{CalldataSyncer, CalldataSyncerConfig};
pub use error::{SyncError, SyncResult};
pub use progress::{SyncProgressTracker, TrackerState, DEFAULT_CHECK_INTERVAL};
pub use syncer::{
    ahead_of_head_to_sync, next_sync_step, ChainSyncerConfig, L2ChainSyncer, SyncInputs,
    SyncMode, SyncStep,
};
