//! Core chain types shared by the keel driver crates.

mod block;
mod header;
mod l1_origin;
mod protocol;
mod sync_progress;

pub use block::{BlockMetadata, ProposedBlock};
pub use header::BlockHeader;
pub use l1_origin::L1Origin;
pub use protocol::{ProtocolConfig, ProtocolStateVars};
pub use sync_progress::SyncProgress;
