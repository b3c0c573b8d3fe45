//! Typed access to the L1 node, the L2 execution engine, the checkpoint node and the beacon
//! node.
//!
//! Each remote is described by a trait so the sync logic can run against in-memory fakes;
//! the concrete clients wrap alloy providers, a JWT-authenticated jsonrpsee client and a
//! reqwest beacon client.

mod beacon;
mod bindings;
mod checkpoint;
mod convert;
mod engine;
mod error;
mod l1;
mod l2;
mod timing;
mod traits;

pub use beacon::{kzg_to_versioned_hash, BeaconBlobClient};
pub use bindings::{anchorCall, IInbox, ITaikoL2};
pub use checkpoint::CheckpointRpcClient;
pub use engine::{EngineRpcClient, L2BlockMetadata, L2PayloadAttributes, RpcL1Origin};
pub use error::{RpcError, RpcResult};
pub use l1::L1RpcClient;
pub use l2::L2RpcClient;
#[cfg(feature = "test-utils")]
pub use traits::{MockBlobClient, MockCheckpointClient, MockL1Client, MockL2EngineClient};
pub use traits::{BlobClient, CheckpointClient, HeaderStream, L1Client, L2EngineClient};
