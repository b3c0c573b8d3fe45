use keel_rpc::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("rpc: {0}")]
    Rpc(#[from] RpcError),

    #[error("missing L1 header at height {0}")]
    MissingL1Header(u64),

    #[error("execution engine has no head block")]
    MissingL2Head,
}

pub type StateResult<T> = Result<T, StateError>;
