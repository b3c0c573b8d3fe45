use std::{
    future::IntoFuture,
    time::{Duration, Instant},
};

use keel_common::metrics::observe_rpc_call;

use crate::{RpcError, RpcResult};

/// Runs one remote call under a deadline and records its metrics.
pub(crate) async fn timed<T, E, F>(
    method: &'static str,
    target: &'static str,
    timeout: Duration,
    fut: F,
) -> RpcResult<T>
where
    F: IntoFuture<Output = Result<T, E>>,
    E: Into<RpcError>,
{
    let start = Instant::now();
    let res = match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res.map_err(Into::into),
        Err(_) => Err(RpcError::Timeout { method, timeout }),
    };
    observe_rpc_call(method, target, start, &res);
    res
}
