use std::{sync::Arc, time::Duration};

use keel_chain_syncer::L2ChainSyncer;
use keel_common::{
    metrics::SYNC_ATTEMPTS_TOTAL,
    retry::{policies::ConstantBackoff, retry_with_backoff_async},
};
use keel_primitives::BlockHeader;
use keel_state::HeadState;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Drives the chain syncer: one pass right away, then one per new L1 head.
///
/// New heads that arrive while a pass is running collapse into a single pending request, so
/// the syncer never falls behind a queue of stale heads.
pub(crate) async fn sync_loop_task(
    syncer: Arc<L2ChainSyncer>,
    state: Arc<HeadState>,
    mut l1_heads: mpsc::UnboundedReceiver<BlockHeader>,
    retry_interval: Duration,
    cancel: CancellationToken,
) {
    let backoff = ConstantBackoff::new(retry_interval);
    let (request_tx, mut request_rx) = mpsc::channel::<()>(1);

    if sync_with_retry(&syncer, &state, &backoff, &cancel)
        .await
        .is_none()
    {
        return;
    }

    loop {
        // Queued heads are drained before a pending request runs, so a backlog costs one pass.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            head = l1_heads.recv() => match head {
                Some(head) => request_sync(&request_tx, &head),
                None => {
                    info!("L1 head feed closed");
                    break;
                }
            },
            Some(()) = request_rx.recv() => {
                if sync_with_retry(&syncer, &state, &backoff, &cancel).await.is_none() {
                    break;
                }
            }
        }
    }
    debug!("sync loop stopped");
}

fn request_sync(request_tx: &mpsc::Sender<()>, head: &BlockHeader) {
    match request_tx.try_send(()) {
        Ok(()) => debug!(l1_head = %head, "sync requested"),
        Err(TrySendError::Full(())) => debug!(l1_head = %head, "sync already pending"),
        Err(TrySendError::Closed(())) => {}
    }
}

/// Runs sync passes until one succeeds. Returns `None` if cancelled first.
async fn sync_with_retry(
    syncer: &L2ChainSyncer,
    state: &HeadState,
    backoff: &ConstantBackoff,
    cancel: &CancellationToken,
) -> Option<()> {
    retry_with_backoff_async("l2_chain_sync", backoff, cancel, || async move {
        let l1_end = state.l1_head();
        let res = syncer.sync(l1_end).await;
        let outcome = match &res {
            Ok(()) => "success",
            Err(err) if err.is_fatal() => {
                error!(%err, %l1_end, "sync attempt hit an unrecoverable error");
                "fatal"
            }
            Err(_) => "failed",
        };
        SYNC_ATTEMPTS_TOTAL.with_label_values(&[outcome]).inc();
        res
    })
    .await
}
