//! Periodic background tasks that only observe or ping the remotes.

use std::{sync::Arc, time::Duration};

use alloy_rpc_types_engine::TransitionConfiguration;
use keel_common::metrics::PROTOCOL_BLOCK_SLOTS;
use keel_rpc::{L1Client, L2EngineClient, RpcResult};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Inbox block slot usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolStatus {
    pub pending: u64,
    pub available: u64,
    pub last_verified_block_id: u64,
}

pub async fn report_protocol_status(l1: &dyn L1Client) -> RpcResult<ProtocolStatus> {
    let vars = l1.protocol_state_vars().await?;
    let config = l1.protocol_config().await?;

    let status = ProtocolStatus {
        pending: vars.pending_blocks(),
        available: config.available_slots(&vars),
        last_verified_block_id: vars.last_verified_block_id,
    };

    PROTOCOL_BLOCK_SLOTS
        .with_label_values(&["pending"])
        .set(status.pending as i64);
    PROTOCOL_BLOCK_SLOTS
        .with_label_values(&["available"])
        .set(status.available as i64);
    info!(
        pending = status.pending,
        available = status.available,
        last_verified = status.last_verified_block_id,
        num_blocks = vars.num_blocks,
        "protocol status"
    );
    Ok(status)
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

pub(crate) async fn status_report_task(
    l1: Arc<dyn L1Client>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(err) = report_protocol_status(l1.as_ref()).await {
                    warn!(%err, "failed to read protocol status");
                }
            }
        }
    }
    debug!("status reporter stopped");
}

/// Keeps the engine's transition configuration check satisfied.
pub(crate) async fn transition_config_task(
    l2: Arc<dyn L2EngineClient>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = ticker(period);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match l2
                    .exchange_transition_configuration(TransitionConfiguration::default())
                    .await
                {
                    Ok(config) => debug!(?config, "exchanged transition configuration"),
                    Err(err) => warn!(%err, "failed to exchange transition configuration"),
                }
            }
        }
    }
    debug!("transition config exchange stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, Ordering};

    use keel_primitives::{ProtocolConfig, ProtocolStateVars};
    use keel_rpc::{MockL1Client, MockL2EngineClient, RpcError};

    use super::*;

    #[tokio::test]
    async fn test_report_protocol_status() {
        let mut l1 = MockL1Client::new();
        l1.expect_protocol_state_vars().returning(|| {
            Ok(ProtocolStateVars {
                num_blocks: 21,
                last_verified_block_id: 10,
                ..Default::default()
            })
        });
        l1.expect_protocol_config().returning(|| {
            Ok(ProtocolConfig {
                block_max_proposals: 16,
                ..Default::default()
            })
        });

        let status = report_protocol_status(&l1).await.unwrap();

        assert_eq!(
            status,
            ProtocolStatus {
                pending: 10,
                available: 6,
                last_verified_block_id: 10,
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reporter_survives_errors() {
        let calls = Arc::new(AtomicU64::new(0));
        let mut l1 = MockL1Client::new();
        {
            let calls = calls.clone();
            l1.expect_protocol_state_vars().returning(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(RpcError::NotFound("state".into()))
            });
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(status_report_task(
            Arc::new(l1),
            Duration::from_secs(30),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(95)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_config_exchanged_periodically() {
        let mut l2 = MockL2EngineClient::new();
        l2.expect_exchange_transition_configuration()
            .times(3)
            .returning(Ok);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(transition_config_task(
            Arc::new(l2),
            Duration::from_secs(60),
            cancel.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(150)).await;
        cancel.cancel();
        task.await.unwrap();
    }
}
