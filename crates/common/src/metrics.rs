//! Prometheus metrics for the driver's sync pipeline.
//!
//! Covers:
//! - chain head heights as seen by the driver (L1 head, L1 replay cursor, L2 head)
//! - block insertion, reorg and sync-attempt counters
//! - RPC call timing per target

use std::time::Instant;

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec,
    register_int_gauge_vec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGaugeVec,
    Registry,
};

lazy_static! {
    /// Global registry for all metrics
    pub static ref REGISTRY: Registry = Registry::new();

    // ==================== Chain Metrics ====================

    /// Gauge tracking head heights known to the driver
    /// Labels: chain=[l1_head|l1_cursor|l2_head]
    pub static ref CHAIN_HEAD_HEIGHT: IntGaugeVec = register_int_gauge_vec!(
        "keel_chain_head_height",
        "Latest block height known to the driver",
        &["chain"]
    )
    .expect("metric definition is valid");

    /// Counter for L2 blocks inserted through event replay
    pub static ref L2_BLOCKS_INSERTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        "keel_l2_blocks_inserted_total",
        "Total number of L2 blocks inserted from L1 proposals",
        &["source"] // source=[calldata|blob]
    )
    .expect("metric definition is valid");

    /// Counter for L1 reorgs that rewound the L2 chain
    pub static ref L1_REORGS_TOTAL: IntCounter = register_int_counter!(
        "keel_l1_reorgs_total",
        "Total number of L1 reorgs handled"
    )
    .expect("metric definition is valid");

    /// Counter for sync attempts by outcome
    pub static ref SYNC_ATTEMPTS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "keel_sync_attempts_total",
        "Total number of sync attempts",
        &["outcome"] // outcome=[success|failed|fatal]
    )
    .expect("metric definition is valid");

    /// Counter for beacon sync triggers sent to the execution engine
    pub static ref BEACON_SYNC_TRIGGERS_TOTAL: IntCounter = register_int_counter!(
        "keel_beacon_sync_triggers_total",
        "Total number of beacon syncs triggered"
    )
    .expect("metric definition is valid");

    /// Gauge tracking the inbox block slots
    /// Labels: kind=[pending|available]
    pub static ref PROTOCOL_BLOCK_SLOTS: IntGaugeVec = register_int_gauge_vec!(
        "keel_protocol_block_slots",
        "Inbox block slots by kind",
        &["kind"]
    )
    .expect("metric definition is valid");

    // ==================== RPC Metrics ====================

    /// Histogram tracking RPC call duration
    /// Labels: method, target=[l1|l2|engine|checkpoint|beacon]
    pub static ref RPC_CALL_DURATION: HistogramVec = register_histogram_vec!(
        HistogramOpts::new("keel_rpc_call_duration_seconds", "Time spent in RPC calls")
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["method", "target"]
    )
    .expect("metric definition is valid");

    /// Counter for RPC calls by status
    pub static ref RPC_CALLS_TOTAL: IntCounterVec = register_int_counter_vec!(
        "keel_rpc_calls_total",
        "Total number of RPC calls",
        &["method", "target", "status"] // status=[success|failed]
    )
    .expect("metric definition is valid");
}

/// Registers all metrics with [`REGISTRY`].
pub fn register_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(CHAIN_HEAD_HEIGHT.clone()))?;
    REGISTRY.register(Box::new(L2_BLOCKS_INSERTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(L1_REORGS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(SYNC_ATTEMPTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(BEACON_SYNC_TRIGGERS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROTOCOL_BLOCK_SLOTS.clone()))?;
    REGISTRY.register(Box::new(RPC_CALL_DURATION.clone()))?;
    REGISTRY.register(Box::new(RPC_CALLS_TOTAL.clone()))?;
    Ok(())
}

/// Records the outcome of a single RPC call.
pub fn observe_rpc_call<T, E>(method: &str, target: &str, start: Instant, result: &Result<T, E>) {
    RPC_CALL_DURATION
        .with_label_values(&[method, target])
        .observe(start.elapsed().as_secs_f64());

    let status = if result.is_ok() { "success" } else { "failed" };
    RPC_CALLS_TOTAL
        .with_label_values(&[method, target, status])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_rpc_call_counts_by_status() {
        let ok: Result<(), ()> = Ok(());
        let err: Result<(), ()> = Err(());

        let before_ok = RPC_CALLS_TOTAL
            .with_label_values(&["test_method", "test", "success"])
            .get();
        let before_err = RPC_CALLS_TOTAL
            .with_label_values(&["test_method", "test", "failed"])
            .get();

        observe_rpc_call("test_method", "test", Instant::now(), &ok);
        observe_rpc_call("test_method", "test", Instant::now(), &err);
        observe_rpc_call("test_method", "test", Instant::now(), &err);

        assert_eq!(
            RPC_CALLS_TOTAL
                .with_label_values(&["test_method", "test", "success"])
                .get(),
            before_ok + 1
        );
        assert_eq!(
            RPC_CALLS_TOTAL
                .with_label_values(&["test_method", "test", "failed"])
                .get(),
            before_err + 2
        );
    }
}
