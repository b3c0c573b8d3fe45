use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use keel_chain_syncer::{CalldataSyncerConfig, ChainSyncerConfig, L2ChainSyncer};
use keel_config::Config;
use keel_rpc::{BlobClient, CheckpointClient, L1Client, L2EngineClient};
use keel_state::HeadState;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    error::{DriverError, DriverResult},
    event_loop::sync_loop_task,
    status::{status_report_task, transition_config_task},
};

#[derive(Debug, Clone)]
pub struct DriverConfig {
    pub chain_syncer: ChainSyncerConfig,
    pub retry_interval: Duration,
    pub status_report_interval: Duration,
    pub transition_config_interval: Duration,
}

impl DriverConfig {
    pub fn from_config(config: &Config) -> Self {
        let sync = &config.sync;
        Self {
            chain_syncer: ChainSyncerConfig {
                p2p_sync_enabled: sync.p2p_sync_enabled,
                p2p_sync_timeout: sync.p2p_sync_timeout(),
                progress_check_interval: sync.progress_check_interval(),
                calldata: CalldataSyncerConfig {
                    anchor_address: config.contracts.anchor_address,
                    max_reorg_search_depth: sync.max_reorg_search_depth,
                    max_txs_per_block: sync.max_txs_per_block,
                },
            },
            retry_interval: sync.retry_interval(),
            status_report_interval: sync.status_report_interval(),
            transition_config_interval: sync.transition_config_interval(),
        }
    }
}

/// Remote endpoints the driver talks to.
#[derive(Clone)]
pub struct DriverClients {
    pub l1: Arc<dyn L1Client>,
    pub l2: Arc<dyn L2EngineClient>,
    /// Only needed for P2P sync.
    pub checkpoint: Option<Arc<dyn CheckpointClient>>,
    pub blobs: Arc<dyn BlobClient>,
}

impl fmt::Debug for DriverClients {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverClients")
            .field("checkpoint", &self.checkpoint.is_some())
            .finish_non_exhaustive()
    }
}

/// Owns the sync components and the tasks that run them.
pub struct Driver {
    config: DriverConfig,
    l1: Arc<dyn L1Client>,
    l2: Arc<dyn L2EngineClient>,
    state: Arc<HeadState>,
    chain_syncer: Arc<L2ChainSyncer>,
    cancel: CancellationToken,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("state", &self.state)
            .field("chain_syncer", &self.chain_syncer)
            .finish_non_exhaustive()
    }
}

impl Driver {
    pub async fn new(config: DriverConfig, clients: DriverClients) -> DriverResult<Self> {
        let DriverClients {
            l1,
            l2,
            checkpoint,
            blobs,
        } = clients;

        let state = Arc::new(HeadState::new(l1.clone(), l2.clone()).await?);
        let chain_syncer = Arc::new(
            L2ChainSyncer::new(
                state.clone(),
                l1.clone(),
                l2.clone(),
                checkpoint,
                blobs,
                config.chain_syncer.clone(),
            )
            .await?,
        );

        Ok(Self {
            config,
            l1,
            l2,
            state,
            chain_syncer,
            cancel: CancellationToken::new(),
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn chain_syncer(&self) -> &Arc<L2ChainSyncer> {
        &self.chain_syncer
    }

    pub fn state(&self) -> &Arc<HeadState> {
        &self.state
    }

    /// Spawns the head watchers, the P2P sync watchdog, the sync loop and the periodic
    /// status tasks. Can only be called once.
    pub async fn start(&self) -> DriverResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(DriverError::AlreadyStarted);
        }

        match self.l2.peer_count().await {
            Ok(peers) => info!(%peers, "execution engine peers"),
            Err(err) => warn!(%err, "failed to read execution engine peer count"),
        }

        // Subscribe before spawning so no head published in between is missed.
        let l1_heads = self.state.subscribe_l1_heads();

        let mut tasks = self.state.spawn_watchers(self.cancel.clone());

        let tracker = self.chain_syncer.progress_tracker().clone();
        let cancel = self.cancel.clone();
        tasks.push(tokio::spawn(async move { tracker.track(cancel).await }));

        tasks.push(tokio::spawn(sync_loop_task(
            self.chain_syncer.clone(),
            self.state.clone(),
            l1_heads,
            self.config.retry_interval,
            self.cancel.clone(),
        )));
        tasks.push(tokio::spawn(status_report_task(
            self.l1.clone(),
            self.config.status_report_interval,
            self.cancel.clone(),
        )));
        tasks.push(tokio::spawn(transition_config_task(
            self.l2.clone(),
            self.config.transition_config_interval,
            self.cancel.clone(),
        )));

        self.tasks.lock().extend(tasks);
        info!(
            l1_head = %self.state.l1_head(),
            l2_head = %self.state.l2_head(),
            "driver started"
        );
        Ok(())
    }

    /// Cancels every task and waits for them to stop.
    pub async fn close(&self) {
        self.cancel.cancel();
        self.state.close();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(err) = task.await {
                warn!(%err, "driver task did not stop cleanly");
            }
        }
        info!("driver stopped");
    }
}
