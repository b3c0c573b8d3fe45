use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::StreamExt;
use keel_common::metrics::CHAIN_HEAD_HEIGHT;
use keel_primitives::BlockHeader;
use keel_rpc::{HeaderStream, L1Client, L2EngineClient, RpcResult};
use parking_lot::{Mutex, RwLock};
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{StateError, StateResult};

/// Wait before re-subscribing after a head subscription ended or failed.
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Chain {
    L1,
    L2,
}

impl Chain {
    fn as_str(self) -> &'static str {
        match self {
            Chain::L1 => "l1",
            Chain::L2 => "l2",
        }
    }
}

/// Latest known chain heads plus the L1 replay cursor.
///
/// Each head is replaced as a whole; readers always see a complete header. There is no
/// ordering guarantee between different heads.
pub struct HeadState {
    l1: Arc<dyn L1Client>,
    l2: Arc<dyn L2EngineClient>,
    genesis_l1_height: u64,
    l1_head: RwLock<BlockHeader>,
    l2_head: RwLock<BlockHeader>,
    l1_current: RwLock<BlockHeader>,
    head_block_id: AtomicU64,
    l1_subscribers: Mutex<Vec<mpsc::UnboundedSender<BlockHeader>>>,
    closed: CancellationToken,
}

impl fmt::Debug for HeadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeadState")
            .field("genesis_l1_height", &self.genesis_l1_height)
            .field("l1_head", &*self.l1_head.read())
            .field("l2_head", &*self.l2_head.read())
            .field("l1_current", &*self.l1_current.read())
            .field("head_block_id", &self.head_block_id())
            .finish_non_exhaustive()
    }
}

impl HeadState {
    /// Loads the current heads and positions the replay cursor at the L1 origin of the
    /// local L2 head.
    pub async fn new(l1: Arc<dyn L1Client>, l2: Arc<dyn L2EngineClient>) -> StateResult<Self> {
        let vars = l1.protocol_state_vars().await?;

        let l1_number = l1.block_number().await?;
        let l1_head = l1
            .header_by_number(l1_number)
            .await?
            .ok_or(StateError::MissingL1Header(l1_number))?;
        let l2_head = l2
            .header_by_number(None)
            .await?
            .ok_or(StateError::MissingL2Head)?;

        let state = Self {
            l1,
            l2,
            genesis_l1_height: vars.genesis_height,
            l1_head: RwLock::new(l1_head),
            l2_head: RwLock::new(l2_head),
            l1_current: RwLock::new(l1_head),
            head_block_id: AtomicU64::new(vars.num_blocks.saturating_sub(1)),
            l1_subscribers: Mutex::new(Vec::new()),
            closed: CancellationToken::new(),
        };

        let l1_current = state.reset_l1_current(l2_head.number).await?;

        info!(
            genesis_l1_height = vars.genesis_height,
            %l1_head,
            %l2_head,
            %l1_current,
            "head state initialized"
        );
        Ok(state)
    }

    pub fn genesis_l1_height(&self) -> u64 {
        self.genesis_l1_height
    }

    pub fn l1_head(&self) -> BlockHeader {
        *self.l1_head.read()
    }

    pub fn l2_head(&self) -> BlockHeader {
        *self.l2_head.read()
    }

    pub fn l1_current(&self) -> BlockHeader {
        *self.l1_current.read()
    }

    /// Latest L2 block id known to have been proposed.
    pub fn head_block_id(&self) -> u64 {
        self.head_block_id.load(Ordering::Acquire)
    }

    pub fn set_head_block_id(&self, id: u64) {
        self.head_block_id.fetch_max(id, Ordering::AcqRel);
    }

    /// Replaces the L1 head and publishes it to every live subscriber.
    pub fn update_l1_head(&self, header: BlockHeader) {
        *self.l1_head.write() = header;
        CHAIN_HEAD_HEIGHT
            .with_label_values(&["l1_head"])
            .set(header.number as i64);

        let mut subs = self.l1_subscribers.lock();
        subs.retain(|tx| tx.send(header).is_ok());
    }

    pub fn update_l2_head(&self, header: BlockHeader) {
        *self.l2_head.write() = header;
        CHAIN_HEAD_HEIGHT
            .with_label_values(&["l2_head"])
            .set(header.number as i64);
    }

    pub fn set_l1_current(&self, header: BlockHeader) {
        *self.l1_current.write() = header;
        CHAIN_HEAD_HEIGHT
            .with_label_values(&["l1_cursor"])
            .set(header.number as i64);
    }

    /// Registers a subscriber to the L1 head feed.
    ///
    /// Heads are delivered in the order they were observed. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe_l1_heads(&self) -> mpsc::UnboundedReceiver<BlockHeader> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.l1_subscribers.lock().push(tx);
        rx
    }

    /// Moves the replay cursor to the L1 block that produced `block_id`.
    pub async fn reset_l1_current(&self, block_id: u64) -> StateResult<BlockHeader> {
        let height = if block_id == 0 {
            self.genesis_l1_height
        } else {
            match self.l2.l1_origin_by_id(block_id).await? {
                Some(origin) => origin.l1_block_height,
                None => self.l1.proposed_in(block_id).await?,
            }
        };

        let header = self
            .l1
            .header_by_number(height)
            .await?
            .ok_or(StateError::MissingL1Header(height))?;

        debug!(%block_id, l1_current = %header, "reset L1 cursor");
        self.set_l1_current(header);
        Ok(header)
    }

    /// Spawns the L1 and L2 new-head watchers.
    ///
    /// Watchers stop when `cancel` fires or [`HeadState::close`] is called.
    pub fn spawn_watchers(self: &Arc<Self>, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        [Chain::L1, Chain::L2]
            .into_iter()
            .map(|chain| {
                let state = self.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { state.watch_heads(chain, cancel).await })
            })
            .collect()
    }

    /// Stops the watchers and drops every feed subscriber.
    pub fn close(&self) {
        self.closed.cancel();
        self.l1_subscribers.lock().clear();
    }

    async fn subscribe(&self, chain: Chain) -> RpcResult<HeaderStream> {
        match chain {
            Chain::L1 => self.l1.subscribe_new_heads().await,
            Chain::L2 => self.l2.subscribe_new_heads().await,
        }
    }

    fn update_head(&self, chain: Chain, header: BlockHeader) {
        match chain {
            Chain::L1 => self.update_l1_head(header),
            Chain::L2 => self.update_l2_head(header),
        }
    }

    async fn watch_heads(&self, chain: Chain, cancel: CancellationToken) {
        loop {
            let sub = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.closed.cancelled() => break,
                sub = self.subscribe(chain) => sub,
            };

            match sub {
                Ok(mut stream) => loop {
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = self.closed.cancelled() => return,
                        next = stream.next() => match next {
                            Some(header) => self.update_head(chain, header),
                            None => {
                                warn!(chain = chain.as_str(), "head subscription ended");
                                break;
                            }
                        },
                    }
                },
                Err(err) => {
                    warn!(chain = chain.as_str(), %err, "failed to subscribe to new heads");
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = self.closed.cancelled() => break,
                _ = tokio::time::sleep(RESUBSCRIBE_DELAY) => {}
            }
        }
        debug!(chain = chain.as_str(), "head watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;

    use alloy_primitives::B256;
    use keel_primitives::{L1Origin, ProtocolStateVars};
    use keel_rpc::{MockL1Client, MockL2EngineClient};

    use super::*;

    fn l1_header(number: u64) -> BlockHeader {
        BlockHeader::new(
            number,
            B256::with_last_byte(number as u8),
            B256::with_last_byte(number.saturating_sub(1) as u8),
        )
    }

    fn l2_header(number: u64) -> BlockHeader {
        BlockHeader::new(number, B256::repeat_byte(0xee), B256::ZERO)
    }

    fn base_l1() -> MockL1Client {
        let mut l1 = MockL1Client::new();
        l1.expect_protocol_state_vars().returning(|| {
            Ok(ProtocolStateVars {
                genesis_height: 10,
                num_blocks: 6,
                ..Default::default()
            })
        });
        l1.expect_block_number().returning(|| Ok(50));
        l1.expect_header_by_number()
            .returning(|n| Ok((n <= 50).then(|| l1_header(n))));
        l1
    }

    mod init_tests {
        use super::*;

        #[tokio::test]
        async fn test_new_at_genesis_uses_genesis_height() {
            // Scenario: local L2 head is the genesis block.
            // Expected: cursor at the inbox deployment height, no L1 origin lookup.
            let l1 = base_l1();
            let mut l2 = MockL2EngineClient::new();
            l2.expect_header_by_number()
                .returning(|_| Ok(Some(l2_header(0))));
            l2.expect_l1_origin_by_id().times(0);

            let state = HeadState::new(Arc::new(l1), Arc::new(l2)).await.unwrap();

            assert_eq!(state.l1_head().number, 50);
            assert_eq!(state.l2_head().number, 0);
            assert_eq!(state.l1_current().number, 10);
            assert_eq!(state.head_block_id(), 5);
        }

        #[tokio::test]
        async fn test_new_uses_l1_origin_of_head() {
            let l1 = base_l1();
            let mut l2 = MockL2EngineClient::new();
            l2.expect_header_by_number()
                .returning(|_| Ok(Some(l2_header(4))));
            l2.expect_l1_origin_by_id().returning(|id| {
                Ok(Some(L1Origin {
                    block_id: id,
                    l1_block_height: 42,
                    ..Default::default()
                }))
            });

            let state = HeadState::new(Arc::new(l1), Arc::new(l2)).await.unwrap();

            assert_eq!(state.l1_current(), l1_header(42));
        }

        #[tokio::test]
        async fn test_missing_l2_head_fails() {
            let l1 = base_l1();
            let mut l2 = MockL2EngineClient::new();
            l2.expect_header_by_number().returning(|_| Ok(None));

            let res = HeadState::new(Arc::new(l1), Arc::new(l2)).await;

            assert!(matches!(res, Err(StateError::MissingL2Head)));
        }
    }

    mod cursor_tests {
        use super::*;

        #[tokio::test]
        async fn test_reset_falls_back_to_proposed_in() {
            // Scenario: the block arrived over P2P so the engine has no L1 origin.
            // Expected: cursor taken from the inbox's proposal height.
            let mut l1 = base_l1();
            l1.expect_proposed_in()
                .withf(|id| *id == 3)
                .times(1)
                .returning(|_| Ok(33));
            let mut l2 = MockL2EngineClient::new();
            l2.expect_header_by_number()
                .returning(|_| Ok(Some(l2_header(0))));
            l2.expect_l1_origin_by_id().returning(|_| Ok(None));

            let state = HeadState::new(Arc::new(l1), Arc::new(l2)).await.unwrap();
            let cursor = state.reset_l1_current(3).await.unwrap();

            assert_eq!(cursor.number, 33);
            assert_eq!(state.l1_current().number, 33);
        }

        #[tokio::test]
        async fn test_reset_to_unknown_height_fails() {
            let l1 = base_l1();
            let mut l2 = MockL2EngineClient::new();
            l2.expect_header_by_number()
                .returning(|_| Ok(Some(l2_header(0))));
            l2.expect_l1_origin_by_id().returning(|id| {
                Ok(Some(L1Origin {
                    block_id: id,
                    l1_block_height: 99,
                    ..Default::default()
                }))
            });

            let state = HeadState::new(Arc::new(l1), Arc::new(l2)).await.unwrap();
            let res = state.reset_l1_current(7).await;

            assert!(matches!(res, Err(StateError::MissingL1Header(99))));
            assert_eq!(state.l1_current().number, 10);
        }
    }

    mod feed_tests {
        use super::*;

        async fn genesis_state(l1: MockL1Client, l2: MockL2EngineClient) -> Arc<HeadState> {
            Arc::new(HeadState::new(Arc::new(l1), Arc::new(l2)).await.unwrap())
        }

        fn genesis_l2() -> MockL2EngineClient {
            let mut l2 = MockL2EngineClient::new();
            l2.expect_header_by_number()
                .returning(|_| Ok(Some(l2_header(0))));
            l2
        }

        #[tokio::test]
        async fn test_feed_delivers_in_order_and_prunes_dropped() {
            let state = genesis_state(base_l1(), genesis_l2()).await;

            let mut rx_a = state.subscribe_l1_heads();
            let rx_b = state.subscribe_l1_heads();
            drop(rx_b);

            state.update_l1_head(l1_header(51));
            state.update_l1_head(l1_header(52));

            assert_eq!(rx_a.recv().await.unwrap().number, 51);
            assert_eq!(rx_a.recv().await.unwrap().number, 52);
            assert_eq!(state.l1_head().number, 52);
            assert_eq!(state.l1_subscribers.lock().len(), 1);
        }

        #[tokio::test]
        async fn test_close_drops_subscribers() {
            let state = genesis_state(base_l1(), genesis_l2()).await;
            let mut rx = state.subscribe_l1_heads();

            state.close();

            assert!(rx.recv().await.is_none());
        }

        #[tokio::test]
        async fn test_watchers_feed_heads() {
            let mut l1 = base_l1();
            let first = Arc::new(AtomicBool::new(true));
            l1.expect_subscribe_new_heads().returning(move || {
                if first.swap(false, Ordering::SeqCst) {
                    Ok(futures::stream::iter(vec![l1_header(51), l1_header(52)]).boxed())
                } else {
                    Ok(futures::stream::pending().boxed())
                }
            });
            let mut l2 = genesis_l2();
            l2.expect_subscribe_new_heads().returning(|| {
                Ok(futures::stream::iter(vec![l2_header(3)])
                    .chain(futures::stream::pending())
                    .boxed())
            });

            let state = genesis_state(l1, l2).await;
            let mut rx = state.subscribe_l1_heads();
            let cancel = CancellationToken::new();
            let handles = state.spawn_watchers(cancel.clone());

            assert_eq!(rx.recv().await.unwrap().number, 51);
            assert_eq!(rx.recv().await.unwrap().number, 52);
            while state.l2_head().number != 3 {
                tokio::task::yield_now().await;
            }

            cancel.cancel();
            for handle in handles {
                handle.await.unwrap();
            }
            assert_eq!(state.l1_head().number, 52);
            assert_eq!(state.l2_head().number, 3);
        }
    }
}
