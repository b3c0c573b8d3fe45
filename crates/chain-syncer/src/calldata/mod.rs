//! Rebuilds L2 blocks from the proposals recorded on L1.

mod anchor;
mod blob;
mod tx_list;

use std::{fmt, sync::Arc};

use alloy_primitives::{Address, Bytes, B256};
use alloy_rpc_types_engine::ForkchoiceState;
use keel_common::metrics::{L1_REORGS_TOTAL, L2_BLOCKS_INSERTED_TOTAL};
use keel_primitives::{BlockHeader, ProposedBlock};
use keel_rpc::{BlobClient, L1Client, L2EngineClient, L2PayloadAttributes};
use keel_state::HeadState;
use tracing::{debug, info, warn};

pub use anchor::{AnchorConstructor, ANCHOR_GAS_LIMIT, GOLDEN_TOUCH_ADDRESS};
pub use blob::{
    decode_blob, encode_blob, BlobDecodeError, BYTES_PER_BLOB, MAX_BLOB_DATA_SIZE,
};
pub use tx_list::{TxListDecoder, TxListError};

use crate::{beacon::ensure_valid, SyncError, SyncProgressTracker, SyncResult};

/// Maximum number of L1 blocks scanned for proposals in one `eth_getLogs` query.
const EVENT_BATCH_SIZE: u64 = 1_000;

#[derive(Debug, Clone)]
pub struct CalldataSyncerConfig {
    pub anchor_address: Address,
    pub max_reorg_search_depth: u64,
    pub max_txs_per_block: u64,
}

enum RangeOutcome {
    Done,
    Reorged,
}

/// Replays L1 block proposals into the execution engine.
///
/// Blocks are inserted strictly in proposal order. The L1 cursor in [`HeadState`] only moves
/// past a range once every proposal in it was applied, so an interrupted pass resumes where
/// it stopped and already applied blocks are skipped.
pub struct CalldataSyncer {
    state: Arc<HeadState>,
    l1: Arc<dyn L1Client>,
    l2: Arc<dyn L2EngineClient>,
    blobs: Arc<dyn BlobClient>,
    tracker: Arc<SyncProgressTracker>,
    anchor: AnchorConstructor,
    tx_list_decoder: TxListDecoder,
    max_reorg_search_depth: u64,
}

impl fmt::Debug for CalldataSyncer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CalldataSyncer")
            .field("tx_list_decoder", &self.tx_list_decoder)
            .field("max_reorg_search_depth", &self.max_reorg_search_depth)
            .finish_non_exhaustive()
    }
}

impl CalldataSyncer {
    /// Creates a syncer, reading the chain id and tx-list limits from the inbox.
    pub async fn new(
        state: Arc<HeadState>,
        l1: Arc<dyn L1Client>,
        l2: Arc<dyn L2EngineClient>,
        blobs: Arc<dyn BlobClient>,
        tracker: Arc<SyncProgressTracker>,
        config: CalldataSyncerConfig,
    ) -> SyncResult<Self> {
        let protocol = l1.protocol_config().await?;
        Ok(Self {
            state,
            l1,
            l2,
            blobs,
            tracker,
            anchor: AnchorConstructor::new(config.anchor_address, protocol.chain_id)?,
            tx_list_decoder: TxListDecoder::new(
                protocol.block_max_tx_list_bytes,
                config.max_txs_per_block,
                protocol.block_max_gas_limit,
            ),
            max_reorg_search_depth: config.max_reorg_search_depth,
        })
    }

    /// Applies every proposal between the L1 cursor and `l1_end`, resolving L1 reorgs on
    /// the way. Leaves the cursor at `l1_end` on success.
    pub async fn process_l1_blocks(&self, l1_end: BlockHeader) -> SyncResult<()> {
        let last_verified = self.l1.protocol_state_vars().await?.last_verified_block_id;

        loop {
            self.check_cursor(&l1_end).await?;

            let l2_head = self.state.l2_head();
            if let Some(ancestor) = self.check_reorg(l2_head.number).await? {
                self.rewind(ancestor).await?;
                continue;
            }

            match self.process_range(&l1_end, last_verified).await? {
                RangeOutcome::Done => return Ok(()),
                RangeOutcome::Reorged => continue,
            }
        }
    }

    /// Pulls the cursor back below `l1_end` if it sits on a block that is no longer
    /// canonical.
    async fn check_cursor(&self, l1_end: &BlockHeader) -> SyncResult<()> {
        let cursor = self.state.l1_current();
        if cursor.number < l1_end.number || cursor.hash == l1_end.hash {
            return Ok(());
        }

        let height = l1_end.number.saturating_sub(1);
        let header = self
            .l1
            .header_by_number(height)
            .await?
            .ok_or(SyncError::MissingL1Header(height))?;
        warn!(%cursor, %l1_end, new_cursor = %header, "L1 cursor not canonical, moving back");
        self.state.set_l1_current(header);
        Ok(())
    }

    async fn process_range(
        &self,
        l1_end: &BlockHeader,
        last_verified: u64,
    ) -> SyncResult<RangeOutcome> {
        let mut cursor = self.state.l1_current();

        while cursor.number < l1_end.number {
            let from = cursor.number + 1;
            let to = (cursor.number + EVENT_BATCH_SIZE).min(l1_end.number);
            let events = self.l1.block_proposed_events(from, to).await?;
            debug!(%from, %to, count = events.len(), "fetched block proposals");

            for event in &events {
                let block_id = event.block_id();
                if block_id == 0 {
                    continue;
                }
                self.state.set_head_block_id(block_id);

                if !self.tracker.triggered() {
                    if let Some(ancestor) = self.check_reorg(block_id - 1).await? {
                        self.rewind(ancestor).await?;
                        return Ok(RangeOutcome::Reorged);
                    }
                }

                if self.already_inserted(event).await? {
                    debug!(%block_id, "block already in engine, skipping");
                    continue;
                }

                self.insert_block(event, last_verified).await?;
            }

            cursor = if to == l1_end.number {
                *l1_end
            } else {
                self.l1
                    .header_by_number(to)
                    .await?
                    .ok_or(SyncError::MissingL1Header(to))?
            };
            self.state.set_l1_current(cursor);
        }

        Ok(RangeOutcome::Done)
    }

    /// Walks back from `block_id` until a block whose L1 origin is still canonical.
    ///
    /// Returns the common ancestor if `block_id` itself was reorged out. Genesis and
    /// blocks synced over P2P have no L1 origin and are treated as canonical.
    pub async fn check_reorg(&self, block_id: u64) -> SyncResult<Option<u64>> {
        let mut id = block_id;
        let mut depth = 0;

        while id > 0 {
            let Some(origin) = self.l2.l1_origin_by_id(id).await? else {
                break;
            };
            let canonical = self.l1.header_by_number(origin.l1_block_height).await?;
            if canonical.is_some_and(|h| h.hash == origin.l1_block_hash) {
                break;
            }

            if depth >= self.max_reorg_search_depth {
                return Err(SyncError::NoCommonAncestor { block_id, depth });
            }
            id -= 1;
            depth += 1;
        }

        Ok((depth > 0).then_some(id))
    }

    /// Makes `ancestor` the engine head and replays L1 from its origin.
    async fn rewind(&self, ancestor: u64) -> SyncResult<()> {
        let head = self
            .l2
            .header_by_number(Some(ancestor))
            .await?
            .ok_or(SyncError::MissingBlock(ancestor))?;

        let fcu = self
            .l2
            .forkchoice_updated(
                ForkchoiceState {
                    head_block_hash: head.hash,
                    safe_block_hash: B256::ZERO,
                    finalized_block_hash: B256::ZERO,
                },
                None,
            )
            .await?;
        ensure_valid("engine_forkchoiceUpdated", &fcu.payload_status.status)?;

        let l1_current = self.state.reset_l1_current(ancestor).await?;
        self.state.update_l2_head(head);
        L1_REORGS_TOTAL.inc();
        warn!(l2_head = %head, %l1_current, "L1 reorg detected, rewound L2 chain");
        Ok(())
    }

    async fn already_inserted(&self, event: &ProposedBlock) -> SyncResult<bool> {
        let block_id = event.block_id();
        if self.l2.header_by_number(Some(block_id)).await?.is_none() {
            return Ok(false);
        }

        Ok(match self.l2.l1_origin_by_id(block_id).await? {
            Some(origin) => origin.l1_block_hash == event.l1_block_hash,
            None => true,
        })
    }

    async fn insert_block(&self, event: &ProposedBlock, last_verified: u64) -> SyncResult<()> {
        let meta = &event.meta;
        let block_id = meta.id;

        let parent = self
            .l2
            .header_by_number(Some(block_id - 1))
            .await?
            .ok_or(SyncError::MissingParent(block_id - 1))?;

        let raw = self.fetch_tx_list(event).await?;
        let txs = self.tx_list_decoder.decode(block_id, &raw);
        let tx_count = txs.len();

        let anchor_l1 = self
            .l1
            .header_by_number(meta.l1_height)
            .await?
            .ok_or(SyncError::MissingL1Header(meta.l1_height))?;
        let parent_gas_used = u32::try_from(parent.gas_used).unwrap_or(u32::MAX);
        let base_fee = self
            .l2
            .base_fee(parent.number, meta.l1_height, parent_gas_used)
            .await?;
        let nonce = self.l2.nonce_at(GOLDEN_TOUCH_ADDRESS, parent.number).await?;
        let anchor = self
            .anchor
            .assemble(&anchor_l1, parent_gas_used, nonce, base_fee)?;

        let mut all = Vec::with_capacity(tx_count + 1);
        all.push(anchor);
        all.extend(txs);
        let tx_list = Bytes::from(alloy_rlp::encode(&all));

        let attrs = L2PayloadAttributes::from_proposal(event, tx_list, base_fee);
        let header = self.insert_payload(&parent, attrs, last_verified).await?;

        self.state.update_l2_head(header);
        let source = if meta.blob_used { "blob" } else { "calldata" };
        L2_BLOCKS_INSERTED_TOTAL.with_label_values(&[source]).inc();
        info!(
            %block_id,
            l1_height = event.l1_block_number,
            hash = %header.hash,
            txs = tx_count,
            %source,
            "inserted L2 block"
        );
        Ok(())
    }

    /// Builds the block on top of `parent` and makes it the new head.
    async fn insert_payload(
        &self,
        parent: &BlockHeader,
        attrs: L2PayloadAttributes,
        last_verified: u64,
    ) -> SyncResult<BlockHeader> {
        let state = self
            .forkchoice_state(parent.hash, parent.number, last_verified)
            .await?;
        let fcu = self.l2.forkchoice_updated(state, Some(attrs)).await?;
        ensure_valid("engine_forkchoiceUpdated", &fcu.payload_status.status)?;
        let payload_id = fcu.payload_id.ok_or(SyncError::Engine {
            method: "engine_forkchoiceUpdated",
            status: "no payload id".to_string(),
        })?;

        let payload = self.l2.get_payload(payload_id).await?;
        let header =
            BlockHeader::new(payload.block_number, payload.block_hash, payload.parent_hash)
                .with_timestamp(payload.timestamp)
                .with_state_root(payload.state_root)
                .with_gas_used(payload.gas_used)
                .with_base_fee(payload.base_fee_per_gas.saturating_to());

        let status = self.l2.new_payload(payload).await?;
        ensure_valid("engine_newPayload", &status.status)?;

        let state = self
            .forkchoice_state(header.hash, header.number, last_verified)
            .await?;
        let fcu = self.l2.forkchoice_updated(state, None).await?;
        ensure_valid("engine_forkchoiceUpdated", &fcu.payload_status.status)?;

        Ok(header)
    }

    /// Forkchoice with the last verified block as safe and finalized, once the chain has
    /// reached it.
    async fn forkchoice_state(
        &self,
        head: B256,
        head_number: u64,
        last_verified: u64,
    ) -> SyncResult<ForkchoiceState> {
        let finalized = if last_verified == head_number {
            head
        } else if last_verified < head_number {
            self.l2
                .header_by_number(Some(last_verified))
                .await?
                .map(|h| h.hash)
                .unwrap_or_default()
        } else {
            B256::ZERO
        };

        Ok(ForkchoiceState {
            head_block_hash: head,
            safe_block_hash: finalized,
            finalized_block_hash: finalized,
        })
    }

    async fn fetch_tx_list(&self, event: &ProposedBlock) -> SyncResult<Bytes> {
        let meta = &event.meta;
        if !meta.blob_used {
            return Ok(self.l1.proposal_tx_list(event.tx_hash).await?);
        }

        let l1_block = self
            .l1
            .header_by_number(event.l1_block_number)
            .await?
            .ok_or(SyncError::MissingL1Header(event.l1_block_number))?;
        let blob = self.blobs.blob_data(l1_block.timestamp, meta.blob_hash).await?;

        let data = match decode_blob(&blob) {
            Ok(data) => data,
            Err(err) => {
                warn!(block_id = meta.id, %err, "invalid blob, using an empty tx list");
                return Ok(Bytes::new());
            }
        };

        let start = meta.tx_list_byte_offset as usize;
        let end = start + meta.tx_list_byte_size as usize;
        if end > data.len() {
            warn!(
                block_id = meta.id,
                %start,
                %end,
                len = data.len(),
                "tx list range outside blob payload, using an empty tx list"
            );
            return Ok(Bytes::new());
        }
        Ok(data.slice(start..end))
    }
}
