//! In-memory L1, execution engine, checkpoint node and beacon node for tests.
//!
//! Every fake is a cheap handle over shared state, so a test can keep one clone to drive
//! the chain while the syncer owns another behind a trait object.

use std::{collections::HashMap, fmt, sync::Arc};

use alloy::signers::{local::PrivateKeySigner, SignerSync};
use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_primitives::{keccak256, Address, Bytes, TxKind, B256, U256};
use alloy_rpc_types_engine::{
    ExecutionPayloadV1, ForkchoiceState, ForkchoiceUpdated, PayloadId, PayloadStatus,
    PayloadStatusEnum, TransitionConfiguration,
};
use async_trait::async_trait;
use futures::StreamExt;
use keel_primitives::{
    BlockHeader, BlockMetadata, L1Origin, ProposedBlock, ProtocolConfig, ProtocolStateVars,
    SyncProgress,
};
use keel_rpc::{
    BlobClient, CheckpointClient, HeaderStream, L1Client, L2EngineClient, L2PayloadAttributes,
    RpcError, RpcResult,
};
use miniz_oxide::deflate::compress_to_vec_zlib;
use parking_lot::Mutex;

use crate::calldata::encode_blob;

pub const TEST_CHAIN_ID: u64 = 167;
pub const TEST_BASE_FEE: u64 = 10;

/// Signed transfer from a fixed test account.
pub fn signed_transfer(nonce: u64) -> TxEnvelope {
    let signer = PrivateKeySigner::from_bytes(&B256::repeat_byte(0x11)).expect("valid key");
    let tx = TxEip1559 {
        chain_id: TEST_CHAIN_ID,
        nonce,
        gas_limit: 21_000,
        max_fee_per_gas: 1_000,
        max_priority_fee_per_gas: 1,
        to: TxKind::Call(Address::repeat_byte(0x22)),
        value: U256::from(1),
        access_list: Default::default(),
        input: Default::default(),
    };
    let sig = signer.sign_hash_sync(&tx.signature_hash()).expect("signing works");
    TxEnvelope::Eip1559(tx.into_signed(sig))
}

/// Compressed tx list as a proposer would post it.
pub fn compress_tx_list(txs: &[TxEnvelope]) -> Bytes {
    compress_to_vec_zlib(&alloy_rlp::encode(txs.to_vec()), 6).into()
}

fn pending_stream() -> HeaderStream {
    futures::stream::pending().boxed()
}

fn not_found(what: impl fmt::Display) -> RpcError {
    RpcError::NotFound(what.to_string())
}

#[derive(Debug)]
struct FakeL1Inner {
    salt: u64,
    headers: Vec<BlockHeader>,
    proposals: Vec<ProposedBlock>,
    tx_lists: HashMap<B256, Bytes>,
    vars: ProtocolStateVars,
    config: ProtocolConfig,
    state_var_reads: usize,
    event_queries: Vec<(u64, u64)>,
    proposed_in_calls: Vec<u64>,
}

impl FakeL1Inner {
    fn mine(&mut self) -> BlockHeader {
        let parent = self.headers.last().copied().unwrap_or_default();
        let number = self.headers.len() as u64;
        let mut preimage = Vec::with_capacity(48);
        preimage.extend_from_slice(&number.to_be_bytes());
        preimage.extend_from_slice(&self.salt.to_be_bytes());
        preimage.extend_from_slice(parent.hash.as_slice());
        let hash = keccak256(&preimage);

        let header = BlockHeader::new(number, hash, parent.hash)
            .with_timestamp(number * 12)
            .with_state_root(keccak256(hash));
        self.headers.push(header);
        header
    }
}

/// L1 chain with an inbox contract.
///
/// Heights `0..=genesis_height` exist from the start. Each proposal mines one L1 block.
#[derive(Debug, Clone)]
pub struct FakeL1 {
    inner: Arc<Mutex<FakeL1Inner>>,
}

impl FakeL1 {
    pub fn new(genesis_height: u64) -> Self {
        let mut inner = FakeL1Inner {
            salt: 0,
            headers: Vec::new(),
            proposals: Vec::new(),
            tx_lists: HashMap::new(),
            vars: ProtocolStateVars {
                genesis_height,
                genesis_timestamp: genesis_height * 12,
                num_blocks: 1,
                last_verified_block_id: 0,
            },
            config: ProtocolConfig {
                chain_id: TEST_CHAIN_ID,
                block_max_proposals: 32,
                block_ring_buffer_size: 64,
                block_max_gas_limit: 15_000_000,
                block_max_tx_list_bytes: 120_000,
            },
            state_var_reads: 0,
            event_queries: Vec::new(),
            proposed_in_calls: Vec::new(),
        };
        for _ in 0..=genesis_height {
            inner.mine();
        }
        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    pub fn head(&self) -> BlockHeader {
        *self
            .inner
            .lock()
            .headers
            .last()
            .expect("genesis always exists")
    }

    pub fn header(&self, number: u64) -> Option<BlockHeader> {
        self.inner.lock().headers.get(number as usize).copied()
    }

    pub fn mine(&self) -> BlockHeader {
        self.inner.lock().mine()
    }

    /// Number of `protocol_state_vars` calls served so far.
    pub fn state_var_reads(&self) -> usize {
        self.inner.lock().state_var_reads
    }

    /// `(from, to)` of every `block_proposed_events` call so far.
    pub fn event_queries(&self) -> Vec<(u64, u64)> {
        self.inner.lock().event_queries.clone()
    }

    /// Block ids passed to `proposed_in` so far.
    pub fn proposed_in_calls(&self) -> Vec<u64> {
        self.inner.lock().proposed_in_calls.clone()
    }

    pub fn clear_calls(&self) {
        let mut inner = self.inner.lock();
        inner.state_var_reads = 0;
        inner.event_queries.clear();
        inner.proposed_in_calls.clear();
    }

    pub fn set_last_verified(&self, block_id: u64) {
        self.inner.lock().vars.last_verified_block_id = block_id;
    }

    /// Mines a block carrying a calldata proposal for `block_id`.
    pub fn propose(&self, block_id: u64, tx_list: Bytes) -> ProposedBlock {
        let (proposal, tx_hash) = self.propose_inner(block_id, |meta| {
            meta.tx_list_hash = keccak256(&tx_list);
            meta.tx_list_byte_size = tx_list.len() as u32;
        });
        self.inner.lock().tx_lists.insert(tx_hash, tx_list);
        proposal
    }

    /// Mines a block carrying a proposal whose tx list lives at `offset..offset + size` of a
    /// blob.
    pub fn propose_blob(
        &self,
        block_id: u64,
        blob_hash: B256,
        offset: u32,
        size: u32,
    ) -> ProposedBlock {
        self.propose_inner(block_id, |meta| {
            meta.blob_used = true;
            meta.blob_hash = blob_hash;
            meta.tx_list_byte_offset = offset;
            meta.tx_list_byte_size = size;
        })
        .0
    }

    fn propose_inner(
        &self,
        block_id: u64,
        fill: impl FnOnce(&mut BlockMetadata),
    ) -> (ProposedBlock, B256) {
        let mut inner = self.inner.lock();
        let anchor = *inner.headers.last().expect("genesis always exists");
        let l1_block = inner.mine();

        let mut meta = BlockMetadata {
            id: block_id,
            l1_height: anchor.number,
            l1_hash: anchor.hash,
            beneficiary: Address::repeat_byte(0xbe),
            gas_limit: 15_000_000,
            timestamp: l1_block.timestamp,
            difficulty: keccak256(l1_block.hash),
            ..Default::default()
        };
        fill(&mut meta);

        let tx_hash = keccak256(l1_block.hash);
        let proposal = ProposedBlock {
            meta,
            l1_block_number: l1_block.number,
            l1_block_hash: l1_block.hash,
            tx_hash,
            log_index: 0,
        };
        inner.proposals.push(proposal.clone());
        inner.vars.num_blocks = inner.vars.num_blocks.max(block_id + 1);
        (proposal, tx_hash)
    }

    /// Drops every L1 block above `height`, along with the proposals they carried. Blocks
    /// mined afterwards get new hashes.
    pub fn reorg(&self, height: u64) {
        let mut inner = self.inner.lock();
        inner.headers.truncate(height as usize + 1);
        inner.proposals.retain(|p| p.l1_block_number <= height);
        inner.vars.num_blocks = inner
            .proposals
            .iter()
            .map(|p| p.meta.id + 1)
            .max()
            .unwrap_or(1);
        inner.salt += 1;
    }
}

#[async_trait]
impl L1Client for FakeL1 {
    async fn block_number(&self) -> RpcResult<u64> {
        Ok(self.head().number)
    }

    async fn header_by_number(&self, number: u64) -> RpcResult<Option<BlockHeader>> {
        Ok(self.header(number))
    }

    async fn subscribe_new_heads(&self) -> RpcResult<HeaderStream> {
        Ok(pending_stream())
    }

    async fn block_proposed_events(&self, from: u64, to: u64) -> RpcResult<Vec<ProposedBlock>> {
        let mut inner = self.inner.lock();
        inner.event_queries.push((from, to));
        Ok(inner
            .proposals
            .iter()
            .filter(|p| (from..=to).contains(&p.l1_block_number))
            .cloned()
            .collect())
    }

    async fn proposal_tx_list(&self, tx_hash: B256) -> RpcResult<Bytes> {
        self.inner
            .lock()
            .tx_lists
            .get(&tx_hash)
            .cloned()
            .ok_or_else(|| not_found(format!("proposal tx {tx_hash}")))
    }

    async fn protocol_state_vars(&self) -> RpcResult<ProtocolStateVars> {
        let mut inner = self.inner.lock();
        inner.state_var_reads += 1;
        Ok(inner.vars)
    }

    async fn protocol_config(&self) -> RpcResult<ProtocolConfig> {
        Ok(self.inner.lock().config)
    }

    async fn proposed_in(&self, block_id: u64) -> RpcResult<u64> {
        let mut inner = self.inner.lock();
        inner.proposed_in_calls.push(block_id);
        inner
            .proposals
            .iter()
            .rev()
            .find(|p| p.meta.id == block_id)
            .map(|p| p.l1_block_number)
            .ok_or_else(|| not_found(format!("proposal of block {block_id}")))
    }
}

#[derive(Debug)]
struct FakeEngineInner {
    blocks: HashMap<B256, ExecutionPayloadV1>,
    canonical: Vec<B256>,
    origins: HashMap<B256, L1Origin>,
    attributes: HashMap<B256, L2PayloadAttributes>,
    pending: HashMap<PayloadId, (ExecutionPayloadV1, L2PayloadAttributes)>,
    next_payload_id: u64,
    sync_progress: Option<SyncProgress>,
    forkchoice_calls: Vec<ForkchoiceState>,
}

impl FakeEngineInner {
    fn header(&self, hash: &B256) -> Option<BlockHeader> {
        self.blocks.get(hash).map(header_from_payload)
    }

    /// Makes `head` canonical, or returns false if its ancestry is unknown.
    fn set_head(&mut self, head: B256) -> bool {
        let mut chain = Vec::new();
        let mut cursor = head;
        loop {
            let Some(block) = self.blocks.get(&cursor) else {
                return false;
            };
            chain.push(cursor);
            if block.block_number == 0 {
                break;
            }
            cursor = block.parent_hash;
        }
        chain.reverse();
        self.canonical = chain;
        true
    }
}

fn header_from_payload(payload: &ExecutionPayloadV1) -> BlockHeader {
    BlockHeader::new(payload.block_number, payload.block_hash, payload.parent_hash)
        .with_timestamp(payload.timestamp)
        .with_state_root(payload.state_root)
        .with_gas_used(payload.gas_used)
        .with_base_fee(payload.base_fee_per_gas.saturating_to())
}

/// Execution engine that builds blocks deterministically from payload attributes.
///
/// Blocks are hashed from their parent, L1 origin and tx list, so rebuilding the same
/// proposal on the same parent yields the same block.
#[derive(Debug, Clone)]
pub struct FakeEngine {
    inner: Arc<Mutex<FakeEngineInner>>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        let genesis = ExecutionPayloadV1 {
            parent_hash: B256::ZERO,
            fee_recipient: Address::ZERO,
            state_root: keccak256(b"genesis state"),
            receipts_root: B256::ZERO,
            logs_bloom: Default::default(),
            prev_randao: B256::ZERO,
            block_number: 0,
            gas_limit: 15_000_000,
            gas_used: 0,
            timestamp: 0,
            extra_data: Default::default(),
            base_fee_per_gas: U256::from(TEST_BASE_FEE),
            block_hash: keccak256(b"genesis"),
            transactions: vec![],
        };
        let genesis_hash = genesis.block_hash;

        Self {
            inner: Arc::new(Mutex::new(FakeEngineInner {
                blocks: HashMap::from([(genesis_hash, genesis)]),
                canonical: vec![genesis_hash],
                origins: HashMap::new(),
                attributes: HashMap::new(),
                pending: HashMap::new(),
                next_payload_id: 1,
                sync_progress: None,
                forkchoice_calls: Vec::new(),
            })),
        }
    }

    pub fn head(&self) -> BlockHeader {
        let inner = self.inner.lock();
        let hash = inner.canonical.last().expect("genesis always exists");
        inner.header(hash).expect("canonical blocks are stored")
    }

    pub fn block(&self, number: u64) -> Option<BlockHeader> {
        let inner = self.inner.lock();
        let hash = inner.canonical.get(number as usize)?;
        inner.header(hash)
    }

    pub fn origin(&self, number: u64) -> Option<L1Origin> {
        let inner = self.inner.lock();
        let hash = inner.canonical.get(number as usize)?;
        inner.origins.get(hash).copied()
    }

    /// Attributes the canonical block at `number` was built from.
    pub fn attributes(&self, number: u64) -> Option<L2PayloadAttributes> {
        let inner = self.inner.lock();
        let hash = inner.canonical.get(number as usize)?;
        inner.attributes.get(hash).cloned()
    }

    pub fn payload(&self, number: u64) -> Option<ExecutionPayloadV1> {
        let inner = self.inner.lock();
        let hash = inner.canonical.get(number as usize)?;
        inner.blocks.get(hash).cloned()
    }

    pub fn forkchoice_calls(&self) -> Vec<ForkchoiceState> {
        self.inner.lock().forkchoice_calls.clone()
    }

    pub fn set_sync_progress(&self, progress: Option<SyncProgress>) {
        self.inner.lock().sync_progress = progress;
    }

    /// Copies `other`'s canonical chain up to `number` as if it arrived over P2P. The copied
    /// blocks carry no L1 origin.
    pub fn import_chain_from(&self, other: &FakeEngine, number: u64) {
        let payloads: Vec<_> = (1..=number).filter_map(|n| other.payload(n)).collect();
        let mut inner = self.inner.lock();
        let mut head = None;
        for payload in payloads {
            head = Some(payload.block_hash);
            inner.blocks.insert(payload.block_hash, payload);
        }
        if let Some(head) = head {
            inner.set_head(head);
        }
    }
}

#[async_trait]
impl L2EngineClient for FakeEngine {
    async fn header_by_number(&self, number: Option<u64>) -> RpcResult<Option<BlockHeader>> {
        Ok(match number {
            Some(number) => self.block(number),
            None => Some(self.head()),
        })
    }

    async fn subscribe_new_heads(&self) -> RpcResult<HeaderStream> {
        Ok(pending_stream())
    }

    async fn peer_count(&self) -> RpcResult<u64> {
        Ok(0)
    }

    async fn sync_progress(&self) -> RpcResult<Option<SyncProgress>> {
        Ok(self.inner.lock().sync_progress)
    }

    async fn l1_origin_by_id(&self, block_id: u64) -> RpcResult<Option<L1Origin>> {
        Ok(self.origin(block_id))
    }

    async fn nonce_at(&self, _address: Address, block_number: u64) -> RpcResult<u64> {
        Ok(block_number)
    }

    async fn base_fee(
        &self,
        _parent_number: u64,
        _l1_height: u64,
        _parent_gas_used: u32,
    ) -> RpcResult<u64> {
        Ok(TEST_BASE_FEE)
    }

    async fn forkchoice_updated(
        &self,
        state: ForkchoiceState,
        attributes: Option<L2PayloadAttributes>,
    ) -> RpcResult<ForkchoiceUpdated> {
        let mut inner = self.inner.lock();
        inner.forkchoice_calls.push(state);

        let Some(parent) = inner.blocks.get(&state.head_block_hash).cloned() else {
            return Ok(ForkchoiceUpdated::from_status(PayloadStatusEnum::Syncing));
        };
        if !inner.set_head(parent.block_hash) {
            return Ok(ForkchoiceUpdated::from_status(PayloadStatusEnum::Syncing));
        }
        let Some(attrs) = attributes else {
            return Ok(ForkchoiceUpdated::from_status(PayloadStatusEnum::Valid));
        };

        let meta = &attrs.block_metadata;
        let mut preimage = parent.block_hash.to_vec();
        preimage.extend_from_slice(attrs.l1_origin.l1_block_hash.as_slice());
        preimage.extend_from_slice(&meta.tx_list);
        let block_hash = keccak256(&preimage);

        let payload = ExecutionPayloadV1 {
            parent_hash: parent.block_hash,
            fee_recipient: attrs.inner.suggested_fee_recipient,
            state_root: keccak256(block_hash),
            receipts_root: B256::ZERO,
            logs_bloom: Default::default(),
            prev_randao: attrs.inner.prev_randao,
            block_number: parent.block_number + 1,
            gas_limit: meta.gas_limit.to(),
            gas_used: meta.tx_list.len() as u64,
            timestamp: attrs.inner.timestamp,
            extra_data: meta.extra_data.clone(),
            base_fee_per_gas: attrs.base_fee_per_gas,
            block_hash,
            transactions: vec![],
        };

        let id = PayloadId::new(inner.next_payload_id.to_be_bytes());
        inner.next_payload_id += 1;
        inner.pending.insert(id, (payload, attrs));
        Ok(ForkchoiceUpdated::from_status(PayloadStatusEnum::Valid).with_payload_id(id))
    }

    async fn get_payload(&self, payload_id: PayloadId) -> RpcResult<ExecutionPayloadV1> {
        self.inner
            .lock()
            .pending
            .get(&payload_id)
            .map(|(payload, _)| payload.clone())
            .ok_or_else(|| not_found(format!("payload {payload_id}")))
    }

    async fn new_payload(&self, payload: ExecutionPayloadV1) -> RpcResult<PayloadStatus> {
        let mut inner = self.inner.lock();
        if !inner.blocks.contains_key(&payload.parent_hash) {
            return Ok(PayloadStatus::from_status(PayloadStatusEnum::Syncing));
        }

        let hash = payload.block_hash;
        let built = inner
            .pending
            .values()
            .find(|(p, _)| p.block_hash == hash)
            .map(|(_, attrs)| attrs.clone());
        if let Some(attrs) = built {
            let mut origin = L1Origin::from(attrs.l1_origin);
            origin.l2_block_hash = hash;
            inner.origins.insert(hash, origin);
            inner.attributes.insert(hash, attrs);
        }
        inner.blocks.insert(hash, payload);
        Ok(PayloadStatus::from_status(PayloadStatusEnum::Valid).with_latest_valid_hash(hash))
    }

    async fn exchange_transition_configuration(
        &self,
        config: TransitionConfiguration,
    ) -> RpcResult<TransitionConfiguration> {
        Ok(config)
    }
}

/// Checkpoint node serving the canonical chain of another engine.
#[derive(Debug, Clone)]
pub struct FakeCheckpoint {
    engine: FakeEngine,
}

impl FakeCheckpoint {
    pub fn new(engine: FakeEngine) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl CheckpointClient for FakeCheckpoint {
    async fn payload_by_number(&self, number: u64) -> RpcResult<Option<ExecutionPayloadV1>> {
        Ok(self.engine.payload(number))
    }
}

/// Beacon node holding blobs by versioned hash.
#[derive(Debug, Clone, Default)]
pub struct FakeBlobs {
    blobs: Arc<Mutex<HashMap<B256, Bytes>>>,
}

impl FakeBlobs {
    /// Packs `payload` into a blob and returns a hash to reference it by.
    pub fn insert(&self, payload: &[u8]) -> B256 {
        let blob = encode_blob(payload).expect("payload fits in a blob");
        let mut hash = keccak256(&blob);
        hash.0[0] = 0x01;
        self.blobs.lock().insert(hash, blob.into());
        hash
    }
}

#[async_trait]
impl BlobClient for FakeBlobs {
    async fn blob_data(&self, _l1_timestamp: u64, blob_hash: B256) -> RpcResult<Bytes> {
        self.blobs
            .lock()
            .get(&blob_hash)
            .cloned()
            .ok_or_else(|| not_found(format!("blob {blob_hash}")))
    }
}
