use alloy::signers::{local::PrivateKeySigner, SignerSync};
use alloy_consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy_primitives::{address, b256, Address, TxKind, B256, U256};
use alloy_sol_types::SolCall;
use keel_primitives::BlockHeader;
use keel_rpc::anchorCall;

use crate::{SyncError, SyncResult};

/// Sender of every anchor transaction.
pub const GOLDEN_TOUCH_ADDRESS: Address = address!("0x0000777735367b36bC9B61C50022d9D0700dB4Ec");

/// Publicly known key of [`GOLDEN_TOUCH_ADDRESS`].
const GOLDEN_TOUCH_PRIVATE_KEY: B256 =
    b256!("0x92954368afd3caa1f3ce3ead0069c1af414054aefe1ef9aeacc1bf426222ce38");

pub const ANCHOR_GAS_LIMIT: u64 = 250_000;

/// Builds the anchor transaction that opens every L2 block.
#[derive(Debug, Clone)]
pub struct AnchorConstructor {
    anchor_address: Address,
    chain_id: u64,
    signer: PrivateKeySigner,
}

impl AnchorConstructor {
    pub fn new(anchor_address: Address, chain_id: u64) -> SyncResult<Self> {
        let signer = PrivateKeySigner::from_bytes(&GOLDEN_TOUCH_PRIVATE_KEY)
            .map_err(|e| SyncError::Anchor(e.to_string()))?;
        Ok(Self {
            anchor_address,
            chain_id,
            signer,
        })
    }

    /// Signed `anchor(l1Hash, l1StateRoot, l1Height, parentGasUsed)` call.
    ///
    /// `nonce` is the golden touch nonce at the parent block and `base_fee` the base fee of
    /// the block being built.
    pub fn assemble(
        &self,
        l1_header: &BlockHeader,
        parent_gas_used: u32,
        nonce: u64,
        base_fee: u64,
    ) -> SyncResult<TxEnvelope> {
        let input = anchorCall {
            l1Hash: l1_header.hash,
            l1StateRoot: l1_header.state_root,
            l1Height: l1_header.number,
            parentGasUsed: parent_gas_used,
        }
        .abi_encode();

        let tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            gas_limit: ANCHOR_GAS_LIMIT,
            max_fee_per_gas: base_fee as u128,
            max_priority_fee_per_gas: 0,
            to: TxKind::Call(self.anchor_address),
            value: U256::ZERO,
            access_list: Default::default(),
            input: input.into(),
        };

        let sig = self
            .signer
            .sign_hash_sync(&tx.signature_hash())
            .map_err(|e| SyncError::Anchor(e.to_string()))?;
        Ok(TxEnvelope::Eip1559(tx.into_signed(sig)))
    }
}
