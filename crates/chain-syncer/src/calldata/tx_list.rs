use alloy_consensus::TxEnvelope;
use alloy_rlp::Decodable;
use miniz_oxide::inflate::decompress_to_vec_zlib_with_limit;
use thiserror::Error;
use tracing::warn;

/// Reasons a proposed tx list is replaced by an empty one.
#[derive(Debug, Error)]
pub enum TxListError {
    #[error("tx list is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: u64 },

    /// Not zlib, or inflates past what a block could hold.
    #[error("zlib decompression failed")]
    Decompress,

    #[error("rlp: {0}")]
    Rlp(#[from] alloy_rlp::Error),

    #[error("{0} trailing bytes after tx list")]
    TrailingBytes(usize),

    #[error("tx list holds {count} transactions, limit is {max}")]
    TooManyTransactions { count: usize, max: u64 },
}

/// Calldata is charged at least this much gas per byte.
const MIN_GAS_PER_BYTE: u64 = 4;

/// Allowance per transaction for the parts of its encoding not charged as calldata.
const TX_ENVELOPE_OVERHEAD: u64 = 512;

/// Turns the compressed tx list of a proposal into transactions.
///
/// A proposer can post arbitrary bytes, so an invalid list never fails the sync. The block is
/// still built, just without user transactions.
#[derive(Debug, Clone, Copy)]
pub struct TxListDecoder {
    max_bytes: u64,
    max_txs: u64,
    max_decompressed_bytes: usize,
}

impl TxListDecoder {
    /// The decompressed size is capped by what fits in a block of `block_gas_limit` gas.
    pub fn new(max_bytes: u64, max_txs: u64, block_gas_limit: u32) -> Self {
        let max_decompressed = (u64::from(block_gas_limit) / MIN_GAS_PER_BYTE)
            .saturating_add(max_txs.saturating_mul(TX_ENVELOPE_OVERHEAD));
        Self {
            max_bytes,
            max_txs,
            max_decompressed_bytes: usize::try_from(max_decompressed).unwrap_or(usize::MAX),
        }
    }

    pub fn decode(&self, block_id: u64, tx_list: &[u8]) -> Vec<TxEnvelope> {
        if tx_list.is_empty() {
            return Vec::new();
        }

        match self.try_decode(tx_list) {
            Ok(txs) => txs,
            Err(err) => {
                warn!(%block_id, %err, "invalid tx list, building an empty block");
                Vec::new()
            }
        }
    }

    pub fn try_decode(&self, tx_list: &[u8]) -> Result<Vec<TxEnvelope>, TxListError> {
        if tx_list.len() as u64 > self.max_bytes {
            return Err(TxListError::TooLarge {
                size: tx_list.len(),
                max: self.max_bytes,
            });
        }

        let raw = decompress_to_vec_zlib_with_limit(tx_list, self.max_decompressed_bytes)
            .map_err(|_| TxListError::Decompress)?;
        let mut buf = raw.as_slice();
        let txs = Vec::<TxEnvelope>::decode(&mut buf)?;
        if !buf.is_empty() {
            return Err(TxListError::TrailingBytes(buf.len()));
        }

        if txs.len() as u64 > self.max_txs {
            return Err(TxListError::TooManyTransactions {
                count: txs.len(),
                max: self.max_txs,
            });
        }
        Ok(txs)
    }
}
