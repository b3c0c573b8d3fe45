//! Packing of tx-list bytes into a blob.
//!
//! A blob is 4096 field elements of 32 bytes. The first byte of every element must be zero
//! so the element stays below the field modulus, leaving 31 data bytes per element. The
//! data stream starts with a version byte and a 3-byte big-endian payload length.

use alloy_primitives::Bytes;
use thiserror::Error;

pub const FIELD_ELEMENTS_PER_BLOB: usize = 4096;
pub const BYTES_PER_FIELD_ELEMENT: usize = 32;
pub const BYTES_PER_BLOB: usize = FIELD_ELEMENTS_PER_BLOB * BYTES_PER_FIELD_ELEMENT;

const DATA_BYTES_PER_FIELD_ELEMENT: usize = BYTES_PER_FIELD_ELEMENT - 1;
const HEADER_LEN: usize = 4;
const ENCODING_VERSION: u8 = 0;

/// Largest payload a single blob can carry.
pub const MAX_BLOB_DATA_SIZE: usize =
    FIELD_ELEMENTS_PER_BLOB * DATA_BYTES_PER_FIELD_ELEMENT - HEADER_LEN;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobDecodeError {
    #[error("blob has {0} bytes, expected {BYTES_PER_BLOB}")]
    InvalidLength(usize),

    #[error("field element {0} has a non-zero high byte")]
    InvalidFieldElement(usize),

    #[error("unsupported blob encoding version {0}")]
    UnsupportedVersion(u8),

    #[error("declared payload length {0} exceeds blob capacity")]
    PayloadTooLarge(usize),
}

/// Extracts the payload packed into `blob`.
pub fn decode_blob(blob: &[u8]) -> Result<Bytes, BlobDecodeError> {
    if blob.len() != BYTES_PER_BLOB {
        return Err(BlobDecodeError::InvalidLength(blob.len()));
    }

    let mut data = Vec::with_capacity(FIELD_ELEMENTS_PER_BLOB * DATA_BYTES_PER_FIELD_ELEMENT);
    for (i, element) in blob.chunks_exact(BYTES_PER_FIELD_ELEMENT).enumerate() {
        if element[0] != 0 {
            return Err(BlobDecodeError::InvalidFieldElement(i));
        }
        data.extend_from_slice(&element[1..]);
    }

    if data[0] != ENCODING_VERSION {
        return Err(BlobDecodeError::UnsupportedVersion(data[0]));
    }
    let len = u32::from_be_bytes([0, data[1], data[2], data[3]]) as usize;
    if len > MAX_BLOB_DATA_SIZE {
        return Err(BlobDecodeError::PayloadTooLarge(len));
    }

    data.truncate(HEADER_LEN + len);
    data.drain(..HEADER_LEN);
    Ok(data.into())
}

/// Packs `payload` into a blob readable by [`decode_blob`].
pub fn encode_blob(payload: &[u8]) -> Result<Vec<u8>, BlobDecodeError> {
    if payload.len() > MAX_BLOB_DATA_SIZE {
        return Err(BlobDecodeError::PayloadTooLarge(payload.len()));
    }

    let len = (payload.len() as u32).to_be_bytes();
    let mut data = Vec::with_capacity(HEADER_LEN + payload.len());
    data.push(ENCODING_VERSION);
    data.extend_from_slice(&len[1..]);
    data.extend_from_slice(payload);

    let mut blob = vec![0u8; BYTES_PER_BLOB];
    for (element, chunk) in blob
        .chunks_exact_mut(BYTES_PER_FIELD_ELEMENT)
        .zip(data.chunks(DATA_BYTES_PER_FIELD_ELEMENT))
    {
        element[1..1 + chunk.len()].copy_from_slice(chunk);
    }
    Ok(blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_spanning_elements() {
        let payload: Vec<u8> = (0..100u8).collect();

        let blob = encode_blob(&payload).unwrap();

        assert_eq!(blob.len(), BYTES_PER_BLOB);
        assert!(blob.chunks(32).all(|e| e[0] == 0));
        assert_eq!(&blob[1..5], &[0, 0, 0, 100]);
        assert_eq!(decode_blob(&blob).unwrap().as_ref(), payload.as_slice());
    }

    #[test]
    fn test_full_capacity() {
        let payload = vec![0xab; MAX_BLOB_DATA_SIZE];
        let blob = encode_blob(&payload).unwrap();
        assert_eq!(decode_blob(&blob).unwrap().len(), MAX_BLOB_DATA_SIZE);

        assert_eq!(
            encode_blob(&[0; MAX_BLOB_DATA_SIZE + 1]),
            Err(BlobDecodeError::PayloadTooLarge(MAX_BLOB_DATA_SIZE + 1))
        );
    }

    #[test]
    fn test_rejects_malformed_blobs() {
        assert_eq!(
            decode_blob(&[0; 64]),
            Err(BlobDecodeError::InvalidLength(64))
        );

        let mut blob = encode_blob(b"hello").unwrap();
        blob[32 * 7] = 1;
        assert_eq!(
            decode_blob(&blob),
            Err(BlobDecodeError::InvalidFieldElement(7))
        );

        let mut blob = encode_blob(b"hello").unwrap();
        blob[1] = 1;
        assert_eq!(
            decode_blob(&blob),
            Err(BlobDecodeError::UnsupportedVersion(1))
        );

        let mut blob = encode_blob(b"hello").unwrap();
        blob[2..5].copy_from_slice(&[0xff, 0xff, 0xff]);
        assert_eq!(
            decode_blob(&blob),
            Err(BlobDecodeError::PayloadTooLarge(0xff_ffff))
        );
    }
}
