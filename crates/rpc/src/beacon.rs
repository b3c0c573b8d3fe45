//! Beacon API client for blob sidecars.

use std::time::Duration;

use alloy_primitives::{Bytes, B256};
use async_trait::async_trait;
use reqwest::Client;
use serde::{de::Error as _, Deserialize, Deserializer};
use sha2::{Digest, Sha256};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::{timing::timed, BlobClient, RpcError, RpcResult};

const TARGET: &str = "beacon";

const SPEC_METHOD: &str = "eth/v1/config/spec";

const GENESIS_METHOD: &str = "eth/v1/beacon/genesis";

const SIDECARS_METHOD_PREFIX: &str = "eth/v1/beacon/blob_sidecars";

/// Version byte of KZG commitment hashes.
const VERSIONED_HASH_VERSION_KZG: u8 = 0x01;

/// Beacon API numbers are decimal strings.
fn de_u64_str<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let s = String::deserialize(d)?;
    s.parse().map_err(D::Error::custom)
}

#[derive(Debug, Deserialize)]
struct GenesisData {
    #[serde(deserialize_with = "de_u64_str")]
    genesis_time: u64,
}

#[derive(Debug, Deserialize)]
struct SpecData {
    #[serde(rename = "SECONDS_PER_SLOT", deserialize_with = "de_u64_str")]
    seconds_per_slot: u64,
}

#[derive(Debug, Deserialize)]
struct BlobSidecar {
    blob: Bytes,
    kzg_commitment: Bytes,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

/// Versioned hash of a KZG commitment.
pub fn kzg_to_versioned_hash(commitment: &[u8]) -> B256 {
    let mut hash: [u8; 32] = Sha256::digest(commitment).into();
    hash[0] = VERSIONED_HASH_VERSION_KZG;
    B256::from(hash)
}

#[derive(Debug, Clone, Copy)]
struct SlotClock {
    genesis_time: u64,
    seconds_per_slot: u64,
}

impl SlotClock {
    fn slot_at(&self, timestamp: u64) -> RpcResult<u64> {
        if timestamp < self.genesis_time || self.seconds_per_slot == 0 {
            return Err(RpcError::UnexpectedResponse(format!(
                "timestamp {timestamp} outside beacon chain (genesis {}, {}s slots)",
                self.genesis_time, self.seconds_per_slot
            )));
        }
        Ok((timestamp - self.genesis_time) / self.seconds_per_slot)
    }
}

/// Fetches blobs from a beacon node by the L1 block timestamp they were included at.
#[derive(Debug)]
pub struct BeaconBlobClient {
    base: String,
    inner: Client,
    timeout: Duration,
    clock: OnceCell<SlotClock>,
}

impl BeaconBlobClient {
    pub fn new(base: &str, timeout: Duration) -> RpcResult<Self> {
        Ok(Self {
            base: base.trim_end_matches('/').to_string(),
            inner: Client::builder().timeout(timeout).build()?,
            timeout,
            clock: OnceCell::new(),
        })
    }

    async fn get<T>(&self, method: &'static str, path: &str) -> RpcResult<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let url = format!("{}/{}", self.base, path);
        let fut = async {
            self.inner
                .get(url)
                .send()
                .await?
                .error_for_status()?
                .json::<ApiResponse<T>>()
                .await
        };
        Ok(timed(method, TARGET, self.timeout, fut).await?.data)
    }

    async fn clock(&self) -> RpcResult<SlotClock> {
        self.clock
            .get_or_try_init(|| async {
                let genesis: GenesisData = self.get("beacon_genesis", GENESIS_METHOD).await?;
                let spec: SpecData = self.get("config_spec", SPEC_METHOD).await?;
                debug!(
                    genesis_time = genesis.genesis_time,
                    seconds_per_slot = spec.seconds_per_slot,
                    "loaded beacon slot clock"
                );
                Ok(SlotClock {
                    genesis_time: genesis.genesis_time,
                    seconds_per_slot: spec.seconds_per_slot,
                })
            })
            .await
            .copied()
    }
}

#[async_trait]
impl BlobClient for BeaconBlobClient {
    async fn blob_data(&self, l1_timestamp: u64, blob_hash: B256) -> RpcResult<Bytes> {
        let slot = self.clock().await?.slot_at(l1_timestamp)?;

        let sidecars: Vec<BlobSidecar> = self
            .get("blob_sidecars", &format!("{SIDECARS_METHOD_PREFIX}/{slot}"))
            .await?;

        sidecars
            .into_iter()
            .find(|s| kzg_to_versioned_hash(&s.kzg_commitment) == blob_hash)
            .map(|s| s.blob)
            .ok_or_else(|| RpcError::NotFound(format!("blob {blob_hash} in slot {slot}")))
    }
}
