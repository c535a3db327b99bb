//! Abstract upstream log source.
//!
//! The fetcher and classifier only talk to [`EventSource`], never to a
//! concrete provider. Production uses [`RpcEventSource`]; tests use scripted
//! fakes that reject ranges or serve malformed logs.

mod rpc;

pub use rpc::RpcEventSource;

use alloy::primitives::B256;
use chrono::{DateTime, Utc};

use crate::errors::FetchError;

/// One raw swap log exactly as the source returned it, before decoding.
#[derive(Debug, Clone)]
pub struct RawSwapLog {
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: String,
    /// Emitting pool contract, lowercase hex.
    pub address: String,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
}

/// Core pool contract fields resolved via contract reads.
#[derive(Debug, Clone)]
pub struct PoolMetadata {
    pub token0: String,
    pub token1: String,
    pub fee: u32,
}

/// Upstream collaborator contract.
///
/// `get_events` may reject an overly large range; that is what drives the
/// fetcher's adaptive halving. All other calls use plain `anyhow` errors
/// since their failures are isolated per pool or per block.
pub trait EventSource: Send + Sync {
    fn latest_block(&self) -> impl std::future::Future<Output = anyhow::Result<u64>> + Send;

    fn get_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> impl std::future::Future<Output = Result<Vec<RawSwapLog>, FetchError>> + Send;

    fn block_timestamp(
        &self,
        block_number: u64,
    ) -> impl std::future::Future<Output = anyhow::Result<DateTime<Utc>>> + Send;

    fn pool_metadata(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = anyhow::Result<PoolMetadata>> + Send;

    fn token_symbol(
        &self,
        address: &str,
    ) -> impl std::future::Future<Output = anyhow::Result<String>> + Send;
}
