use std::time::Duration;

use alloy::{
    primitives::Address,
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::Filter,
    sol_types::SolEvent,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use moka::future::Cache;
use url::Url;

use crate::abis::{v3, IERC20, IUniswapV3Pool};
use crate::config::SourceSettings;
use crate::errors::FetchError;
use crate::source::{EventSource, PoolMetadata, RawSwapLog};
use crate::utils::hex_encode;

/// Timeout for individual RPC calls (30 seconds)
const RPC_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// JSON-RPC backed event source.
///
/// Fetches Uniswap V3 `Swap` logs via `eth_getLogs` and resolves pool/token
/// metadata through direct contract reads. Block timestamps are cached since
/// a batch of logs typically spans far fewer distinct blocks than events.
pub struct RpcEventSource {
    provider: DynProvider,
    filter_addresses: Vec<Address>,
    block_timestamps: Cache<u64, DateTime<Utc>>,
}

impl RpcEventSource {
    pub fn new(settings: &SourceSettings) -> Result<Self> {
        let url = Url::parse(&settings.rpc_url).context("Invalid RPC URL")?;

        let client = ProviderBuilder::new().connect_http(url);
        let provider = DynProvider::new(client);

        let filter_addresses = settings
            .pool_filter
            .iter()
            .map(|a| a.parse().context("Invalid pool filter address"))
            .collect::<Result<Vec<Address>>>()?;

        // 100k blocks covers well over a week of mainnet history
        let block_timestamps = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(Duration::from_secs(24 * 3600))
            .build();

        Ok(Self {
            provider,
            filter_addresses,
            block_timestamps,
        })
    }
}

impl EventSource for RpcEventSource {
    async fn latest_block(&self) -> Result<u64> {
        let block = self
            .provider
            .get_block_number()
            .await
            .context("Failed to get latest block number")?;
        Ok(block)
    }

    async fn get_events(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<RawSwapLog>, FetchError> {
        let mut filter = Filter::new()
            .from_block(from_block)
            .to_block(to_block)
            .event_signature(v3::Swap::SIGNATURE_HASH);

        if !self.filter_addresses.is_empty() {
            filter = filter.address(self.filter_addresses.clone());
        }

        let logs = self
            .provider
            .get_logs(&filter)
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let raw = logs
            .into_iter()
            .filter_map(|log| {
                // Pending logs without block/index positions are useless here
                let block_number = log.block_number?;
                let log_index = log.log_index?;
                let tx_hash = log.transaction_hash?;

                Some(RawSwapLog {
                    block_number,
                    log_index,
                    tx_hash: hex_encode(tx_hash.as_slice()),
                    address: hex_encode(log.inner.address.as_slice()),
                    topics: log.inner.data.topics().to_vec(),
                    data: log.inner.data.data.to_vec(),
                })
            })
            .collect();

        Ok(raw)
    }

    async fn block_timestamp(&self, block_number: u64) -> Result<DateTime<Utc>> {
        if let Some(ts) = self.block_timestamps.get(&block_number).await {
            return Ok(ts);
        }

        let block = tokio::time::timeout(
            RPC_CALL_TIMEOUT,
            self.provider.get_block_by_number(block_number.into()),
        )
        .await
        .context("Block fetch timeout")?
        .with_context(|| format!("Failed to fetch block {}", block_number))?
        .with_context(|| format!("Block {} not found", block_number))?;

        let ts = DateTime::from_timestamp(block.header.timestamp as i64, 0)
            .with_context(|| format!("Invalid timestamp on block {}", block_number))?;

        self.block_timestamps.insert(block_number, ts).await;
        Ok(ts)
    }

    async fn pool_metadata(&self, address: &str) -> Result<PoolMetadata> {
        let addr: Address = address.parse().context("Invalid pool address")?;
        let pool = IUniswapV3Pool::new(addr, &self.provider);

        let token0 = tokio::time::timeout(RPC_CALL_TIMEOUT, pool.token0().call())
            .await
            .context("token0() timeout")?
            .context("token0() call failed")?;

        let token1 = tokio::time::timeout(RPC_CALL_TIMEOUT, pool.token1().call())
            .await
            .context("token1() timeout")?
            .context("token1() call failed")?;

        let fee = tokio::time::timeout(RPC_CALL_TIMEOUT, pool.fee().call())
            .await
            .context("fee() timeout")?
            .context("fee() call failed")?;

        Ok(PoolMetadata {
            token0: hex_encode(token0.as_slice()),
            token1: hex_encode(token1.as_slice()),
            fee: fee.to::<u32>(),
        })
    }

    async fn token_symbol(&self, address: &str) -> Result<String> {
        let addr: Address = address.parse().context("Invalid token address")?;
        let token = IERC20::new(addr, &self.provider);

        let symbol = tokio::time::timeout(RPC_CALL_TIMEOUT, token.symbol().call())
            .await
            .context("symbol() timeout")?
            .context("symbol() call failed")?;

        Ok(symbol.to_string())
    }
}
