//! Pool discovery and classification.
//!
//! Every pool address seen by the fetcher passes through here. Known pools
//! are skipped via an in-memory cache backed by a database membership check,
//! so re-runs over the same range cost no external calls. Unseen pools get
//! their token pair resolved through contract reads and are classified with
//! a pure function of the pair; the resulting upsert is idempotent, so a
//! duplicate in-flight classification is harmless.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::future::join_all;
use log::{debug, info, warn};
use moka::future::Cache;
use rustc_hash::FxHashSet;

use crate::config::ClassifierSettings;
use crate::db::{
    models::{Pool, PoolType},
    Database,
};
use crate::source::EventSource;

/// Symbol used when an ERC-20 `symbol()` read fails. Symbol metadata is
/// cosmetic; its absence never excludes a pool.
const UNKNOWN_SYMBOL: &str = "UNKNOWN";

/// Failed pools are retried after this long, not on every run.
const INVALID_POOL_TTL: Duration = Duration::from_secs(3600);

/// Outcome counters for one classification pass.
#[derive(Debug, Default)]
pub struct ClassifyReport {
    pub pools_seen: u64,
    /// Already classified; skipped without any external call.
    pub pools_known: u64,
    /// Failed recently and still inside the retry cooldown; skipped.
    pub pools_recently_failed: u64,
    pub pools_classified: u64,
    /// Core metadata read failed; pool excluded from this run.
    pub pools_failed: u64,
}

pub struct PoolClassifier<S> {
    source: Arc<S>,
    db: Database,
    /// Addresses confirmed present in the pools table.
    known_pools: Cache<String, ()>,
    /// Addresses whose core reads failed recently.
    invalid_pools: Cache<String, ()>,
    wrapped_native: String,
    stablecoins: FxHashSet<String>,
    batch_size: usize,
    batch_delay: Duration,
}

impl<S: EventSource> PoolClassifier<S> {
    pub fn new(source: Arc<S>, db: Database, settings: &ClassifierSettings) -> Self {
        let known_pools = Cache::builder().max_capacity(500_000).build();

        let invalid_pools = Cache::builder()
            .max_capacity(100_000)
            .time_to_live(INVALID_POOL_TTL)
            .build();

        Self {
            source,
            db,
            known_pools,
            invalid_pools,
            wrapped_native: settings.wrapped_native_address.to_lowercase(),
            stablecoins: settings
                .stablecoins
                .iter()
                .map(|a| a.to_lowercase())
                .collect(),
            batch_size: settings.batch_size.max(1),
            batch_delay: Duration::from_millis(settings.batch_delay_ms),
        }
    }

    /// Ensure every address in `addresses` has a row in the pools table.
    ///
    /// Resolution is batched: all pools of one batch concurrently, batches
    /// sequential with a fixed delay. A failed pool is counted and excluded,
    /// never fatal to the pass.
    pub async fn classify_pools(&self, addresses: &FxHashSet<String>) -> Result<ClassifyReport> {
        let mut report = ClassifyReport {
            pools_seen: addresses.len() as u64,
            ..Default::default()
        };

        let unseen =
            triage_cached(&self.known_pools, &self.invalid_pools, addresses, &mut report).await;

        if unseen.is_empty() {
            return Ok(report);
        }

        // One membership query instead of per-address lookups
        let existing = self.db.postgres.get_pools(&unseen).await?;
        let existing: FxHashSet<String> = existing.into_iter().map(|p| p.address).collect();

        let mut to_resolve = Vec::new();
        for address in unseen {
            if existing.contains(&address) {
                self.known_pools.insert(address, ()).await;
                report.pools_known += 1;
            } else {
                to_resolve.push(address);
            }
        }

        if to_resolve.is_empty() {
            return Ok(report);
        }

        info!("Classifying {} new pools", to_resolve.len());

        for (i, chunk) in to_resolve.chunks(self.batch_size).enumerate() {
            if i > 0 {
                tokio::time::sleep(self.batch_delay).await;
            }

            let results = join_all(chunk.iter().map(|address| {
                resolve_pool(
                    self.source.as_ref(),
                    address,
                    &self.wrapped_native,
                    &self.stablecoins,
                )
            }))
            .await;

            let mut resolved = Vec::new();
            for (address, result) in chunk.iter().zip(results) {
                match result {
                    Ok(pool) => {
                        debug!("Classified pool {} as {}", pool.address, pool.pool_type.as_str());
                        resolved.push(pool);
                    },
                    Err(e) => {
                        warn!("Failed to classify pool {}: {:#}", address, e);
                        self.invalid_pools.insert(address.clone(), ()).await;
                        report.pools_failed += 1;
                    },
                }
            }

            if !resolved.is_empty() {
                let refs: Vec<&Pool> = resolved.iter().collect();
                self.db.postgres.set_pools(&refs).await?;

                for pool in &resolved {
                    self.known_pools.insert(pool.address.clone(), ()).await;
                }
                report.pools_classified += resolved.len() as u64;
            }
        }

        info!(
            "Classification done: {} known, {} in failure cooldown, {} classified, {} failed",
            report.pools_known,
            report.pools_recently_failed,
            report.pools_classified,
            report.pools_failed
        );

        Ok(report)
    }
}

/// Sort addresses by cache state, counting each bucket. Returns the
/// addresses that need external resolution.
async fn triage_cached(
    known_pools: &Cache<String, ()>,
    invalid_pools: &Cache<String, ()>,
    addresses: &FxHashSet<String>,
    report: &mut ClassifyReport,
) -> Vec<String> {
    let mut unseen = Vec::new();
    for address in addresses {
        let address = address.to_lowercase();
        if known_pools.get(&address).await.is_some() {
            report.pools_known += 1;
        } else if invalid_pools.get(&address).await.is_some() {
            report.pools_recently_failed += 1;
        } else {
            unseen.push(address);
        }
    }
    unseen
}

/// Resolve one pool's token pair and build its [`Pool`] row.
///
/// The `token0()`/`token1()`/`fee()` reads are required; a `symbol()` failure
/// falls back to [`UNKNOWN_SYMBOL`].
async fn resolve_pool<S: EventSource>(
    source: &S,
    address: &str,
    wrapped_native: &str,
    stablecoins: &FxHashSet<String>,
) -> Result<Pool> {
    let metadata = source
        .pool_metadata(address)
        .await
        .context("Core pool metadata read failed")?;

    let token0_symbol = match source.token_symbol(&metadata.token0).await {
        Ok(symbol) => symbol,
        Err(e) => {
            debug!("symbol() failed for token {}: {:#}", metadata.token0, e);
            UNKNOWN_SYMBOL.to_string()
        },
    };
    let token1_symbol = match source.token_symbol(&metadata.token1).await {
        Ok(symbol) => symbol,
        Err(e) => {
            debug!("symbol() failed for token {}: {:#}", metadata.token1, e);
            UNKNOWN_SYMBOL.to_string()
        },
    };

    let pool_type = classify_pool_type(&metadata.token0, &metadata.token1, wrapped_native, stablecoins);

    Ok(Pool::new(
        address.to_string(),
        metadata.token0,
        metadata.token1,
        token0_symbol,
        token1_symbol,
        metadata.fee as i64,
        pool_type,
    ))
}

/// Classify a pool from its token pair alone.
///
/// Wrapped-native pairing wins over stablecoin membership; a WETH/USDC pool
/// is `eth_paired`, not `stablecoin`.
pub fn classify_pool_type(
    token0: &str,
    token1: &str,
    wrapped_native: &str,
    stablecoins: &FxHashSet<String>,
) -> PoolType {
    let token0 = token0.to_lowercase();
    let token1 = token1.to_lowercase();

    if token0 == wrapped_native || token1 == wrapped_native {
        PoolType::EthPaired
    } else if stablecoins.contains(&token0) && stablecoins.contains(&token1) {
        PoolType::Stablecoin
    } else {
        PoolType::Other
    }
}
