use chrono::{DateTime, Utc};
use serde::Serialize;

/// Activity class of a pool, derived purely from its token pair.
///
/// Immutable once assigned: re-classification of a known pool never changes
/// this field, only symbol metadata may be refreshed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PoolType {
    EthPaired,
    Stablecoin,
    Other,
}

impl PoolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolType::EthPaired => "eth_paired",
            PoolType::Stablecoin => "stablecoin",
            PoolType::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "eth_paired" => PoolType::EthPaired,
            "stablecoin" => PoolType::Stablecoin,
            _ => PoolType::Other,
        }
    }
}

/// Pool metadata and classification (PostgreSQL).
///
/// Primary Key: address
#[derive(Debug, Clone, Serialize)]
pub struct Pool {
    pub address: String,
    pub token0: String,
    pub token1: String,
    pub token0_symbol: String,
    pub token1_symbol: String,
    /// Fee tier in hundredths of a bip (3000 = 0.30%).
    pub fee: i64,
    pub pool_type: PoolType,
    pub updated_at: DateTime<Utc>,
}

impl Pool {
    pub fn new(
        address: String,
        token0: String,
        token1: String,
        token0_symbol: String,
        token1_symbol: String,
        fee: i64,
        pool_type: PoolType,
    ) -> Self {
        Self {
            // Always lowercase addresses for consistent comparisons
            address: address.to_lowercase(),
            token0: token0.to_lowercase(),
            token1: token1.to_lowercase(),
            token0_symbol,
            token1_symbol,
            fee,
            pool_type,
            updated_at: Utc::now(),
        }
    }

    /// Human-readable pair name, e.g. "USDC/WETH".
    pub fn name(&self) -> String {
        format!("{}/{}", self.token0_symbol, self.token1_symbol)
    }

    /// Fee tier as a fraction (3000 -> 0.003).
    pub fn fee_percentage(&self) -> f64 {
        self.fee as f64 / 1_000_000.0
    }
}
