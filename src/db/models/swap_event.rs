use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// One decoded swap against a pool (PostgreSQL, append-only).
///
/// Primary Key: (block_number, log_index) - replaying an already-fetched
/// block range inserts nothing new, which is what makes re-ingestion of
/// overlapping ranges idempotent.
#[derive(Debug, Clone, Serialize)]
pub struct SwapEvent {
    pub block_number: i64,
    pub log_index: i64,
    pub tx_hash: String,
    pub timestamp: DateTime<Utc>,
    pub date: NaiveDate,
    pub pool_address: String,
    pub sender: String,
    pub recipient: String,
    /// Raw signed token deltas, kept as decimal strings (int256 range).
    pub amount0: String,
    pub amount1: String,
}
