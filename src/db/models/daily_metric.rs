use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// Per-pool daily activity (PostgreSQL).
///
/// Primary Key: (pool_address, date)
///
/// Upserts replace the stored values instead of accumulating them: the
/// aggregator recomputes the full count for a day from the raw events each
/// run, so overlapping runs never double-count.
#[derive(Debug, Clone, Serialize)]
pub struct DailyMetric {
    pub pool_address: String,
    pub date: NaiveDate,
    pub tx_count: i64,
    pub unique_users: i64,
    pub updated_at: DateTime<Utc>,
}

impl DailyMetric {
    pub fn new(pool_address: String, date: NaiveDate, tx_count: i64, unique_users: i64) -> Self {
        Self {
            pool_address: pool_address.to_lowercase(),
            date,
            tx_count,
            unique_users,
            updated_at: Utc::now(),
        }
    }
}
