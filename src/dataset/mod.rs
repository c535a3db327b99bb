//! Dataset construction: raw swap events in, supervised-learning CSVs out.
//!
//! All stages after aggregation are pure functions over in-memory rows, so
//! every numeric property is unit-testable without a database.

pub mod aggregator;
pub mod export;
pub mod features;
pub mod split;
pub mod targets;

use chrono::NaiveDate;
use rustc_hash::FxHashMap;

use crate::db::models::DailyMetric;

/// One pool-day of the assembled dataset: daily metric plus rolling features
/// and forward targets, keyed by horizon.
#[derive(Debug, Clone)]
pub struct DatasetRow {
    pub pool_address: String,
    pub date: NaiveDate,
    pub tx_count: i64,
    pub unique_users: i64,
    pub features: features::FeatureRow,
    /// horizon (rows ahead) -> labels; `None` when the pool's sequence is
    /// too short to look that far forward.
    pub targets: FxHashMap<usize, Option<targets::TargetLabel>>,
}

/// Attach features and targets to daily metrics.
///
/// `metrics` must be sorted by `(pool_address, date)` as returned by the
/// daily metrics query; each pool's run is processed independently.
pub fn assemble_rows(metrics: &[DailyMetric], horizons: &[usize]) -> Vec<DatasetRow> {
    let mut rows = Vec::with_capacity(metrics.len());

    let mut start = 0;
    while start < metrics.len() {
        let pool = &metrics[start].pool_address;
        let end = metrics[start..]
            .iter()
            .position(|m| &m.pool_address != pool)
            .map_or(metrics.len(), |offset| start + offset);

        let pool_rows = &metrics[start..end];
        let features = features::compute_features(pool_rows);
        let targets = targets::compute_targets(pool_rows, horizons);

        for ((metric, features), targets) in pool_rows.iter().zip(features).zip(targets) {
            rows.push(DatasetRow {
                pool_address: metric.pool_address.clone(),
                date: metric.date,
                tx_count: metric.tx_count,
                unique_users: metric.unique_users,
                features,
                targets,
            });
        }

        start = end;
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_pools_independently() {
        let start = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let mut metrics = Vec::new();
        for (pool, counts) in [("0xaaa", vec![10i64, 12, 9]), ("0xbbb", vec![100, 50])] {
            for (i, &c) in counts.iter().enumerate() {
                metrics.push(DailyMetric::new(
                    pool.to_string(),
                    start + chrono::Duration::days(i as i64),
                    c,
                    c,
                ));
            }
        }

        let rows = assemble_rows(&metrics, &[1]);
        assert_eq!(rows.len(), 5);

        // Cumulative counters reset at the pool boundary
        assert_eq!(rows[2].features.tx_count_cumulative, 31);
        assert_eq!(rows[3].features.tx_count_cumulative, 100);
        assert_eq!(rows[3].features.day_number, 1);

        // Targets never cross the pool boundary
        assert!(rows[2].targets[&1].is_none());
        assert_eq!(rows[3].targets[&1].unwrap().point, 50);
    }
}
