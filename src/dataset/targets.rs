//! Forward-looking target labels.
//!
//! Horizons are offsets into the pool's own row sequence, not calendar days:
//! a pool with sparse activity predicts "H active days from now" rather than
//! "H calendar days from now". Rows without enough remaining history carry
//! `None` instead of a value read from the past.

use rustc_hash::FxHashMap;

use crate::db::models::DailyMetric;

/// Labels for one pool-day at one horizon.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetLabel {
    /// Transaction count exactly H rows ahead.
    pub point: i64,
    /// Mean transaction count over the next H rows.
    pub avg: f64,
}

/// Compute targets for one pool's rows (sorted ascending by date) at each
/// configured horizon. Output index i corresponds to input row i.
pub fn compute_targets(
    rows: &[DailyMetric],
    horizons: &[usize],
) -> Vec<FxHashMap<usize, Option<TargetLabel>>> {
    let n = rows.len();
    let mut out = Vec::with_capacity(n);

    for i in 0..n {
        let mut labels = FxHashMap::default();
        for &h in horizons {
            let label = if h > 0 && i + h < n {
                let window = &rows[i + 1..=i + h];
                let sum: i64 = window.iter().map(|r| r.tx_count).sum();
                Some(TargetLabel {
                    point: rows[i + h].tx_count,
                    avg: sum as f64 / h as f64,
                })
            } else {
                None
            };
            labels.insert(h, label);
        }
        out.push(labels);
    }

    out
}
