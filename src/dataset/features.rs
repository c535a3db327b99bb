//! Trailing per-pool statistics over the daily metric sequence.
//!
//! All windows are over a pool's own rows in ascending date order, index
//! based: calendar gaps do not widen or shrink a window. Windows are partial
//! at the start of the sequence rather than undefined.

use crate::db::models::DailyMetric;

/// Rolling statistics for one pool-day.
#[derive(Debug, Clone, Default)]
pub struct FeatureRow {
    /// Mean tx count over the trailing window of at most 3 rows.
    pub tx_count_3d_avg: f64,
    /// Mean tx count over the trailing window of at most 7 rows.
    pub tx_count_7d_avg: f64,
    /// Sample standard deviation over the trailing 7-row window; 0 for a
    /// single-element window.
    pub tx_count_7d_std: f64,
    /// Running total of tx counts from the pool's first row.
    pub tx_count_cumulative: i64,
    /// Calendar days between this row's date and the pool's first date.
    pub days_since_start: i64,
    /// 1-based position in the pool's sequence.
    pub day_number: i64,
    /// Day-over-day relative change; 0 when there is no previous row or the
    /// previous count was 0.
    pub tx_growth_rate: f64,
}

/// Compute features for one pool's rows, which must already be sorted
/// ascending by date with no duplicate dates.
pub fn compute_features(rows: &[DailyMetric]) -> Vec<FeatureRow> {
    let counts: Vec<f64> = rows.iter().map(|r| r.tx_count as f64).collect();

    let mut features = Vec::with_capacity(rows.len());
    let mut cumulative: i64 = 0;

    for (i, row) in rows.iter().enumerate() {
        cumulative += row.tx_count;

        let window_3 = trailing_window(&counts, i, 3);
        let window_7 = trailing_window(&counts, i, 7);

        let tx_growth_rate = if i > 0 && rows[i - 1].tx_count != 0 {
            (row.tx_count - rows[i - 1].tx_count) as f64 / rows[i - 1].tx_count as f64
        } else {
            0.0
        };

        features.push(FeatureRow {
            tx_count_3d_avg: mean(window_3),
            tx_count_7d_avg: mean(window_7),
            tx_count_7d_std: sample_std(window_7),
            tx_count_cumulative: cumulative,
            days_since_start: (row.date - rows[0].date).num_days(),
            day_number: i as i64 + 1,
            tx_growth_rate,
        });
    }

    features
}

/// The at-most-`size` values ending at index `i` inclusive.
fn trailing_window(values: &[f64], i: usize, size: usize) -> &[f64] {
    let start = (i + 1).saturating_sub(size);
    &values[start..=i]
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n-1 denominator); 0 for fewer than 2 values.
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let variance =
        values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
