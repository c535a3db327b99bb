//! Temporally-causal train/test partitioning.
//!
//! The cutoff is a single global date over the whole dataset, not per pool,
//! so no pool contributes test-period information to the training partition.

use chrono::{Duration, NaiveDate};
use log::info;

use crate::dataset::DatasetRow;

#[derive(Debug)]
pub struct SplitDataset {
    /// First date of the test partition.
    pub cutoff: NaiveDate,
    pub train: Vec<DatasetRow>,
    pub test: Vec<DatasetRow>,
    /// Train-period rows excluded from training for missing a target at some
    /// horizon. They still belong to the full dataset.
    pub train_excluded: Vec<DatasetRow>,
}

/// Partition rows at `max(date) - (test_window_days - 1)`.
///
/// Train rows missing any configured target are excluded from the training
/// partition: a model must never train on a label that does not exist. Test
/// rows keep undefined targets so the evaluation set reflects the full tail
/// of the data. Excluded rows are kept aside so the full-dataset artifact
/// still covers every pool-day.
pub fn split_by_cutoff(rows: Vec<DatasetRow>, test_window_days: u32) -> Option<SplitDataset> {
    let max_date = rows.iter().map(|r| r.date).max()?;
    let cutoff = max_date - Duration::days(test_window_days.saturating_sub(1) as i64);

    let mut train = Vec::new();
    let mut test = Vec::new();
    let mut train_excluded = Vec::new();

    for row in rows {
        if row.date >= cutoff {
            test.push(row);
        } else if row.targets.values().all(|t| t.is_some()) {
            train.push(row);
        } else {
            train_excluded.push(row);
        }
    }

    info!(
        "Split at {}: {} train rows ({} excluded for missing targets), {} test rows",
        cutoff,
        train.len(),
        train_excluded.len(),
        test.len()
    );

    Some(SplitDataset {
        cutoff,
        train,
        test,
        train_excluded,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::features::FeatureRow;
    use crate::dataset::targets::TargetLabel;
    use rustc_hash::FxHashMap;

    fn row(pool: &str, day: u32, with_targets: bool) -> DatasetRow {
        let mut targets = FxHashMap::default();
        targets.insert(
            3,
            with_targets.then_some(TargetLabel {
                point: 10,
                avg: 10.0,
            }),
        );
        DatasetRow {
            pool_address: pool.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, day).unwrap(),
            tx_count: 5,
            unique_users: 3,
            features: FeatureRow::default(),
            targets,
        }
    }

    #[test]
    fn every_train_date_precedes_every_test_date() {
        let rows: Vec<DatasetRow> = (1..=20).map(|d| row("0xpool", d, true)).collect();

        let split = split_by_cutoff(rows, 7).unwrap();

        // max = Mar 20, window 7 days: cutoff = Mar 14
        assert_eq!(split.cutoff, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        assert_eq!(split.test.len(), 7);
        assert_eq!(split.train.len(), 13);

        let max_train = split.train.iter().map(|r| r.date).max().unwrap();
        let min_test = split.test.iter().map(|r| r.date).min().unwrap();
        assert!(max_train < min_test);
    }

    #[test]
    fn train_rows_missing_targets_are_dropped() {
        let mut rows: Vec<DatasetRow> = (1..=20).map(|d| row("0xpool", d, true)).collect();
        rows[2].targets.insert(3, None);

        let split = split_by_cutoff(rows, 7).unwrap();

        assert_eq!(split.train.len(), 12);
        assert_eq!(split.train_excluded.len(), 1);
        assert!(split
            .train
            .iter()
            .all(|r| r.targets.values().all(|t| t.is_some())));
    }

    #[test]
    fn excluded_rows_are_retained_not_lost() {
        let mut rows: Vec<DatasetRow> = (1..=20).map(|d| row("0xpool", d, true)).collect();
        rows[2].targets.insert(3, None);

        let split = split_by_cutoff(rows, 7).unwrap();

        // Every input row lands in exactly one of the three partitions
        assert_eq!(
            split.train.len() + split.train_excluded.len() + split.test.len(),
            20
        );
        assert_eq!(
            split.train_excluded[0].date,
            NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
        );
    }

    #[test]
    fn test_rows_keep_undefined_targets() {
        let mut rows: Vec<DatasetRow> = (1..=20).map(|d| row("0xpool", d, true)).collect();
        rows[19].targets.insert(3, None);

        let split = split_by_cutoff(rows, 7).unwrap();

        assert_eq!(split.test.len(), 7);
        assert!(split.test.iter().any(|r| r.targets[&3].is_none()));
    }

    #[test]
    fn cutoff_is_global_across_pools() {
        // Pool B ends earlier than pool A; the cutoff still comes from A
        let mut rows: Vec<DatasetRow> = (1..=20).map(|d| row("0xaaa", d, true)).collect();
        rows.extend((1..=10).map(|d| row("0xbbb", d, true)));

        let split = split_by_cutoff(rows, 7).unwrap();
        assert_eq!(split.cutoff, NaiveDate::from_ymd_opt(2025, 3, 14).unwrap());
        // All of pool B lands in train
        assert!(split.test.iter().all(|r| r.pool_address == "0xaaa"));
    }

    #[test]
    fn empty_input_has_no_split() {
        assert!(split_by_cutoff(Vec::new(), 7).is_none());
    }
}
