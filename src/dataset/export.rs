//! CSV export of the assembled dataset.
//!
//! Three artifacts per run: the full dataset, the training partition, and
//! the test partition. Each row joins the pool-day metrics and features with
//! the pool's descriptive metadata and a set of fixed-threshold categorical
//! buckets.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::config::DatasetSettings;
use crate::dataset::{split::SplitDataset, DatasetRow};
use crate::db::models::Pool;

const FULL_FILE: &str = "pool_full_dataset.csv";
const TRAIN_FILE: &str = "pool_training_data.csv";
const TEST_FILE: &str = "pool_test_data.csv";

#[derive(Debug, Default)]
pub struct ExportSummary {
    pub full_rows: u64,
    pub train_rows: u64,
    pub test_rows: u64,
    /// Rows skipped because their pool was never classified.
    pub rows_without_pool: u64,
}

pub struct Exporter {
    output_dir: PathBuf,
    horizons: Vec<usize>,
    stablecoins: FxHashSet<String>,
}

impl Exporter {
    pub fn new(settings: &DatasetSettings, stablecoins: &[String]) -> Self {
        let mut horizons = settings.horizons.clone();
        horizons.sort_unstable();
        horizons.dedup();

        Self {
            output_dir: PathBuf::from(&settings.output_dir),
            horizons,
            stablecoins: stablecoins.iter().map(|a| a.to_lowercase()).collect(),
        }
    }

    /// Write all three CSV artifacts into the output directory.
    pub fn export(
        &self,
        split: &SplitDataset,
        pools: &FxHashMap<String, Pool>,
    ) -> Result<ExportSummary> {
        std::fs::create_dir_all(&self.output_dir)
            .with_context(|| format!("Failed to create {}", self.output_dir.display()))?;

        let mut summary = ExportSummary::default();

        // The full artifact covers every pool-day, including train-period
        // rows excluded from training for missing targets
        let mut full: Vec<&DatasetRow> = split
            .train
            .iter()
            .chain(&split.train_excluded)
            .chain(&split.test)
            .collect();
        full.sort_by(|a, b| (&a.pool_address, a.date).cmp(&(&b.pool_address, b.date)));

        summary.full_rows = self.write_file(
            &self.output_dir.join(FULL_FILE),
            &full,
            pools,
            &mut summary.rows_without_pool,
        )?;

        // The partitions skip the same rows; count them once, in the full pass
        let mut discard = 0;
        let train: Vec<&DatasetRow> = split.train.iter().collect();
        summary.train_rows =
            self.write_file(&self.output_dir.join(TRAIN_FILE), &train, pools, &mut discard)?;

        let test: Vec<&DatasetRow> = split.test.iter().collect();
        summary.test_rows =
            self.write_file(&self.output_dir.join(TEST_FILE), &test, pools, &mut discard)?;

        info!(
            "Exported {} full / {} train / {} test rows to {}",
            summary.full_rows,
            summary.train_rows,
            summary.test_rows,
            self.output_dir.display()
        );
        if summary.rows_without_pool > 0 {
            warn!(
                "{} rows referenced pools with no classification and were skipped",
                summary.rows_without_pool
            );
        }

        Ok(summary)
    }

    fn write_file(
        &self,
        path: &Path,
        rows: &[&DatasetRow],
        pools: &FxHashMap<String, Pool>,
        skipped: &mut u64,
    ) -> Result<u64> {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        self.write_rows(file, rows, pools, skipped)
    }

    /// Serialize rows to any writer. Split from file creation so tests can
    /// target an in-memory buffer.
    fn write_rows<W: Write>(
        &self,
        writer: W,
        rows: &[&DatasetRow],
        pools: &FxHashMap<String, Pool>,
        skipped: &mut u64,
    ) -> Result<u64> {
        let mut csv = csv::Writer::from_writer(writer);

        csv.write_record(self.header())
            .context("Failed to write CSV header")?;

        let mut written = 0;
        for row in rows {
            let Some(pool) = pools.get(&row.pool_address) else {
                *skipped += 1;
                continue;
            };

            csv.write_record(self.record(row, pool))
                .context("Failed to write CSV row")?;
            written += 1;
        }

        csv.flush().context("Failed to flush CSV")?;
        Ok(written)
    }

    fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = [
            "pool_address",
            "date",
            "pool_name",
            "token0_symbol",
            "token1_symbol",
            "fee",
            "fee_percentage",
            "pool_type",
            "tx_count",
            "unique_users",
            "tx_count_3d_avg",
            "tx_count_7d_avg",
            "tx_count_7d_std",
            "tx_count_cumulative",
            "days_since_start",
            "day_number",
            "tx_growth_rate",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        for h in &self.horizons {
            header.push(format!("target_tx_{}d_ahead", h));
        }
        for h in &self.horizons {
            header.push(format!("target_tx_{}d_avg_ahead", h));
        }

        header.extend(
            [
                "stablecoin_pair_type",
                "activity_level",
                "pool_maturity",
                "volatility_level",
            ]
            .iter()
            .map(|s| s.to_string()),
        );

        header
    }

    fn record(&self, row: &DatasetRow, pool: &Pool) -> Vec<String> {
        let f = &row.features;

        let mut record = vec![
            row.pool_address.clone(),
            row.date.to_string(),
            pool.name(),
            pool.token0_symbol.clone(),
            pool.token1_symbol.clone(),
            pool.fee.to_string(),
            pool.fee_percentage().to_string(),
            pool.pool_type.as_str().to_string(),
            row.tx_count.to_string(),
            row.unique_users.to_string(),
            f.tx_count_3d_avg.to_string(),
            f.tx_count_7d_avg.to_string(),
            f.tx_count_7d_std.to_string(),
            f.tx_count_cumulative.to_string(),
            f.days_since_start.to_string(),
            f.day_number.to_string(),
            f.tx_growth_rate.to_string(),
        ];

        // Undefined targets export as empty cells
        for h in &self.horizons {
            let cell = row
                .targets
                .get(h)
                .and_then(|t| *t)
                .map(|t| t.point.to_string())
                .unwrap_or_default();
            record.push(cell);
        }
        for h in &self.horizons {
            let cell = row
                .targets
                .get(h)
                .and_then(|t| *t)
                .map(|t| t.avg.to_string())
                .unwrap_or_default();
            record.push(cell);
        }

        record.push(stablecoin_pair_type(pool, &self.stablecoins).to_string());
        record.push(activity_level(row.tx_count).to_string());
        record.push(pool_maturity(f.days_since_start).to_string());
        record.push(volatility_level(f.tx_count_7d_std, f.tx_count_7d_avg).to_string());

        record
    }
}

/// How many of the pool's tokens are configured stablecoins.
fn stablecoin_pair_type(pool: &Pool, stablecoins: &FxHashSet<String>) -> &'static str {
    let stable0 = stablecoins.contains(&pool.token0);
    let stable1 = stablecoins.contains(&pool.token1);
    match (stable0, stable1) {
        (true, true) => "stable_stable",
        (true, false) | (false, true) => "stable_other",
        (false, false) => "other",
    }
}

fn activity_level(tx_count: i64) -> &'static str {
    if tx_count >= 20 {
        "high"
    } else if tx_count >= 5 {
        "medium"
    } else {
        "low"
    }
}

fn pool_maturity(days_since_start: i64) -> &'static str {
    if days_since_start < 7 {
        "new"
    } else if days_since_start < 30 {
        "young"
    } else if days_since_start < 90 {
        "mature"
    } else {
        "established"
    }
}

/// Bucket by coefficient of variation of the trailing 7-row window.
fn volatility_level(std: f64, avg: f64) -> &'static str {
    let cov = if avg == 0.0 { 0.0 } else { std / avg };
    if cov < 0.3 {
        "low_vol"
    } else if cov < 0.7 {
        "medium_vol"
    } else {
        "high_vol"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::features::FeatureRow;
    use crate::dataset::targets::TargetLabel;
    use crate::db::models::PoolType;
    use chrono::NaiveDate;

    const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
    const USDT: &str = "0xdac17f958d2ee523a2206206994597c13d831ec7";
    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

    fn stables() -> FxHashSet<String> {
        [USDC, USDT].iter().map(|s| s.to_string()).collect()
    }

    fn pool(token0: &str, token1: &str) -> Pool {
        Pool::new(
            "0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640".to_string(),
            token0.to_string(),
            token1.to_string(),
            "T0".to_string(),
            "T1".to_string(),
            500,
            PoolType::Other,
        )
    }

    #[test]
    fn stablecoin_pair_buckets() {
        let s = stables();
        assert_eq!(stablecoin_pair_type(&pool(USDC, USDT), &s), "stable_stable");
        assert_eq!(stablecoin_pair_type(&pool(USDC, WETH), &s), "stable_other");
        assert_eq!(stablecoin_pair_type(&pool(WETH, WETH), &s), "other");
    }

    #[test]
    fn activity_thresholds_are_inclusive() {
        assert_eq!(activity_level(20), "high");
        assert_eq!(activity_level(19), "medium");
        assert_eq!(activity_level(5), "medium");
        assert_eq!(activity_level(4), "low");
        assert_eq!(activity_level(0), "low");
    }

    #[test]
    fn maturity_thresholds() {
        assert_eq!(pool_maturity(0), "new");
        assert_eq!(pool_maturity(6), "new");
        assert_eq!(pool_maturity(7), "young");
        assert_eq!(pool_maturity(29), "young");
        assert_eq!(pool_maturity(30), "mature");
        assert_eq!(pool_maturity(89), "mature");
        assert_eq!(pool_maturity(90), "established");
    }

    #[test]
    fn volatility_from_coefficient_of_variation() {
        assert_eq!(volatility_level(1.0, 10.0), "low_vol");
        assert_eq!(volatility_level(5.0, 10.0), "medium_vol");
        assert_eq!(volatility_level(8.0, 10.0), "high_vol");
        // Zero average never divides
        assert_eq!(volatility_level(3.0, 0.0), "low_vol");
    }

    fn dataset_row(pool_address: &str, target: Option<TargetLabel>) -> DatasetRow {
        let mut targets = FxHashMap::default();
        targets.insert(3, target);
        DatasetRow {
            pool_address: pool_address.to_string(),
            date: NaiveDate::from_ymd_opt(2025, 3, 5).unwrap(),
            tx_count: 21,
            unique_users: 9,
            features: FeatureRow {
                tx_count_3d_avg: 18.0,
                tx_count_7d_avg: 16.0,
                tx_count_7d_std: 2.0,
                tx_count_cumulative: 80,
                days_since_start: 4,
                day_number: 5,
                tx_growth_rate: 0.5,
                ..Default::default()
            },
            targets,
        }
    }

    fn exporter() -> Exporter {
        Exporter {
            output_dir: PathBuf::from("unused"),
            horizons: vec![3],
            stablecoins: stables(),
        }
    }

    #[test]
    fn writes_header_and_joined_row() {
        let pool = pool(USDC, WETH);
        let mut pools = FxHashMap::default();
        pools.insert(pool.address.clone(), pool);

        let row = dataset_row("0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640", Some(TargetLabel { point: 25, avg: 22.5 }));
        let rows = vec![&row];

        let mut buffer = Vec::new();
        let mut skipped = 0;
        let written = exporter()
            .write_rows(&mut buffer, &rows, &pools, &mut skipped)
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(skipped, 0);

        let text = String::from_utf8(buffer).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("pool_address,date,pool_name"));
        assert!(header.contains("target_tx_3d_ahead"));
        assert!(header.ends_with("volatility_level"));

        let line = lines.next().unwrap();
        assert!(line.contains("T0/T1"));
        assert!(line.contains("0.0005")); // fee_percentage of tier 500
        assert!(line.contains(",25,22.5,"));
        assert!(line.contains("stable_other"));
        assert!(line.contains("high")); // 21 tx
        assert!(line.contains("new")); // 4 days since start
    }

    #[test]
    fn full_export_keeps_rows_excluded_from_training() {
        use crate::dataset::split::split_by_cutoff;
        use std::io::Read;

        let pool = pool(USDC, WETH);
        let address = pool.address.clone();
        let mut pools = FxHashMap::default();
        pools.insert(address.clone(), pool);

        // 20 pool-days; one pre-cutoff row is missing its target
        let mut rows: Vec<DatasetRow> = (1..=20)
            .map(|d| {
                let mut r = dataset_row(&address, Some(TargetLabel { point: 10, avg: 10.0 }));
                r.date = NaiveDate::from_ymd_opt(2025, 3, d).unwrap();
                r
            })
            .collect();
        rows[2].targets.insert(3, None);

        let split = split_by_cutoff(rows, 7).unwrap();
        assert_eq!(split.train.len(), 12);

        let dir = std::env::temp_dir().join("poolcast_export_test");
        let exporter = Exporter {
            output_dir: dir.clone(),
            horizons: vec![3],
            stablecoins: stables(),
        };
        let summary = exporter.export(&split, &pools).unwrap();

        // Training drops the incomplete row; the full dataset never does
        assert_eq!(summary.train_rows, 12);
        assert_eq!(summary.test_rows, 7);
        assert_eq!(summary.full_rows, 20);

        let mut text = String::new();
        std::fs::File::open(dir.join(FULL_FILE))
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text.lines().count(), 21); // header + one row per pool-day
        assert!(text.contains("2025-03-03"));

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn undefined_target_is_empty_cell_and_unknown_pool_is_skipped() {
        let pool = pool(USDC, WETH);
        let mut pools = FxHashMap::default();
        pools.insert(pool.address.clone(), pool);

        let known = dataset_row("0x88e6a0c2ddd26feeb64f039a2c41296fcb3f5640", None);
        let unknown = dataset_row("0x000000000000000000000000000000000000dead", None);
        let rows = vec![&known, &unknown];

        let mut buffer = Vec::new();
        let mut skipped = 0;
        let written = exporter()
            .write_rows(&mut buffer, &rows, &pools, &mut skipped)
            .unwrap();

        assert_eq!(written, 1);
        assert_eq!(skipped, 1);

        let text = String::from_utf8(buffer).unwrap();
        let line = text.lines().nth(1).unwrap();
        // Point and avg target cells are both empty
        assert!(line.contains(",,,"));
    }
}
