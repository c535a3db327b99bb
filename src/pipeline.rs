//! One end-to-end pipeline run.
//!
//! Stages run sequentially: fetch, flush the ingest writer, classify new
//! pools, aggregate daily metrics, assemble features and targets, split,
//! export. Failures inside a stage are isolated to their unit of work and
//! surface as counters in [`RunStats`]; only the initial connections abort
//! a run before any work happens.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use log::info;
use rustc_hash::FxHashMap;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::classifier::{ClassifyReport, PoolClassifier};
use crate::config::Settings;
use crate::dataset::{self, aggregator, export::Exporter, export::ExportSummary, split};
use crate::db::{Database, IngestMessage};
use crate::fetcher::{FetchReport, LogFetcher};
use crate::source::EventSource;

/// Run-level accounting, logged at completion.
#[derive(Debug, Default)]
pub struct RunStats {
    pub fetch: FetchReport,
    pub classify: ClassifyReport,
    pub daily_rows_upserted: u64,
    pub dataset_rows: u64,
    pub export: ExportSummary,
}

pub async fn run<S: EventSource>(
    settings: Arc<Settings>,
    source: Arc<S>,
    db: Database,
    ingest_tx: mpsc::Sender<IngestMessage>,
    ingest_handle: JoinHandle<()>,
    cancellation_token: CancellationToken,
) -> Result<RunStats> {
    let mut stats = RunStats::default();

    // Stage 1: fetch the lookback window
    let latest = source
        .latest_block()
        .await
        .context("Failed to resolve chain head")?;
    let lookback_blocks = settings.fetcher.lookback_days * settings.fetcher.blocks_per_day;
    let from_block = latest.saturating_sub(lookback_blocks);

    let fetcher = LogFetcher::new(source.clone(), ingest_tx.clone(), &settings.fetcher);
    stats.fetch = fetcher
        .fetch_range(from_block, latest, &cancellation_token)
        .await?;

    // Flush: the writer must drain before aggregation reads swap_events
    ingest_tx
        .send(IngestMessage::Shutdown)
        .await
        .map_err(|_| anyhow::anyhow!("Ingest channel closed"))?;
    drop(ingest_tx);
    ingest_handle
        .await
        .context("Ingest writer task panicked")?;

    if cancellation_token.is_cancelled() {
        info!("Run cancelled after fetch; skipping dataset stages");
        return Ok(stats);
    }

    // Stage 2: classify pools seen this run
    let classifier = PoolClassifier::new(source, db.clone(), &settings.classifier);
    stats.classify = classifier.classify_pools(&stats.fetch.pool_addresses).await?;

    // Stage 3: aggregate the lookback window's events
    let since = Utc::now().date_naive() - Duration::days(settings.fetcher.lookback_days as i64);
    let events = db.postgres.get_swap_events_since(since).await?;
    info!("Aggregating {} events since {}", events.len(), since);

    let metrics = aggregator::aggregate_daily(&events);
    db.postgres.set_daily_metrics(&metrics).await?;
    stats.daily_rows_upserted = metrics.len() as u64;

    // Stage 4: features, targets, split, export over the full stored history
    let all_metrics = db.postgres.get_daily_metrics().await?;
    let rows = dataset::assemble_rows(&all_metrics, &settings.dataset.horizons);
    stats.dataset_rows = rows.len() as u64;

    let Some(split) = split::split_by_cutoff(rows, settings.dataset.test_window_days) else {
        info!("No dataset rows to split; skipping export");
        log_stats(&stats);
        return Ok(stats);
    };

    let pools: FxHashMap<String, _> = db
        .postgres
        .get_all_pools()
        .await?
        .into_iter()
        .map(|p| (p.address.clone(), p))
        .collect();

    let exporter = Exporter::new(&settings.dataset, &settings.classifier.stablecoins);
    stats.export = exporter.export(&split, &pools)?;

    log_stats(&stats);
    Ok(stats)
}

fn log_stats(stats: &RunStats) {
    info!(
        "Run complete: {} events fetched ({} skipped, {} ranges abandoned), \
         {} pools classified ({} failed), {} daily rows upserted, \
         {} dataset rows ({} train / {} test exported)",
        stats.fetch.events_fetched,
        stats.fetch.events_skipped,
        stats.fetch.ranges_abandoned,
        stats.classify.pools_classified,
        stats.classify.pools_failed,
        stats.daily_rows_upserted,
        stats.dataset_rows,
        stats.export.train_rows,
        stats.export.test_rows,
    );
}
