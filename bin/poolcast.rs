use std::sync::Arc;

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{info, LevelFilter};
use simple_logger::SimpleLogger;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use poolcast::{db::IngestMessage, pipeline, Database, RpcEventSource, Settings};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    SimpleLogger::new()
        .with_level(LevelFilter::Info)
        .init()
        .unwrap();

    // Load configuration
    let settings = Arc::new(
        Settings::new()
            .context("Failed to load config.yaml. Please ensure it exists and is valid")?,
    );

    let source = Arc::new(
        RpcEventSource::new(&settings.source).context("Failed to initialize RPC event source")?,
    );

    let (ingest_tx, ingest_rx) = mpsc::channel::<IngestMessage>(128);

    let (db, ingest_handle) = Database::new(settings.clone(), ingest_rx)
        .await
        .context("Failed to initialize database connection")?;

    let cancellation_token = CancellationToken::new();

    // Ctrl+C stops the fetcher at the next batch boundary; everything already
    // persisted still flows through the remaining stages on the next run.
    let signal_token = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal (Ctrl+C), stopping at next batch boundary...");
            signal_token.cancel();
        }
    });

    info!("Starting pipeline run");

    let stats = pipeline::run(
        settings,
        source,
        db,
        ingest_tx,
        ingest_handle,
        cancellation_token,
    )
    .await?;

    info!(
        "Pipeline finished: {} events, {} pools classified, {} dataset rows",
        stats.fetch.events_fetched, stats.classify.pools_classified, stats.dataset_rows
    );

    Ok(())
}
