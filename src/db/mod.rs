use std::sync::Arc;

use log::{error, info};
use tokio::{sync::mpsc, task::JoinHandle};

use crate::config::Settings;

pub mod models;
pub mod postgres;

pub use postgres::PostgresClient;

use models::SwapEvent;

/// Messages consumed by the ingest writer task.
pub enum IngestMessage {
    /// One successfully fetched batch of swap events, persisted as-is.
    Events(Vec<SwapEvent>),
    Shutdown,
}

/// Database handle for the pipeline.
///
/// PostgreSQL holds everything: pool metadata, the append-only swap event
/// log, and the aggregated daily metrics.
#[derive(Clone)]
pub struct Database {
    pub postgres: Arc<PostgresClient>,
}

impl Database {
    /// Connect, run migrations, and spawn the ingest writer.
    ///
    /// The writer drains the ingest channel and appends each batch
    /// immediately, so a crash mid-run loses at most the batches still
    /// buffered in the channel, never previously written ones.
    pub async fn new(
        settings: Arc<Settings>,
        mut ingest_rx: mpsc::Receiver<IngestMessage>,
    ) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let postgres = PostgresClient::new(settings.postgres.clone()).await?;
        postgres.migrate().await?;

        let postgres = Arc::new(postgres);

        let writer = postgres.clone();
        let ingest_handle = tokio::spawn(async move {
            while let Some(message) = ingest_rx.recv().await {
                match message {
                    IngestMessage::Events(batch) => {
                        if let Err(e) = writer.append_swap_events(&batch).await {
                            error!("Failed to persist batch of {} events: {:#}", batch.len(), e);
                        }
                    },
                    IngestMessage::Shutdown => break,
                }
            }
            info!("Ingest writer stopped");
        });

        Ok((Self { postgres }, ingest_handle))
    }
}
