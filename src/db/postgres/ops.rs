use chrono::NaiveDate;
use log::error;

use crate::db::models::{DailyMetric, Pool, PoolType, SwapEvent};
use crate::db::postgres::PostgresClient;

/// Sanitize a string for PostgreSQL by removing null bytes (0x00)
/// which are invalid in UTF-8 text columns
fn sanitize_string(s: &str) -> String {
    s.replace('\0', "")
}

impl PostgresClient {
    // ==================== SWAP EVENTS ====================

    /// Append a batch of swap events. Duplicate (block_number, log_index)
    /// pairs are ignored, so replaying an already-fetched range is a no-op.
    pub async fn append_swap_events(&self, events: &[SwapEvent]) -> anyhow::Result<()> {
        if events.is_empty() {
            return Ok(());
        }

        const COLS_PER_ROW: usize = 10;
        const BATCH_SIZE: usize = 500;

        let client = self.pool.get().await?;

        for chunk in events.chunks(BATCH_SIZE) {
            let values_clauses: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(i, _)| {
                    let start = i * COLS_PER_ROW + 1;
                    let placeholders: Vec<String> = (start..start + COLS_PER_ROW)
                        .map(|n| format!("${}", n))
                        .collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();

            let query = format!(
                r#"
                INSERT INTO miner.swap_events (
                    block_number, log_index, tx_hash, ts, date,
                    pool_address, sender, recipient, amount0, amount1
                ) VALUES {}
                ON CONFLICT (block_number, log_index) DO NOTHING
                "#,
                values_clauses.join(", ")
            );

            let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);

            for event in chunk {
                params.push(&event.block_number);
                params.push(&event.log_index);
                params.push(&event.tx_hash);
                params.push(&event.timestamp);
                params.push(&event.date);
                params.push(&event.pool_address);
                params.push(&event.sender);
                params.push(&event.recipient);
                params.push(&event.amount0);
                params.push(&event.amount1);
            }

            client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to append {} swap events: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(())
    }

    /// Get all swap events on or after a date, ordered by block and log index.
    pub async fn get_swap_events_since(&self, since: NaiveDate) -> anyhow::Result<Vec<SwapEvent>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                block_number, log_index, tx_hash, ts, date,
                pool_address, sender, recipient, amount0, amount1
            FROM miner.swap_events
            WHERE date >= $1
            ORDER BY block_number, log_index
        "#;

        let rows = client.query(query, &[&since]).await?;
        let events = rows
            .iter()
            .map(|row| SwapEvent {
                block_number: row.get("block_number"),
                log_index: row.get("log_index"),
                tx_hash: row.get("tx_hash"),
                timestamp: row.get("ts"),
                date: row.get("date"),
                pool_address: row.get("pool_address"),
                sender: row.get("sender"),
                recipient: row.get("recipient"),
                amount0: row.get("amount0"),
                amount1: row.get("amount1"),
            })
            .collect();

        Ok(events)
    }

    // ==================== POOLS ====================

    /// Get pools by addresses (batched)
    pub async fn get_pools(&self, addresses: &[String]) -> anyhow::Result<Vec<Pool>> {
        if addresses.is_empty() {
            return Ok(vec![]);
        }

        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                address, token0, token1, token0_symbol, token1_symbol,
                fee, pool_type, updated_at
            FROM miner.pools
            WHERE address = ANY($1)
        "#;

        let rows = client.query(query, &[&addresses]).await?;
        let pools = rows.iter().map(row_to_pool).collect();
        Ok(pools)
    }

    /// Get every classified pool.
    pub async fn get_all_pools(&self) -> anyhow::Result<Vec<Pool>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT
                address, token0, token1, token0_symbol, token1_symbol,
                fee, pool_type, updated_at
            FROM miner.pools
        "#;

        let rows = client.query(query, &[]).await?;
        let pools = rows.iter().map(row_to_pool).collect();
        Ok(pools)
    }

    /// Batch insert/update multiple pools.
    ///
    /// On conflict only symbol metadata is refreshed: token0/token1/fee and
    /// the classification are a pure function of the pool contract and must
    /// never change once stored.
    pub async fn set_pools(&self, pools: &[&Pool]) -> anyhow::Result<()> {
        if pools.is_empty() {
            return Ok(());
        }

        const COLS_PER_ROW: usize = 8;
        const BATCH_SIZE: usize = 500;

        let client = self.pool.get().await?;

        for chunk in pools.chunks(BATCH_SIZE) {
            let values_clauses: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(i, _)| {
                    let start = i * COLS_PER_ROW + 1;
                    let placeholders: Vec<String> = (start..start + COLS_PER_ROW)
                        .map(|n| format!("${}", n))
                        .collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();

            let query = format!(
                r#"
                INSERT INTO miner.pools (
                    address, token0, token1, token0_symbol, token1_symbol,
                    fee, pool_type, updated_at
                ) VALUES {}
                ON CONFLICT (address) DO UPDATE SET
                    token0_symbol = EXCLUDED.token0_symbol,
                    token1_symbol = EXCLUDED.token1_symbol,
                    updated_at = EXCLUDED.updated_at
                "#,
                values_clauses.join(", ")
            );

            // Store sanitized symbols and stringified types for param lifetimes
            let mut sanitized: Vec<(String, String, &'static str)> =
                Vec::with_capacity(chunk.len());
            for pool in chunk {
                sanitized.push((
                    sanitize_string(&pool.token0_symbol),
                    sanitize_string(&pool.token1_symbol),
                    pool.pool_type.as_str(),
                ));
            }

            let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);

            for (i, pool) in chunk.iter().enumerate() {
                params.push(&pool.address);
                params.push(&pool.token0);
                params.push(&pool.token1);
                params.push(&sanitized[i].0);
                params.push(&sanitized[i].1);
                params.push(&pool.fee);
                params.push(&sanitized[i].2);
                params.push(&pool.updated_at);
            }

            client.execute(&query, &params).await.map_err(|e| {
                error!("Failed to batch insert {} pools: {:?}", chunk.len(), e);
                e
            })?;
        }

        Ok(())
    }

    // ==================== DAILY METRICS ====================

    /// Batch upsert daily metrics. Conflicting rows are replaced, not
    /// incremented: the aggregator always recomputes the whole day.
    pub async fn set_daily_metrics(&self, metrics: &[DailyMetric]) -> anyhow::Result<()> {
        if metrics.is_empty() {
            return Ok(());
        }

        const COLS_PER_ROW: usize = 5;
        const BATCH_SIZE: usize = 1000;

        let client = self.pool.get().await?;

        for chunk in metrics.chunks(BATCH_SIZE) {
            let values_clauses: Vec<String> = chunk
                .iter()
                .enumerate()
                .map(|(i, _)| {
                    let start = i * COLS_PER_ROW + 1;
                    let placeholders: Vec<String> = (start..start + COLS_PER_ROW)
                        .map(|n| format!("${}", n))
                        .collect();
                    format!("({})", placeholders.join(", "))
                })
                .collect();

            let query = format!(
                r#"
                INSERT INTO miner.daily_metrics (
                    pool_address, date, tx_count, unique_users, updated_at
                ) VALUES {}
                ON CONFLICT (pool_address, date) DO UPDATE SET
                    tx_count = EXCLUDED.tx_count,
                    unique_users = EXCLUDED.unique_users,
                    updated_at = EXCLUDED.updated_at
                "#,
                values_clauses.join(", ")
            );

            let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> =
                Vec::with_capacity(chunk.len() * COLS_PER_ROW);

            for metric in chunk {
                params.push(&metric.pool_address);
                params.push(&metric.date);
                params.push(&metric.tx_count);
                params.push(&metric.unique_users);
                params.push(&metric.updated_at);
            }

            client.execute(&query, &params).await.map_err(|e| {
                error!(
                    "Failed to batch upsert {} daily metrics: {:?}",
                    chunk.len(),
                    e
                );
                e
            })?;
        }

        Ok(())
    }

    /// Get all daily metrics ordered by pool and date.
    ///
    /// The ordering matters: downstream rolling-window and target
    /// computations assume each pool's rows arrive date-ascending.
    pub async fn get_daily_metrics(&self) -> anyhow::Result<Vec<DailyMetric>> {
        let client = self.pool.get().await?;
        let query = r#"
            SELECT pool_address, date, tx_count, unique_users, updated_at
            FROM miner.daily_metrics
            ORDER BY pool_address, date
        "#;

        let rows = client.query(query, &[]).await?;
        let metrics = rows
            .iter()
            .map(|row| DailyMetric {
                pool_address: row.get("pool_address"),
                date: row.get("date"),
                tx_count: row.get("tx_count"),
                unique_users: row.get("unique_users"),
                updated_at: row.get("updated_at"),
            })
            .collect();

        Ok(metrics)
    }
}

// ==================== HELPER FUNCTIONS ====================

fn row_to_pool(row: &tokio_postgres::Row) -> Pool {
    // Lowercase addresses for consistent comparisons
    let address: String = row.get("address");
    let token0: String = row.get("token0");
    let token1: String = row.get("token1");
    let pool_type: String = row.get("pool_type");

    Pool {
        address: address.to_lowercase(),
        token0: token0.to_lowercase(),
        token1: token1.to_lowercase(),
        token0_symbol: row.get("token0_symbol"),
        token1_symbol: row.get("token1_symbol"),
        fee: row.get("fee"),
        pool_type: PoolType::from_str(&pool_type),
        updated_at: row.get("updated_at"),
    }
}
