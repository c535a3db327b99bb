//! Range-batched swap log retrieval with adaptive halving retry.
//!
//! The fetcher walks a block range in fixed-size batches, sleeping between
//! batches as backpressure against upstream rate limits. A failed batch is
//! split in half and both halves retried; the retry frontier is an explicit
//! worklist, so retry depth never depends on the call stack. Ranges that
//! still fail at the minimum-granularity floor are logged and abandoned,
//! which bounds total work against a persistently broken range.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, I256};
use alloy::sol_types::SolEvent;
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use log::{debug, info, warn};
use rustc_hash::{FxHashMap, FxHashSet};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::abis::v3;
use crate::config::FetcherSettings;
use crate::db::{models::SwapEvent, IngestMessage};
use crate::source::{EventSource, RawSwapLog};
use crate::utils::hex_encode;

/// Interval for logging fetch progress
const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Outcome counters for one fetch run.
///
/// Failures are isolated to their unit of work (one range, one event) and
/// surface here instead of aborting the run.
#[derive(Debug, Default)]
pub struct FetchReport {
    /// Every `get_events` call issued, including retries of halved ranges.
    pub batches_attempted: u64,
    pub batches_fetched: u64,
    /// Minimum-size ranges that still failed and were given up on.
    pub ranges_abandoned: u64,
    pub events_fetched: u64,
    /// Individual logs dropped because they could not be decoded.
    pub events_skipped: u64,
    /// Distinct pool addresses seen across all fetched events.
    pub pool_addresses: FxHashSet<String>,
}

/// Fetches swap events for a block range from an [`EventSource`] and streams
/// each successful batch to the ingest writer.
pub struct LogFetcher<S> {
    source: Arc<S>,
    ingest_tx: mpsc::Sender<IngestMessage>,
    batch_size: u64,
    batch_delay: Duration,
    min_batch_size: u64,
}

impl<S: EventSource> LogFetcher<S> {
    pub fn new(
        source: Arc<S>,
        ingest_tx: mpsc::Sender<IngestMessage>,
        settings: &FetcherSettings,
    ) -> Self {
        Self {
            source,
            ingest_tx,
            batch_size: settings.batch_size.max(1),
            batch_delay: Duration::from_millis(settings.batch_delay_ms),
            min_batch_size: settings.min_batch_size.max(1),
        }
    }

    /// Fetch all swap events in `[from_block, to_block]`.
    ///
    /// Batches are processed sequentially; each successfully fetched batch is
    /// sent to the ingest channel immediately, so a crash mid-run loses at
    /// most the in-flight batch.
    pub async fn fetch_range(
        &self,
        from_block: u64,
        to_block: u64,
        cancellation_token: &CancellationToken,
    ) -> Result<FetchReport> {
        let mut report = FetchReport::default();
        let mut last_progress_log = std::time::Instant::now();

        info!(
            "Fetching swap events for blocks [{}, {}] in batches of {}",
            from_block, to_block, self.batch_size
        );

        let mut batch_start = from_block;
        while batch_start <= to_block {
            if cancellation_token.is_cancelled() {
                info!("Fetcher received cancellation signal, stopping early");
                break;
            }

            let batch_end = (batch_start + self.batch_size - 1).min(to_block);
            self.resolve_batch(batch_start, batch_end, &mut report)
                .await?;

            if last_progress_log.elapsed() >= PROGRESS_LOG_INTERVAL {
                info!(
                    "Fetched through block {} ({} events, {} skipped, {} ranges abandoned)",
                    batch_end, report.events_fetched, report.events_skipped,
                    report.ranges_abandoned
                );
                last_progress_log = std::time::Instant::now();
            }

            batch_start = batch_end + 1;
            if batch_start <= to_block {
                // Deliberate backpressure against upstream rate limits
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        info!(
            "Fetch complete: {}/{} batches ok, {} events, {} skipped, {} ranges abandoned",
            report.batches_fetched,
            report.batches_attempted,
            report.events_fetched,
            report.events_skipped,
            report.ranges_abandoned
        );

        Ok(report)
    }

    /// Resolve one batch range to completion via iterative halving.
    ///
    /// Each round fetches the whole frontier concurrently and joins; failed
    /// ranges above the floor are split into halves for the next round.
    async fn resolve_batch(&self, from: u64, to: u64, report: &mut FetchReport) -> Result<()> {
        let mut frontier: Vec<(u64, u64)> = vec![(from, to)];

        while !frontier.is_empty() {
            let results = join_all(
                frontier
                    .iter()
                    .map(|&(f, t)| self.source.get_events(f, t)),
            )
            .await;

            let mut next = Vec::new();

            for (&(range_from, range_to), result) in frontier.iter().zip(results) {
                report.batches_attempted += 1;

                match result {
                    Ok(raw_logs) => {
                        // Zero events in a range is a success, not a failure
                        report.batches_fetched += 1;
                        let events = self.decode_batch(raw_logs, report).await;

                        if !events.is_empty() {
                            for event in &events {
                                report.pool_addresses.insert(event.pool_address.clone());
                            }
                            report.events_fetched += events.len() as u64;

                            self.ingest_tx
                                .send(IngestMessage::Events(events))
                                .await
                                .map_err(|_| anyhow::anyhow!("Ingest channel closed"))?;
                        }
                    },
                    Err(e) => {
                        let range_len = range_to - range_from + 1;
                        if range_len <= self.min_batch_size {
                            warn!(
                                "Abandoning range [{}, {}] at minimum granularity: {}",
                                range_from, range_to, e
                            );
                            report.ranges_abandoned += 1;
                        } else {
                            debug!(
                                "Range [{}, {}] failed ({}), splitting in half",
                                range_from, range_to, e
                            );
                            let mid = range_from + range_len / 2 - 1;
                            next.push((range_from, mid));
                            next.push((mid + 1, range_to));
                        }
                    },
                }
            }

            frontier = next;
        }

        Ok(())
    }

    /// Decode raw logs into [`SwapEvent`]s. Malformed logs and blocks whose
    /// timestamp cannot be resolved are skipped individually; they never fail
    /// the batch.
    async fn decode_batch(
        &self,
        raw_logs: Vec<RawSwapLog>,
        report: &mut FetchReport,
    ) -> Vec<SwapEvent> {
        // Resolve timestamps once per distinct block, not per event
        let mut block_numbers: Vec<u64> = raw_logs.iter().map(|l| l.block_number).collect();
        block_numbers.sort_unstable();
        block_numbers.dedup();

        let mut timestamps: FxHashMap<u64, DateTime<Utc>> = FxHashMap::default();
        for block_number in block_numbers {
            match self.source.block_timestamp(block_number).await {
                Ok(ts) => {
                    timestamps.insert(block_number, ts);
                },
                Err(e) => {
                    warn!(
                        "Failed to resolve timestamp for block {}: {:#}",
                        block_number, e
                    );
                },
            }
        }

        let mut events = Vec::with_capacity(raw_logs.len());

        for raw in raw_logs {
            let Some(timestamp) = timestamps.get(&raw.block_number).copied() else {
                report.events_skipped += 1;
                continue;
            };

            match decode_swap_log(&raw) {
                Some(decoded) => {
                    events.push(SwapEvent {
                        block_number: raw.block_number as i64,
                        log_index: raw.log_index as i64,
                        tx_hash: raw.tx_hash,
                        timestamp,
                        date: timestamp.date_naive(),
                        pool_address: raw.address.to_lowercase(),
                        sender: decoded.sender,
                        recipient: decoded.recipient,
                        amount0: decoded.amount0,
                        amount1: decoded.amount1,
                    });
                },
                None => {
                    report.events_skipped += 1;
                },
            }
        }

        events
    }
}

struct DecodedSwap {
    sender: String,
    recipient: String,
    amount0: String,
    amount1: String,
}

/// Decode the indexed participants and raw amounts of a V3 `Swap` log.
/// Returns `None` for anything that does not look like a well-formed swap.
fn decode_swap_log(raw: &RawSwapLog) -> Option<DecodedSwap> {
    if raw.topics.len() != 3 || raw.topics[0] != v3::Swap::SIGNATURE_HASH {
        return None;
    }
    // data = (amount0, amount1, sqrtPriceX96, liquidity, tick), one word each
    if raw.data.len() < 64 {
        return None;
    }

    let sender = Address::from_word(raw.topics[1]);
    let recipient = Address::from_word(raw.topics[2]);
    let amount0 = I256::from_be_bytes::<32>(raw.data[0..32].try_into().ok()?);
    let amount1 = I256::from_be_bytes::<32>(raw.data[32..64].try_into().ok()?);

    Some(DecodedSwap {
        sender: hex_encode(sender.as_slice()),
        recipient: hex_encode(recipient.as_slice()),
        amount0: amount0.to_string(),
        amount1: amount1.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::PoolMetadata;
    use alloy::primitives::{B256, U256};
    use std::sync::atomic::{AtomicU64, Ordering};

    /// Scripted source: rejects any range wider than `max_range`, and always
    /// rejects ranges of `poisoned_blocks`, regardless of size.
    struct FakeEventSource {
        logs: Vec<RawSwapLog>,
        max_range: u64,
        poisoned_blocks: FxHashSet<u64>,
        calls: AtomicU64,
    }

    impl FakeEventSource {
        fn new(logs: Vec<RawSwapLog>, max_range: u64) -> Self {
            Self {
                logs,
                max_range,
                poisoned_blocks: FxHashSet::default(),
                calls: AtomicU64::new(0),
            }
        }
    }

    impl EventSource for FakeEventSource {
        async fn latest_block(&self) -> Result<u64> {
            Ok(self.logs.iter().map(|l| l.block_number).max().unwrap_or(0))
        }

        async fn get_events(
            &self,
            from_block: u64,
            to_block: u64,
        ) -> std::result::Result<Vec<RawSwapLog>, crate::errors::FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            if to_block - from_block + 1 > self.max_range {
                return Err(crate::errors::FetchError::RangeRejected {
                    from: from_block,
                    to: to_block,
                    reason: "range too large".to_string(),
                });
            }
            if (from_block..=to_block).any(|b| self.poisoned_blocks.contains(&b)) {
                return Err(crate::errors::FetchError::Transport(
                    "upstream error".to_string(),
                ));
            }

            Ok(self
                .logs
                .iter()
                .filter(|l| l.block_number >= from_block && l.block_number <= to_block)
                .cloned()
                .collect())
        }

        async fn block_timestamp(&self, block_number: u64) -> Result<DateTime<Utc>> {
            // 2025-01-01 00:00:00 UTC plus one minute per block
            Ok(DateTime::from_timestamp(1_735_689_600 + block_number as i64 * 60, 0).unwrap())
        }

        async fn pool_metadata(&self, _address: &str) -> Result<PoolMetadata> {
            anyhow::bail!("not used in fetcher tests")
        }

        async fn token_symbol(&self, _address: &str) -> Result<String> {
            anyhow::bail!("not used in fetcher tests")
        }
    }

    fn addr_topic(byte: u8) -> B256 {
        Address::repeat_byte(byte).into_word()
    }

    fn swap_log(block: u64, index: u64, pool: u8, sender: u8, recipient: u8) -> RawSwapLog {
        let mut data = Vec::with_capacity(160);
        data.extend_from_slice(&I256::try_from(100i64).unwrap().to_be_bytes::<32>());
        data.extend_from_slice(&I256::try_from(-100i64).unwrap().to_be_bytes::<32>());
        data.extend_from_slice(&U256::ZERO.to_be_bytes::<32>());
        data.extend_from_slice(&U256::ZERO.to_be_bytes::<32>());
        data.extend_from_slice(&U256::ZERO.to_be_bytes::<32>());

        RawSwapLog {
            block_number: block,
            log_index: index,
            tx_hash: hex_encode(&[0xab; 32]),
            address: hex_encode(Address::repeat_byte(pool).as_slice()),
            topics: vec![v3::Swap::SIGNATURE_HASH, addr_topic(sender), addr_topic(recipient)],
            data,
        }
    }

    fn fetcher_settings(batch_size: u64) -> FetcherSettings {
        FetcherSettings {
            lookback_days: 30,
            batch_size,
            batch_delay_ms: 0,
            min_batch_size: 1,
            blocks_per_day: 7_200,
        }
    }

    async fn run_fetch(
        source: FakeEventSource,
        settings: FetcherSettings,
        from: u64,
        to: u64,
    ) -> (FetchReport, Vec<SwapEvent>) {
        let (tx, mut rx) = mpsc::channel(64);
        let fetcher = LogFetcher::new(Arc::new(source), tx, &settings);
        let token = CancellationToken::new();

        let report = fetcher.fetch_range(from, to, &token).await.unwrap();
        drop(fetcher);

        let mut events = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let IngestMessage::Events(batch) = msg {
                events.extend(batch);
            }
        }
        (report, events)
    }

    #[tokio::test]
    async fn fetches_all_events_in_one_batch() {
        let logs = vec![swap_log(10, 0, 1, 2, 3), swap_log(11, 0, 1, 4, 5)];
        let source = FakeEventSource::new(logs, 1_000);

        let (report, events) = run_fetch(source, fetcher_settings(100), 0, 99).await;

        assert_eq!(report.events_fetched, 2);
        assert_eq!(report.events_skipped, 0);
        assert_eq!(report.ranges_abandoned, 0);
        assert_eq!(events.len(), 2);
        assert_eq!(report.pool_addresses.len(), 1);
    }

    #[tokio::test]
    async fn empty_range_is_success() {
        let source = FakeEventSource::new(vec![], 1_000);
        let (report, events) = run_fetch(source, fetcher_settings(50), 0, 49).await;

        assert_eq!(report.batches_fetched, 1);
        assert_eq!(report.ranges_abandoned, 0);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn adaptive_split_converges_below_source_limit() {
        // Property over varying source limits S and range sizes: the halving
        // retry must terminate and deliver every event exactly once.
        for max_range in [1u64, 2, 3, 5, 8] {
            for range_len in [1u64, 4, 7, 16, 20] {
                let logs: Vec<RawSwapLog> = (0..range_len)
                    .map(|b| swap_log(b, 0, 1, 2, 3))
                    .collect();
                let source = FakeEventSource::new(logs, max_range);

                let (report, events) =
                    run_fetch(source, fetcher_settings(range_len), 0, range_len - 1).await;

                assert_eq!(
                    events.len() as u64, range_len,
                    "max_range={} range_len={}",
                    max_range, range_len
                );
                assert_eq!(report.ranges_abandoned, 0);

                // Exactly once: no duplicate (block, log_index) pairs
                let mut keys: Vec<(i64, i64)> =
                    events.iter().map(|e| (e.block_number, e.log_index)).collect();
                keys.sort_unstable();
                keys.dedup();
                assert_eq!(keys.len() as u64, range_len);
            }
        }
    }

    #[tokio::test]
    async fn poisoned_block_is_abandoned_not_retried_forever() {
        let logs = vec![swap_log(2, 0, 1, 2, 3), swap_log(7, 0, 1, 2, 3)];
        let mut source = FakeEventSource::new(logs, 4);
        source.poisoned_blocks.insert(5);

        let (report, events) = run_fetch(source, fetcher_settings(8), 0, 7).await;

        // Block 5's single-block range fails at the floor and is given up
        assert_eq!(report.ranges_abandoned, 1);
        // Events outside the poisoned block still arrive
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn malformed_logs_are_skipped_individually() {
        let mut bad_topics = swap_log(3, 0, 1, 2, 3);
        bad_topics.topics.truncate(2);

        let mut bad_data = swap_log(3, 1, 1, 2, 3);
        bad_data.data.truncate(10);

        let logs = vec![swap_log(3, 2, 1, 2, 3), bad_topics, bad_data];
        let source = FakeEventSource::new(logs, 1_000);

        let (report, events) = run_fetch(source, fetcher_settings(10), 0, 9).await;

        assert_eq!(report.events_fetched, 1);
        assert_eq!(report.events_skipped, 2);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].amount0, "100");
        assert_eq!(events[0].amount1, "-100");
    }

    #[test]
    fn decode_swap_log_rejects_wrong_signature() {
        let mut log = swap_log(1, 0, 1, 2, 3);
        log.topics[0] = B256::ZERO;
        assert!(decode_swap_log(&log).is_none());
    }

    #[test]
    fn decode_swap_log_extracts_participants() {
        let log = swap_log(1, 0, 1, 2, 3);
        let decoded = decode_swap_log(&log).unwrap();
        assert_eq!(decoded.sender, hex_encode(Address::repeat_byte(2).as_slice()));
        assert_eq!(
            decoded.recipient,
            hex_encode(Address::repeat_byte(3).as_slice())
        );
    }
}
