use config::{Config, ConfigError, File};
use serde::Deserialize;

/// PostgreSQL database connection configuration.
///
/// Used for storing:
/// - Pool metadata and classification
/// - Raw swap events (append-only)
/// - Aggregated daily metrics
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Upstream log source configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceSettings {
    pub rpc_url: String,
    /// Optional contract filter: when non-empty, only swap logs emitted by
    /// these pool addresses are requested.
    #[serde(default)]
    pub pool_filter: Vec<String>,
}

/// Range-batched log retrieval configuration.
///
/// The fetcher walks `[latest - lookback_days * blocks_per_day, latest]` in
/// fixed-size batches, sleeping between batches as backpressure against
/// upstream rate limits.
#[derive(Debug, Deserialize, Clone)]
pub struct FetcherSettings {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,
    /// Failed ranges at or below this size are abandoned instead of split.
    #[serde(default = "default_min_batch_size")]
    pub min_batch_size: u64,
    #[serde(default = "default_blocks_per_day")]
    pub blocks_per_day: u64,
}

fn default_lookback_days() -> u64 {
    30
}

fn default_batch_size() -> u64 {
    2_000
}

fn default_batch_delay_ms() -> u64 {
    250
}

fn default_min_batch_size() -> u64 {
    1
}

fn default_blocks_per_day() -> u64 {
    7_200
}

/// Pool classification configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierSettings {
    /// Canonical wrapped-native-asset address (WETH on mainnet).
    pub wrapped_native_address: String,
    /// Known stablecoin token addresses.
    #[serde(default)]
    pub stablecoins: Vec<String>,
    #[serde(default = "default_classify_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_classify_delay_ms")]
    pub batch_delay_ms: u64,
}

fn default_classify_batch_size() -> usize {
    10
}

fn default_classify_delay_ms() -> u64 {
    500
}

/// Dataset construction configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct DatasetSettings {
    /// Forward horizons, in rows of a pool's own sequence.
    #[serde(default = "default_horizons")]
    pub horizons: Vec<usize>,
    /// Test partition length in calendar days.
    #[serde(default = "default_test_window_days")]
    pub test_window_days: u32,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

fn default_horizons() -> Vec<usize> {
    vec![3, 7]
}

fn default_test_window_days() -> u32 {
    7
}

fn default_output_dir() -> String {
    "dataset".to_string()
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub postgres: PostgresSettings,
    pub source: SourceSettings,
    #[serde(default = "default_fetcher")]
    pub fetcher: FetcherSettings,
    pub classifier: ClassifierSettings,
    #[serde(default = "default_dataset")]
    pub dataset: DatasetSettings,
}

fn default_fetcher() -> FetcherSettings {
    FetcherSettings {
        lookback_days: default_lookback_days(),
        batch_size: default_batch_size(),
        batch_delay_ms: default_batch_delay_ms(),
        min_batch_size: default_min_batch_size(),
        blocks_per_day: default_blocks_per_day(),
    }
}

fn default_dataset() -> DatasetSettings {
    DatasetSettings {
        horizons: default_horizons(),
        test_window_days: default_test_window_days(),
        output_dir: default_output_dir(),
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;

        Ok(settings)
    }
}
