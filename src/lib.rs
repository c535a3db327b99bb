pub mod abis;
pub mod classifier;
pub mod config;
pub mod dataset;
pub mod db;
pub mod errors;
pub mod fetcher;
pub mod pipeline;
pub mod source;
pub mod utils;

pub use classifier::PoolClassifier;
pub use config::Settings;
pub use db::Database;
pub use fetcher::LogFetcher;
pub use source::{EventSource, RpcEventSource};
