mod config;

pub use config::{
    ClassifierSettings, DatasetSettings, FetcherSettings, PostgresSettings, Settings,
    SourceSettings,
};
