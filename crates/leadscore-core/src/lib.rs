//! Shared domain types, configuration and CSV export for the leadscore client.

pub mod app_config;
pub mod config;
pub mod export;
pub mod offers;
pub mod types;

pub use app_config::{AppConfig, Environment};
pub use config::{load_app_config, load_app_config_from_env};
pub use export::{export_file_name, results_to_csv, EXPORT_HEADER};
pub use offers::{load_offers_file, OfferInput, OffersFile};
pub use types::{Intent, IntentFilter, Lead, Offer, ScoredResult, UnknownIntent};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read offers file {path}: {source}")]
    OffersFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse offers file: {0}")]
    OffersFileParse(#[from] serde_yaml::Error),

    #[error("offer #{index} in offers file is invalid: {source}")]
    InvalidOffer {
        index: usize,
        #[source]
        source: ValidationError,
    },
}

/// Client-side validation failures. These never reach the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("{name} is not a CSV file")]
    NotCsv { name: String },

    #[error("{name} is empty")]
    EmptyFile { name: String },

    #[error("offer {0} has not been created or loaded")]
    UnknownOffer(i64),
}
