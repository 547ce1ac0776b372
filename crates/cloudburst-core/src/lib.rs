//! cloudburst-core: shared building blocks for the cloudburst crates.
//!
//! - [`config`]: `cloudburst.toml` parsing, defaults, and validation
//! - [`types`]: resource samples and threshold policy
//! - [`gcloud`]: thin async runner over the `gcloud` CLI plus credential activation
//! - [`backoff`]: exponential backoff used by readiness polling and retry cooldowns

pub mod backoff;
pub mod config;
pub mod gcloud;
pub mod types;

pub use backoff::Backoff;
pub use config::CloudburstConfig;
pub use gcloud::{CredentialError, Gcloud};
pub use types::*;

use std::time::{SystemTime, UNIX_EPOCH};

/// Seconds since the Unix epoch as a float, the timestamp format of the state record.
pub fn epoch_secs_f64() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
