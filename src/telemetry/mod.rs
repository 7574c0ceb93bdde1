//! Tracing initialization.
//!
//! Sets up tracing-subscriber with an env-filter layer. `RUST_LOG`
//! overrides the configured level.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::error::{Error, Result};

/// Initialize the global tracing subscriber.
///
/// # Errors
/// Returns an error if a subscriber was already installed.
pub fn init_tracing(log_level: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
        .map_err(|e| Error::Config(format!("failed to init tracing subscriber: {e}")))
}
