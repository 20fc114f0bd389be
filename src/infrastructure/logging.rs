//! Logging system initialization.
//!
//! Console `tracing` output with `RUST_LOG`-style filtering. Set
//! `LOG_FORMAT=json` for structured output.

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initialize the logging system. Safe to call once per process.
pub fn init_logging() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let result = if json {
        Registry::default()
            .with(filter)
            .with(fmt::layer().json().with_target(true))
            .try_init()
    } else {
        Registry::default().with(filter).with(fmt::layer().with_target(true)).try_init()
    };

    result.map_err(|e| anyhow!("failed to initialize logging: {e}"))
}
