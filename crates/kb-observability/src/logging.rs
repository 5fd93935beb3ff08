//! Process-wide `tracing` initialization, driven by `LOG_LEVEL`/`RUST_LOG` (§1.1).

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the global `tracing` subscriber. Call once, at process start.
/// `default_level` is used when neither `RUST_LOG` nor `LOG_LEVEL` is set.
pub fn init_tracing(default_level: &str) {
    let filter = std::env::var("RUST_LOG")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| default_level.to_string());

    let _ = fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .try_init();
}
