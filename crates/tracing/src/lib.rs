//! Process-wide logger setup, modeled on `reth-tracing`: a single named
//! instance built once at start-up (§9 "Global singletons" - the logger is
//! injected, never reached for as a singleton from inside the core).
//!
//! `reth-tracing`'s own source was not retrieved into the example pack, but
//! every teacher crate that needs logging depends on it
//! (`reth-tracing.workspace = true`); this crate fills that role with the
//! conventional `tracing-subscriber` `EnvFilter` + fmt-layer initialization
//! such a crate wraps.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for the process-wide logger.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored when stdout is a tty.
    #[default]
    Terminal,
    /// One JSON object per line, for log aggregation.
    Json,
}

/// Builds and installs the global [`tracing`] subscriber.
///
/// `filter` follows `EnvFilter` syntax (e.g. `"pisa=debug,info"`); pass
/// `None` to fall back to the `RUST_LOG` environment variable, defaulting to
/// `info` if that is unset too.
///
/// # Panics
///
/// Panics if a global subscriber has already been installed - this must be
/// called exactly once, at process start-up.
pub fn init(format: LogFormat, filter: Option<&str>) {
    let env_filter = match filter {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Terminal => registry.with(fmt::layer()).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}
