//! Tracing/logging initialization.
//!
//! `RUST_LOG` always wins; the configured level is only the fallback directive.

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingOptions {
    /// Fallback `EnvFilter` directive, e.g. `info` or `stockledger_infra=debug,info`.
    pub level: String,
    /// JSON lines when true, human-readable output otherwise.
    pub json: bool,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

impl TracingOptions {
    pub fn new(level: impl Into<String>, json: bool) -> Self {
        Self {
            level: level.into(),
            json,
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops). Returns whether this call
/// installed the global subscriber.
pub fn init(options: &TracingOptions) -> bool {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(options.filter())
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    if options.json {
        builder.json().try_init().is_ok()
    } else {
        builder.pretty().try_init().is_ok()
    }
}
