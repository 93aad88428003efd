//! Subscriber setup for binaries and tests.
//!
//! The library only emits `tracing` events; nothing here runs unless a caller
//! asks for it.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Env var holding the filter directives, e.g. `catalog_storage=debug`.
pub const LOG_FILTER_ENV: &str = "CATALOG_LOG";
/// Env var selecting the output format: `json` or `text` (default).
pub const LOG_FORMAT_ENV: &str = "CATALOG_LOG_FORMAT";

const DEFAULT_FILTER: &str = "catalog_storage=info,warn";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn from_env() -> Self {
        match std::env::var(LOG_FORMAT_ENV) {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a global subscriber filtered by `CATALOG_LOG`.
///
/// Returns `false` when a global subscriber was already installed, which is
/// routine in test binaries.
pub fn init_tracing() -> bool {
    let registry = tracing_subscriber::registry().with(env_filter());
    let result = match LogFormat::from_env() {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    match result {
        Ok(()) => {
            tracing::debug!(filter_env = LOG_FILTER_ENV, "Tracing initialized");
            true
        }
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_harmless() {
        init_tracing();
        assert!(!init_tracing());
    }
}
