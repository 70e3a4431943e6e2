//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,vkframe_rhi=debug,vkframe_renderer=debug";

/// Initializes the global `tracing` subscriber.
///
/// Filtering comes from `RUST_LOG` when set, otherwise [`DEFAULT_LOG_FILTER`].
///
/// # Example
/// ```no_run
/// vkframe_core::init_logging();
/// tracing::info!("Renderer starting");
/// ```
pub fn init_logging() {
    init_logging_with(DEFAULT_LOG_FILTER);
}

/// Initializes logging with an explicit fallback filter.
///
/// `RUST_LOG` still takes precedence. An unparsable `fallback` degrades to
/// [`DEFAULT_LOG_FILTER`]. Calling this twice is harmless: the second call
/// leaves the existing subscriber in place.
pub fn init_logging_with(fallback: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();

    if result.is_err() {
        tracing::debug!("Global subscriber already installed, keeping it");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        init_logging_with("warn");
        init_logging_with("not a [valid filter");
    }
}
