//! Structured logging setup
//!
//! Every module logs through `tracing`; this installs a `fmt` subscriber for
//! binaries and tests that want to see it.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_filter` when set. Calling this again once a
/// subscriber is installed does nothing.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

/// Install the subscriber with the filter of loaded settings
pub fn init_with(settings: &crate::config::Settings) {
    init(&settings.log_filter);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        init("debug");
        init("not a [valid filter");
        tracing::debug!(attempt = 2, "subscriber still installed");
    }
}
