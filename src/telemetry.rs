//! Telemetry helpers for applications embedding `comtrade-view`.
//!
//! Tracing setup stays explicit and opt-in. Consumers can either call
//! `init_default_tracing` or wire their own `tracing` subscriber and filters.

use std::time::{Duration, Instant};

use tracing::warn;

/// Default filter when `RUST_LOG` is unset: engine decisions at debug, the
/// rest of the host at info.
pub const DEFAULT_FILTER: &str = "info,comtrade_view::api=debug";

/// Installs a compact `tracing` subscriber when the `telemetry` feature is on.
///
/// `false` when the feature is off or the host already set a global subscriber.
#[must_use]
pub fn init_default_tracing() -> bool {
    #[cfg(feature = "telemetry")]
    {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_FILTER));
        return tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .try_init()
            .is_ok();
    }

    #[cfg(not(feature = "telemetry"))]
    {
        false
    }
}

/// Runs `f` and logs a structured warning when it exceeds `threshold`.
pub fn time_callback<T>(label: &str, threshold: Duration, f: impl FnOnce() -> T) -> T {
    let started = Instant::now();
    let output = f();
    let elapsed = started.elapsed();
    if elapsed > threshold {
        warn!(
            callback = label,
            elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
            threshold_ms = threshold.as_secs_f64() * 1_000.0,
            "slow callback"
        );
    }
    output
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::time_callback;

    #[test]
    fn time_callback_returns_inner_value() {
        let value = time_callback("sum", Duration::from_secs(1), || 2 + 2);
        assert_eq!(value, 4);
    }
}
