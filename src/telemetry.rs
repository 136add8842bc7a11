//! Logging initialization.
//!
//! The filter comes from `STEPWISE_LOG`, then `RUST_LOG`, then `"warn"`.
//! `STEPWISE_LOG_FORMAT=json` switches stderr output from human-readable
//! lines to JSON events with span close timings.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

const FILTER_ENV: &str = "STEPWISE_LOG";
const FORMAT_ENV: &str = "STEPWISE_LOG_FORMAT";
const DEFAULT_FILTER: &str = "warn";

/// Hold this in `main()` until exit.
pub struct TelemetryGuard {
    _private: (),
}

/// Install the global subscriber. Calling it twice keeps the first one.
#[must_use]
pub fn init() -> TelemetryGuard {
    let filter = filter_from_env();
    let json = std::env::var(FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let installed = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false),
            )
            .try_init()
    };
    if let Err(e) = installed {
        eprintln!("warning: logging already initialized: {e}");
    }

    TelemetryGuard { _private: () }
}

fn filter_from_env() -> EnvFilter {
    EnvFilter::try_from_env(FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}
