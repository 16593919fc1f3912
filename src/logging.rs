//! Log output for the dataset build.
//!
//! Named `logging` so the crate-level `tracing` import is not shadowed inside
//! the library. Records from this crate and the `build_dataset` binary default
//! to `info`; everything else, including reqwest and hyper, stays at `warn`
//! unless `RUST_LOG` says otherwise.

use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn,vehicle_pricing=info,build_dataset=info";

fn filter_or(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global fmt subscriber. Lines carry target, file and line.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(default_filter: &str) -> Result<(), anyhow::Error> {
    SubscriberBuilder::default()
        .with_env_filter(filter_or(default_filter))
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))
}
