//! Tracing initialization for the relayer.
//!
//! Installs a `tracing-subscriber` stack with an `EnvFilter` driven by
//! `RUST_LOG`. Defaults to `info` for the crate when the variable is unset.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Telemetry registration handle.
///
/// Built once in `main` before any service starts so startup failures are
/// already visible in the logs.
pub struct Telemetry {
    name: &'static str,
    version: &'static str,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    pub fn with_version(mut self, version: &'static str) -> Self {
        self.version = version;
        self
    }

    /// Installs the global subscriber and logs the service banner.
    pub fn register(self) -> Self {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false))
            .init();
        tracing::info!(service = self.name, version = self.version, "telemetry initialized");
        self
    }
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}
