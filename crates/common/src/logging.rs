//! `tracing` initialization, shared by every binary in the workspace.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a global `tracing` subscriber reading `RUST_LOG` (default `info`).
///
/// `json` switches to structured JSON output, for deployments that ship logs
/// to an aggregator rather than a terminal.
pub fn init(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}
