// Copyright (c) 2025 - Cowboy AI, Inc.
//! Tracing setup for binaries and tests embedding the orchestrator

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG`, defaulting to `info`
///
/// Returns `false` when a global subscriber is already installed.
pub fn init_tracing() -> bool {
    init_tracing_with("info")
}

/// Install a `fmt` subscriber with `fallback` used when `RUST_LOG` is unset
pub fn init_tracing_with(fallback: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
