//! # App controller
//!
//! Entry point: parses the CLI, installs the tracing subscriber and runs
//! the selected command.
//!
//! ## Commands
//!
//! - `run`: seed an in-memory cluster from a manifest and run the controller
//!   until Ctrl+C. Exits non-zero if the caches never sync.
//! - `render`: print the Deployment, Service and Ingress each App in a
//!   manifest would produce, without running anything.
//!
//! ## Logging
//!
//! `RUST_LOG` selects the filter (default `info`); `--log-level` overrides it.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());
    commands::execute_command(cli.command).await
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
