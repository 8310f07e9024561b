//! CLI command definitions using clap.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// App controller
#[derive(Parser, Debug)]
#[command(name = "app-controller")]
#[command(version)]
#[command(about = "Drives Deployments, Services and Ingresses toward the state each App declares")]
#[command(
    long_about = "Watches App resources and their dependents, and creates, updates or deletes dependents until they match what each App describes."
)]
pub struct Cli {
    /// Log level (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller against an in-memory cluster seeded from manifests
    Run {
        /// Multi-document YAML manifest to seed the store with
        #[arg(short, long)]
        manifests: PathBuf,

        /// Controller configuration (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of workers (overrides config)
        #[arg(short, long)]
        workers: Option<usize>,

        /// Retry ceiling per key (overrides config)
        #[arg(long)]
        max_retries: Option<u32>,
    },

    /// Print the dependents each App in a manifest would produce
    Render {
        /// Multi-document YAML manifest
        #[arg(short, long)]
        manifest: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Yaml)]
        output: OutputFormat,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Yaml,
    Json,
}
