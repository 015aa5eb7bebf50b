//! # osscrs: OSS-CRS resource orchestrator CLI
//!
//! Partitions cores, memory and LLM budget between CRS instances, provisions
//! their keys, and runs them under a delegated cgroup hierarchy.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

mod commands;
mod output;

use clap::Parser;

use crate::commands::Cli;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter = tracing_subscriber::EnvFilter::from_default_env();
    if cli.log_json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    commands::execute(cli)
}
