//! Toolgate - policy-gated tool execution gateway
//!
//! Thin binary entry point that delegates to the CLI handlers.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod serve;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // RUST_LOG overrides; default to info on stderr so stdout stays a
    // clean protocol stream for `serve`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Serve => serve::run(&args.config).await,
        Commands::Exec(exec_args) => commands::exec(&args.config, exec_args).await,
        Commands::CheckPolicy(check_args) => commands::check_policy(&args.config, check_args).await,
    }
}
