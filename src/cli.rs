//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "toolgate",
    about = "Policy-gated tool execution gateway for autonomous agents",
    version
)]
pub struct Cli {
    /// Path to the gateway configuration file.
    #[arg(long, global = true, default_value = "toolgate.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Assemble the gateway and serve tool calls over line-delimited JSON
    /// on stdio (debug transport).
    Serve,
    /// Run one command through the configured exec backend.
    Exec(ExecArgs),
    /// Validate a policy document and run its embedded regression tests.
    CheckPolicy(CheckPolicyArgs),
}

#[derive(Debug, Args)]
pub struct ExecArgs {
    /// Wall-clock bound in milliseconds (capped by the configured limit).
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Output capture bound in bytes (capped by the configured limit).
    #[arg(long)]
    pub max_bytes: Option<usize>,

    /// Working directory for the command.
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Command argv; no shell interpretation.
    #[arg(required = true, trailing_var_arg = true)]
    pub cmd: Vec<String>,
}

#[derive(Debug, Args)]
pub struct CheckPolicyArgs {
    /// Policy document to validate.
    pub file: PathBuf,
}
