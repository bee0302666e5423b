//! CLI argument parsing using clap 4.x derive macros

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Run registered capabilities under a bounded, retrying executor
///
/// Built-in capabilities (read_file, bash, glob, grep) and the demo
/// capabilities (clock, echo) are registered on startup.
#[derive(Parser, Debug)]
#[command(name = "capexec")]
#[command(author, version, about, long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to <config_dir>/capexec/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the admission pool size
    #[arg(long, global = true)]
    pub max_concurrency: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List registered capabilities
    List {
        /// Print tool definitions as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run one capability
    Run {
        /// Capability name (case-insensitive)
        name: String,

        /// Input as a JSON object, e.g. '{"path": "/etc/hosts"}'
        #[arg(short, long)]
        input: Option<String>,

        /// Grant approval to gated capabilities
        #[arg(long)]
        approve: bool,

        /// Per-attempt timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Caller identity recorded in the context
        #[arg(long, default_value = "cli")]
        agent_id: String,

        /// Session identity recorded in the context
        #[arg(long)]
        session_id: Option<String>,
    },

    /// Run a batch of requests from a JSON file
    ///
    /// The file holds an array of
    /// `{"capability": "...", "input": {...}, "timeout_secs": N, "approve": bool}`.
    Batch {
        /// Path to the batch file
        file: PathBuf,
    },

    /// Show the effective configuration
    Config {
        /// Only print the configuration file path
        #[arg(long)]
        path: bool,
    },

    /// Print version information
    Version,
}
