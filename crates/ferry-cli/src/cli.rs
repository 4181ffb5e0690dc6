use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "ferry")]
#[command(about = "Inspect and drive the offline operation queue")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to the local queue file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// JSON config file (FERRY_* environment variables when omitted)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Treat the network as unavailable
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Queue an operation for delivery
    Enqueue {
        /// Operation kind, e.g. lineup-change
        kind: String,
        /// JSON payload sent as the request body
        #[arg(long, value_name = "JSON")]
        payload: Option<String>,
        /// Override the kind's default priority
        #[arg(long)]
        priority: Option<i32>,
        /// Grouping key substituted into the endpoint, e.g. a league id
        #[arg(long)]
        scope: Option<String>,
        /// Store only; leave delivery to the next sync
        #[arg(long)]
        no_immediate: bool,
    },
    /// List queued operations
    List {
        /// Only show operations in this state
        #[arg(long, value_name = "STATUS")]
        status: Option<String>,
        /// Number of operations to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show queue counts and sync state
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run one delivery pass now
    Flush,
    /// Drop pending operations for a scope
    Cancel {
        /// Scope to cancel
        scope: String,
    },
    /// Drop every pending operation
    Clear,
    /// Delete finished operations
    Purge {
        /// Age threshold (defaults to the configured retention)
        #[arg(long, value_name = "SECS")]
        older_than_secs: Option<u64>,
    },
    /// Return interrupted in-flight operations to the queue
    Recover {
        /// Only claims older than this (defaults to the configured grace period)
        #[arg(long, value_name = "SECS")]
        older_than_secs: Option<u64>,
    },
    /// Queue a fresh copy of a permanently failed operation
    Retry {
        /// Operation ID
        id: String,
    },
    /// Delete a finished operation
    Discard {
        /// Operation ID
        id: String,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}
