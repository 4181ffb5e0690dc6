//! Ferry CLI - operator surface for the offline operation queue
//!
//! Queue, inspect and flush operations stored in the local queue file.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::{load_config, open_queue, resolve_db_path};
use crate::commands::completions::run_completions;
use crate::commands::enqueue::{run_enqueue, EnqueueArgs};
use crate::commands::flush::run_flush;
use crate::commands::list::run_list;
use crate::commands::maintenance::{
    run_cancel, run_clear, run_discard, run_purge, run_recover, run_retry,
};
use crate::commands::status::run_status;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ferry=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::Completions { shell, output } = &cli.command {
        return run_completions(*shell, output.as_deref());
    }

    let db_path = resolve_db_path(cli.db_path);
    let config = load_config(cli.config.as_deref())?;

    if let Commands::Recover { older_than_secs } = cli.command {
        return run_recover(&db_path, &config, older_than_secs);
    }

    let queue = open_queue(&db_path, config, cli.offline)?;
    match cli.command {
        Commands::Enqueue {
            kind,
            payload,
            priority,
            scope,
            no_immediate,
        } => {
            let args = EnqueueArgs {
                kind: &kind,
                payload: payload.as_deref(),
                priority,
                scope: scope.as_deref(),
                immediate: !no_immediate,
            };
            run_enqueue(&queue, args).await?;
        }
        Commands::List {
            status,
            limit,
            json,
        } => run_list(&queue, status.as_deref(), limit, json)?,
        Commands::Status { json } => run_status(&queue, json)?,
        Commands::Flush => run_flush(&queue).await?,
        Commands::Cancel { scope } => run_cancel(&queue, &scope)?,
        Commands::Clear => run_clear(&queue)?,
        Commands::Purge { older_than_secs } => run_purge(&queue, older_than_secs)?,
        Commands::Retry { id } => run_retry(&queue, &id)?,
        Commands::Discard { id } => run_discard(&queue, &id)?,
        Commands::Recover { .. } | Commands::Completions { .. } => {}
    }

    Ok(())
}
