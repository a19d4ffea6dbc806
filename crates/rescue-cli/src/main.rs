//! Rescue CLI - operate the offline request queue from the terminal
//!
//! Queue requests, inspect what is waiting, and drain the queue against the
//! response API.

mod cli;
mod commands;
mod error;


use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::drain::run_drain;
use crate::commands::enqueue::run_enqueue;
use crate::commands::list::run_list;
use crate::commands::maintenance::{run_purge_failed, run_retry_failed};
use crate::commands::run::run_engine;
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

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "rescue=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);

    match cli.command {
        Commands::Enqueue {
            kind,
            method,
            endpoint,
            data,
        } => {
            run_enqueue(
                &kind,
                method,
                endpoint.as_deref(),
                data.as_deref(),
                &db_path,
            )
            .await?;
        }
        Commands::Status { json } => run_status(json, &db_path).await?,
        Commands::List {
            status,
            limit,
            json,
        } => run_list(status.into(), limit, json, &db_path).await?,
        Commands::Drain { probe } => run_drain(probe, &db_path).await?,
        Commands::Run { probe_interval } => run_engine(probe_interval, &db_path).await?,
        Commands::PurgeFailed => {
            run_purge_failed(&db_path).await?;
        }
        Commands::RetryFailed => {
            run_retry_failed(&db_path).await?;
        }
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}
