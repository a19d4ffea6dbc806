use std::path::Path;

use rescue_core::StatusCounts;
use serde::Serialize;

use crate::commands::common::{format_timestamp, open_queue};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub db_path: String,
    #[serde(flatten)]
    pub counts: StatusCounts,
    pub lease_holder: Option<String>,
    pub lease_acquired_at: Option<i64>,
}

pub async fn collect_status(db_path: &Path) -> Result<StatusReport, CliError> {
    let queue = open_queue(db_path).await?;
    let counts = queue.status_counts().await?;
    let lease = queue.store().current_lease().await?;

    Ok(StatusReport {
        db_path: db_path.display().to_string(),
        counts,
        lease_holder: lease.as_ref().map(|lease| lease.holder.clone()),
        lease_acquired_at: lease.map(|lease| lease.acquired_at),
    })
}

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let report = collect_status(db_path).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Queue:   {}", report.db_path);
    println!("Pending: {}", report.counts.pending);
    println!("Syncing: {}", report.counts.syncing);
    println!("Failed:  {}", report.counts.failed);
    match (&report.lease_holder, report.lease_acquired_at) {
        (Some(holder), Some(acquired_at)) => {
            println!(
                "Drain lease held by {holder} since {}",
                format_timestamp(acquired_at)
            );
        }
        _ => println!("No drain in progress"),
    }
    Ok(())
}
