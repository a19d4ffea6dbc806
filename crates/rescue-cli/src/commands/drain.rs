use std::path::Path;

use rescue_core::{DrainOutcome, QueueConfig, SkipReason};

use crate::commands::common::open_service;
use crate::error::CliError;

pub async fn run_drain(probe: bool, db_path: &Path) -> Result<(), CliError> {
    let config = QueueConfig::from_env()?;
    let service = open_service(db_path, config).await?;

    if probe {
        let reachable = service.monitor().check_reachability().await;
        service.monitor().set_online(reachable);
    }

    let outcome = service.engine().drain().await?;
    println!("{}", describe_outcome(&outcome));
    Ok(())
}

pub fn describe_outcome(outcome: &DrainOutcome) -> String {
    match outcome {
        DrainOutcome::Completed(report) => format!(
            "Delivered {} of {} request(s); {} requeued, {} failed, {} pending",
            report.succeeded, report.attempted, report.requeued, report.failed, report.remaining
        ),
        DrainOutcome::Skipped { reason } => match reason {
            SkipReason::Offline => "Skipped: API unreachable".to_string(),
            SkipReason::AlreadyDraining => "Skipped: a drain is already running".to_string(),
            SkipReason::LeaseHeld => "Skipped: another process is draining this queue".to_string(),
        },
    }
}
