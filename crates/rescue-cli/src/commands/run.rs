use std::path::Path;
use std::time::Duration;

use rescue_core::QueueConfig;

use crate::commands::common::open_service;
use crate::error::CliError;

pub async fn run_engine(probe_interval_secs: u64, db_path: &Path) -> Result<(), CliError> {
    let config = QueueConfig::from_env()?;
    let service = open_service(db_path, config).await?;

    let _subscription = service
        .queue()
        .subscribe(|count| tracing::info!("{count} request(s) pending"))
        .await?;

    service.poll_reachability(Duration::from_secs(probe_interval_secs.max(1)));
    service.start();
    println!("Draining {}; press Ctrl-C to stop", db_path.display());

    tokio::signal::ctrl_c().await?;
    println!("Stopping...");
    service.shutdown().await;
    Ok(())
}
