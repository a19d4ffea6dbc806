use std::path::Path;

use crate::commands::common::open_queue;
use crate::error::CliError;

pub async fn run_purge_failed(db_path: &Path) -> Result<usize, CliError> {
    let queue = open_queue(db_path).await?;
    let purged = queue.purge_failed().await?;
    println!("Purged {purged} failed request(s)");
    Ok(purged)
}

pub async fn run_retry_failed(db_path: &Path) -> Result<usize, CliError> {
    let queue = open_queue(db_path).await?;
    let requeued = queue.retry_failed().await?;
    println!("Requeued {requeued} failed request(s)");
    Ok(requeued)
}
