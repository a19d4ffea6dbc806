use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use rescue_core::dispatch::HttpRemoteApi;
use rescue_core::storage::{R2BlobStore, R2Config};
use rescue_core::{OfflineQueue, OfflineService, QueueConfig, QueueStore, QueuedRequest};
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct RequestListItem {
    pub id: String,
    pub kind: String,
    pub method: String,
    pub endpoint: String,
    pub status: String,
    pub retries: u32,
    pub timestamp: i64,
    pub relative_time: String,
    pub data: serde_json::Value,
}

pub async fn open_queue(db_path: &Path) -> Result<OfflineQueue, CliError> {
    let store = QueueStore::open_path(db_path).await?;
    Ok(OfflineQueue::new(store))
}

/// Build the full service for commands that talk to the API.
pub async fn open_service(db_path: &Path, config: QueueConfig) -> Result<OfflineService, CliError> {
    if config.api_base_url.is_none() {
        return Err(CliError::ApiNotConfigured);
    }

    let api = HttpRemoteApi::from_config(&config)?;
    let store = QueueStore::open_path(db_path).await?;
    let mut builder = OfflineService::builder(config, store, Arc::new(api));

    if let Some(r2_config) = R2Config::from_env()? {
        tracing::debug!("Attachments upload to R2 bucket {}", r2_config.bucket);
        builder = builder.blob_store(Arc::new(R2BlobStore::new(r2_config)));
    }

    Ok(builder.build())
}

pub fn format_request_lines(requests: &[QueuedRequest]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    requests
        .iter()
        .map(|request| {
            let id = request.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let target = format!("{} {}", request.method, request.endpoint);
            let relative_time = format_relative_time(request.timestamp, now_ms);
            format!(
                "{short_id:<13}  {:<18}  {target:<40}  retries={}  {relative_time}",
                request.kind.as_str(),
                request.retries
            )
        })
        .collect()
}

pub fn request_to_list_item(request: &QueuedRequest) -> RequestListItem {
    let now_ms = Utc::now().timestamp_millis();
    RequestListItem {
        id: request.id.to_string(),
        kind: request.kind.to_string(),
        method: request.method.to_string(),
        endpoint: request.endpoint.clone(),
        status: request.status.to_string(),
        retries: request.retries,
        timestamp: request.timestamp,
        relative_time: format_relative_time(request.timestamp, now_ms),
        data: request.data.clone(),
    }
}

pub fn format_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os("RESCUE_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rescue")
        .join("queue.db")
}
