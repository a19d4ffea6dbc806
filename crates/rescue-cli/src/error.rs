use std::io;

use rescue_core::dispatch::DispatchError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] rescue_core::Error),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Unknown request kind '{0}'. Use `http` to replay a raw endpoint.")]
    UnknownKind(String),
    #[error("Request kind '{0}' needs --endpoint")]
    MissingEndpoint(String),
    #[error("Invalid --data payload: {0}")]
    InvalidData(String),
    #[error("The API is not configured. Set RESCUE_API_BASE_URL to drain the queue.")]
    ApiNotConfigured,
}
