//! Queued request model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

use super::kind::{HttpMethod, RequestKind};

/// A unique identifier for a queued request, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new unique request ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RequestId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle status of a stored request.
///
/// A request that replayed successfully is deleted, so there is no
/// completed variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    /// Waiting for the next drain cycle
    Pending,
    /// Claimed by an in-flight drain cycle
    Syncing,
    /// Retry ceiling exceeded; needs manual intervention
    Failed,
}

impl RequestStatus {
    pub const ALL: [Self; 3] = [Self::Pending, Self::Syncing, Self::Failed];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Failed => "failed",
        }
    }

    /// Whether a stored record may move from `self` to `next`.
    ///
    /// `Syncing -> Pending` covers both a retry and reclaiming a stale cycle;
    /// `Failed -> Pending` is only reachable through an explicit retry.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Syncing)
                | (Self::Syncing, Self::Pending | Self::Failed)
                | (Self::Failed, Self::Pending)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "failed" => Ok(Self::Failed),
            other => Err(Error::InvalidInput(format!(
                "Unknown request status: {other}"
            ))),
        }
    }
}

/// A mutation captured while the remote API was unreachable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedRequest {
    /// Unique identifier, also the FIFO tie-breaker
    pub id: RequestId,
    /// Which remote operation replays this request
    pub kind: RequestKind,
    /// Verb intent for generic replays and id-bearing kinds
    pub method: HttpMethod,
    /// Target resource path
    pub endpoint: String,
    /// Kind-specific payload
    pub data: serde_json::Value,
    /// Enqueue timestamp (Unix ms)
    pub timestamp: i64,
    /// Failed replay attempts so far
    pub retries: u32,
    /// Lifecycle status
    pub status: RequestStatus,
}

impl QueuedRequest {
    /// Create a new pending request.
    pub fn new(
        kind: RequestKind,
        method: HttpMethod,
        endpoint: impl Into<String>,
        data: serde_json::Value,
    ) -> Result<Self> {
        let endpoint = endpoint.into().trim().to_string();
        if endpoint.is_empty() {
            return Err(Error::InvalidInput(
                "Request endpoint cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            id: RequestId::new(),
            kind,
            method,
            endpoint,
            data,
            timestamp: chrono::Utc::now().timestamp_millis(),
            retries: 0,
            status: RequestStatus::Pending,
        })
    }
}
