//! rescue-core - Core library for Rescue
//!
//! Durable offline request queue for disaster-response clients. Mutating API
//! calls captured while offline are persisted locally and replayed against
//! the remote service with at-least-once delivery once connectivity returns.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod network;
pub mod notify;
pub mod queue;
pub mod service;
pub mod services;
pub mod state;
pub mod storage;
pub mod sync;
pub mod util;

pub use config::QueueConfig;
pub use error::{Error, Result};
pub use models::{HttpMethod, QueuedRequest, RequestId, RequestKind, RequestStatus};
pub use network::{ConnectionType, NetworkMonitor};
pub use queue::{OfflineQueue, StatusCounts};
pub use service::{OfflineService, SubmitOutcome};
pub use services::QueueStore;
pub use state::SyncState;
pub use sync::{DrainOutcome, DrainReport, SkipReason, SyncEngine};
