//! Data models for Rescue

mod kind;
mod request;

pub use kind::{HttpMethod, RequestKind};
pub use request::{QueuedRequest, RequestId, RequestStatus};
