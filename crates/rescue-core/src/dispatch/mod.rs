//! Maps queued requests to the remote operations that replay them.

mod attachments;
mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::DEFAULT_MAX_ATTACHMENT_BYTES;
use crate::models::{HttpMethod, QueuedRequest, RequestId, RequestKind};
use crate::util::last_path_segment;

pub use attachments::{decode_inline_attachment, InlineAttachment, ATTACHMENT_FIELDS};
pub use http::HttpRemoteApi;

/// Failure replaying a request against the remote service.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },
    #[error("Invalid queued request: {0}")]
    InvalidRequest(String),
    #[error("Blob storage failed: {0}")]
    Storage(String),
}

/// A concrete remote operation derived from a queued request.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    CreateDonation { payload: Value },
    RegisterVolunteer { payload: Value },
    SubmitReport { request_id: RequestId, payload: Value },
    CreateContact { payload: Value },
    UpdateContact { id: String, payload: Value },
    DeleteContact { id: String },
    CreateDrill { payload: Value },
    UpdateDrill { id: String, payload: Value },
    DeleteDrill { id: String },
    Http {
        method: HttpMethod,
        endpoint: String,
        payload: Value,
    },
}

impl RemoteCall {
    /// Select the remote operation for a request. Performs no I/O.
    pub fn plan(request: &QueuedRequest) -> Result<Self, DispatchError> {
        let payload = request.data.clone();
        let call = match request.kind {
            RequestKind::Donation => Self::CreateDonation { payload },
            RequestKind::VolunteerRegister => Self::RegisterVolunteer { payload },
            RequestKind::ReportSubmit => Self::SubmitReport {
                request_id: request.id,
                payload,
            },
            RequestKind::ContactCreate => Self::CreateContact { payload },
            RequestKind::ContactUpdate => Self::UpdateContact {
                id: resource_id(request)?,
                payload,
            },
            RequestKind::ContactDelete => Self::DeleteContact {
                id: resource_id(request)?,
            },
            RequestKind::DrillCreate => Self::CreateDrill { payload },
            RequestKind::DrillUpdate => Self::UpdateDrill {
                id: resource_id(request)?,
                payload,
            },
            RequestKind::DrillDelete => Self::DeleteDrill {
                id: resource_id(request)?,
            },
            RequestKind::Http => Self::Http {
                method: request.method,
                endpoint: request.endpoint.clone(),
                payload,
            },
        };
        Ok(call)
    }

    /// Short operation name for logs.
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::CreateDonation { .. } => "create-donation",
            Self::RegisterVolunteer { .. } => "register-volunteer",
            Self::SubmitReport { .. } => "submit-report",
            Self::CreateContact { .. } => "create-contact",
            Self::UpdateContact { .. } => "update-contact",
            Self::DeleteContact { .. } => "delete-contact",
            Self::CreateDrill { .. } => "create-drill",
            Self::UpdateDrill { .. } => "update-drill",
            Self::DeleteDrill { .. } => "delete-drill",
            Self::Http { .. } => "http",
        }
    }
}

fn resource_id(request: &QueuedRequest) -> Result<String, DispatchError> {
    last_path_segment(&request.endpoint)
        .map(str::to_string)
        .ok_or_else(|| {
            DispatchError::InvalidRequest(format!(
                "{} request {} has no resource id in endpoint '{}'",
                request.kind, request.id, request.endpoint
            ))
        })
}

/// Remote service that executes replayed operations.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn execute(&self, call: &RemoteCall) -> Result<(), DispatchError>;
}

/// Object storage for binary attachments.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under a namespace and return a reference to the object.
    async fn upload(
        &self,
        namespace: &str,
        file_name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> crate::Result<String>;
}

/// Replays queued requests through a [`RemoteApi`].
#[derive(Clone)]
pub struct Dispatcher {
    api: Arc<dyn RemoteApi>,
    blobs: Option<Arc<dyn BlobStore>>,
    max_attachment_bytes: usize,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn RemoteApi>) -> Self {
        Self {
            api,
            blobs: None,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }

    #[must_use]
    pub fn with_blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    #[must_use]
    pub const fn with_max_attachment_bytes(mut self, max_attachment_bytes: usize) -> Self {
        self.max_attachment_bytes = max_attachment_bytes;
        self
    }

    /// Plan and execute one request.
    pub async fn dispatch(&self, request: &QueuedRequest) -> Result<(), DispatchError> {
        let mut call = RemoteCall::plan(request)?;

        if let RemoteCall::SubmitReport {
            request_id,
            payload,
        } = &mut call
        {
            attachments::upload_inline_attachments(
                payload,
                request_id,
                self.blobs.as_deref(),
                self.max_attachment_bytes,
            )
            .await;
        }

        tracing::debug!(
            "Dispatching {} for request {} ({} {})",
            call.operation(),
            request.id,
            request.method,
            request.endpoint
        );
        self.api.execute(&call).await
    }
}
