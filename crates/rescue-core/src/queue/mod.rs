//! Application-facing API for capturing requests while offline.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::models::{HttpMethod, QueuedRequest, RequestId, RequestKind, RequestStatus};
use crate::notify::{PendingCountListener, PendingCountNotifier, Subscription};
use crate::services::QueueStore;

/// Number of stored requests in each status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: usize,
    pub syncing: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub const fn total(&self) -> usize {
        self.pending + self.syncing + self.failed
    }
}

/// Durable offline request queue with pending-count observers.
#[derive(Clone)]
pub struct OfflineQueue {
    store: QueueStore,
    notifier: PendingCountNotifier,
}

impl OfflineQueue {
    pub fn new(store: QueueStore) -> Self {
        Self {
            store,
            notifier: PendingCountNotifier::new(),
        }
    }

    pub const fn store(&self) -> &QueueStore {
        &self.store
    }

    /// Persist a new pending request and notify observers.
    pub async fn queue_request(
        &self,
        kind: RequestKind,
        method: HttpMethod,
        endpoint: &str,
        data: Value,
    ) -> Result<RequestId> {
        self.enqueue(QueuedRequest::new(kind, method, endpoint, data)?)
            .await
    }

    /// Persist an already-built request and notify observers.
    pub async fn enqueue(&self, request: QueuedRequest) -> Result<RequestId> {
        self.store.put(&request).await?;
        tracing::info!(
            "Queued {} request {} for {} {}",
            request.kind,
            request.id,
            request.method,
            request.endpoint
        );

        self.notify_observers().await;
        Ok(request.id)
    }

    pub async fn pending_count(&self) -> Result<usize> {
        self.store.count_by_status(RequestStatus::Pending).await
    }

    /// Register a listener, then invoke it with the current count.
    pub async fn subscribe(
        &self,
        listener: impl Fn(usize) + Send + Sync + 'static,
    ) -> Result<Subscription> {
        let listener: PendingCountListener = Arc::new(listener);
        let subscription = self.notifier.subscribe({
            let listener = Arc::clone(&listener);
            move |count| listener(count)
        });
        let count = self.pending_count().await?;
        listener(count);
        Ok(subscription)
    }

    pub async fn get(&self, id: &RequestId) -> Result<Option<QueuedRequest>> {
        self.store.get(id).await
    }

    pub async fn list(&self, status: RequestStatus) -> Result<Vec<QueuedRequest>> {
        self.store.list_by_status(status).await
    }

    pub async fn status_counts(&self) -> Result<StatusCounts> {
        Ok(StatusCounts {
            pending: self.store.count_by_status(RequestStatus::Pending).await?,
            syncing: self.store.count_by_status(RequestStatus::Syncing).await?,
            failed: self.store.count_by_status(RequestStatus::Failed).await?,
        })
    }

    /// Delete every failed request.
    pub async fn purge_failed(&self) -> Result<usize> {
        let purged = self.store.purge_failed().await?;
        if purged > 0 {
            tracing::info!("Purged {purged} failed request(s)");
            self.notify_observers().await;
        }
        Ok(purged)
    }

    /// Give failed requests a fresh retry budget.
    pub async fn retry_failed(&self) -> Result<usize> {
        let requeued = self.store.requeue_failed().await?;
        if requeued > 0 {
            tracing::info!("Requeued {requeued} failed request(s)");
            self.notify_observers().await;
        }
        Ok(requeued)
    }

    /// Push the current pending count to every listener.
    pub async fn notify_observers(&self) {
        match self.pending_count().await {
            Ok(count) => self.notifier.notify(count),
            Err(error) => tracing::warn!("Could not count pending requests for observers: {error}"),
        }
    }
}
