//! Durable queue store shared by the queue API and the sync engine.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libsql::Connection;
use tokio::sync::Mutex;

use crate::db::{Database, DrainLease, LeaseOutcome, LibSqlQueueRepository, QueueRepository};
use crate::error::{Error, Result};
use crate::models::{QueuedRequest, RequestId, RequestStatus};

/// Thread-safe handle to the queued request table.
///
/// Every operation that fails because the connection was invalidated reopens
/// the store once and retries the operation once before giving up.
#[derive(Clone)]
pub struct QueueStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl QueueStore {
    /// Open the store at the given filesystem path, creating parent directories.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                Error::StorageUnavailable(format!(
                    "failed to create queue store directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let db = Database::open(&db_path).await?;
        tracing::debug!("Opened queue store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem path backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Invalidate the live connection, e.g. before an external schema upgrade.
    ///
    /// The next operation reopens the store transparently.
    pub async fn close_connection(&self) {
        let mut db = self.db.lock().await;
        db.close();
    }

    async fn with_connection<T, F, Fut>(&self, operation: &str, run: F) -> Result<T>
    where
        F: Fn(Connection) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let first_attempt = {
            let db = self.db.lock().await;
            match db.connection() {
                Ok(conn) => run(conn.clone()).await,
                Err(error) => Err(error),
            }
        };

        match first_attempt {
            Err(error) if error.is_connection_invalidated() => {
                tracing::warn!(
                    "Queue store connection invalidated during {operation}: {error}. Reopening and retrying once."
                );
                let conn = {
                    let mut db = self.db.lock().await;
                    db.reopen().await?;
                    db.connection()?.clone()
                };
                run(conn).await
            }
            other => other,
        }
    }

    /// Insert or overwrite a request by id.
    pub async fn put(&self, request: &QueuedRequest) -> Result<()> {
        self.with_connection("put", |conn| async move {
            LibSqlQueueRepository::new(&conn).put(request).await
        })
        .await
    }

    /// Fetch a request by id.
    pub async fn get(&self, id: &RequestId) -> Result<Option<QueuedRequest>> {
        self.with_connection("get", |conn| async move {
            LibSqlQueueRepository::new(&conn).get(id).await
        })
        .await
    }

    /// All requests with a status, oldest first.
    pub async fn list_by_status(&self, status: RequestStatus) -> Result<Vec<QueuedRequest>> {
        self.list_by_status_limited(status, None).await
    }

    /// Up to `limit` requests with a status, oldest first.
    pub async fn list_by_status_limited(
        &self,
        status: RequestStatus,
        limit: Option<usize>,
    ) -> Result<Vec<QueuedRequest>> {
        self.with_connection("list_by_status", |conn| async move {
            LibSqlQueueRepository::new(&conn)
                .list_by_status(status, limit)
                .await
        })
        .await
    }

    /// Number of requests with a status.
    pub async fn count_by_status(&self, status: RequestStatus) -> Result<usize> {
        self.with_connection("count_by_status", |conn| async move {
            LibSqlQueueRepository::new(&conn)
                .count_by_status(status)
                .await
        })
        .await
    }

    /// Remove a request. Deleting an unknown id is not an error.
    pub async fn delete(&self, id: &RequestId) -> Result<()> {
        let removed = self
            .with_connection("delete", |conn| async move {
                LibSqlQueueRepository::new(&conn).delete(id).await
            })
            .await?;
        if !removed {
            tracing::debug!("Request {id} was already absent from the queue");
        }
        Ok(())
    }

    /// Read-modify-write of a single request's mutable fields.
    ///
    /// Returns `Ok(None)` when the request no longer exists. The mutator may
    /// only change `status` and `retries`; status changes must follow the
    /// request lifecycle and `retries` may not decrease.
    pub async fn update<F>(&self, id: &RequestId, mutate: F) -> Result<Option<QueuedRequest>>
    where
        F: FnOnce(&mut QueuedRequest),
    {
        let Some(current) = self.get(id).await? else {
            return Ok(None);
        };

        let mut updated = current.clone();
        mutate(&mut updated);

        let updated = QueuedRequest {
            status: updated.status,
            retries: updated.retries,
            ..current.clone()
        };

        if updated.status != current.status && !current.status.can_transition_to(updated.status)
        {
            return Err(Error::InvalidInput(format!(
                "Request {id} cannot move from {} to {}",
                current.status, updated.status
            )));
        }
        if updated.retries < current.retries {
            return Err(Error::InvalidInput(format!(
                "Request {id} retry count cannot decrease ({} -> {})",
                current.retries, updated.retries
            )));
        }

        let (status, retries) = (updated.status, updated.retries);
        let still_stored = self
            .with_connection("update", |conn| async move {
                LibSqlQueueRepository::new(&conn)
                    .set_progress(id, status, retries)
                    .await
            })
            .await?;

        Ok(still_stored.then_some(updated))
    }

    /// Delete every failed request; returns how many were removed.
    pub async fn purge_failed(&self) -> Result<usize> {
        self.with_connection("purge_failed", |conn| async move {
            LibSqlQueueRepository::new(&conn)
                .delete_by_status(RequestStatus::Failed)
                .await
        })
        .await
    }

    /// Return failed requests to the pending queue with a fresh retry budget.
    pub async fn requeue_failed(&self) -> Result<usize> {
        self.with_connection("requeue_failed", |conn| async move {
            LibSqlQueueRepository::new(&conn)
                .move_status(RequestStatus::Failed, RequestStatus::Pending, true)
                .await
        })
        .await
    }

    /// Return requests stranded in `syncing` by an abandoned cycle to `pending`.
    pub async fn reclaim_syncing(&self) -> Result<usize> {
        self.with_connection("reclaim_syncing", |conn| async move {
            LibSqlQueueRepository::new(&conn)
                .move_status(RequestStatus::Syncing, RequestStatus::Pending, false)
                .await
        })
        .await
    }

    /// Read the current drain lease.
    pub async fn current_lease(&self) -> Result<Option<DrainLease>> {
        self.with_connection("current_lease", |conn| async move {
            LibSqlQueueRepository::new(&conn).current_lease().await
        })
        .await
    }

    /// Take the drain lease for `holder`.
    pub async fn acquire_lease(&self, holder: &str, now: i64, ttl_ms: i64) -> Result<LeaseOutcome> {
        self.with_connection("acquire_lease", |conn| async move {
            LibSqlQueueRepository::new(&conn)
                .acquire_lease(holder, now, ttl_ms)
                .await
        })
        .await
    }

    /// Refresh the drain lease held by `holder`.
    pub async fn renew_lease(&self, holder: &str, now: i64) -> Result<bool> {
        self.with_connection("renew_lease", |conn| async move {
            LibSqlQueueRepository::new(&conn)
                .renew_lease(holder, now)
                .await
        })
        .await
    }

    /// Release the drain lease held by `holder`.
    pub async fn release_lease(&self, holder: &str) -> Result<bool> {
        self.with_connection("release_lease", |conn| async move {
            LibSqlQueueRepository::new(&conn).release_lease(holder).await
        })
        .await
    }
}
