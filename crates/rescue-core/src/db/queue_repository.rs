//! Queued request repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT and counters

use crate::error::{Error, Result};
use crate::models::{QueuedRequest, RequestId, RequestKind, RequestStatus};
use libsql::{params, Connection};

/// Name of the single drain lease row
const DRAIN_LEASE: &str = "drain";
const LEASE_ATTEMPTS: usize = 3;

const SELECT_COLUMNS: &str =
    "SELECT id, kind, method, endpoint, data, timestamp, retries, status FROM queued_requests";

/// Durable marker of an in-flight drain cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainLease {
    /// Identifier of the engine instance holding the lease
    pub holder: String,
    /// Acquisition or last renewal time (Unix ms)
    pub acquired_at: i64,
}

/// Result of trying to take the drain lease
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseOutcome {
    /// The caller now holds the lease; `reclaimed_from` names a stale holder it replaced
    Acquired { reclaimed_from: Option<String> },
    /// Another holder's lease is still fresh
    Held(DrainLease),
}

/// Trait for queued request storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Insert a request or overwrite the stored one with the same id
    async fn put(&self, request: &QueuedRequest) -> Result<()>;

    /// Get a request by id
    async fn get(&self, id: &RequestId) -> Result<Option<QueuedRequest>>;

    /// List requests with a status in enqueue order
    async fn list_by_status(
        &self,
        status: RequestStatus,
        limit: Option<usize>,
    ) -> Result<Vec<QueuedRequest>>;

    /// Count requests with a status
    async fn count_by_status(&self, status: RequestStatus) -> Result<usize>;

    /// Delete a request; returns whether a row was removed
    async fn delete(&self, id: &RequestId) -> Result<bool>;

    /// Write only the status and retry count of a request; returns whether it still exists
    async fn set_progress(
        &self,
        id: &RequestId,
        status: RequestStatus,
        retries: u32,
    ) -> Result<bool>;

    /// Delete every request with a status
    async fn delete_by_status(&self, status: RequestStatus) -> Result<usize>;

    /// Move every request from one status to another
    async fn move_status(
        &self,
        from: RequestStatus,
        to: RequestStatus,
        reset_retries: bool,
    ) -> Result<usize>;

    /// Read the current drain lease
    async fn current_lease(&self) -> Result<Option<DrainLease>>;

    /// Take the drain lease if it is free, ours, or older than `ttl_ms`
    async fn acquire_lease(&self, holder: &str, now: i64, ttl_ms: i64) -> Result<LeaseOutcome>;

    /// Refresh the lease timestamp; returns false if `holder` no longer owns it
    async fn renew_lease(&self, holder: &str, now: i64) -> Result<bool>;

    /// Release the lease if `holder` owns it
    async fn release_lease(&self, holder: &str) -> Result<bool>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a request from a database row
    fn parse_request(row: &libsql::Row) -> Result<QueuedRequest> {
        let id: String = row.get(0)?;
        let kind: String = row.get(1)?;
        let method: String = row.get(2)?;
        let data: String = row.get(4)?;
        let retries: i64 = row.get(6)?;
        let status: String = row.get(7)?;

        Ok(QueuedRequest {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid request id in queue: {id}")))?,
            kind: RequestKind::from_name(&kind),
            method: method.parse()?,
            endpoint: row.get(3)?,
            data: serde_json::from_str(&data)?,
            timestamp: row.get(5)?,
            retries: u32::try_from(retries).map_err(|_| {
                Error::Database(format!("Invalid retry count {retries} for request {id}"))
            })?,
            status: status.parse()?,
        })
    }

    async fn collect(mut rows: libsql::Rows) -> Result<Vec<QueuedRequest>> {
        let mut requests = Vec::new();
        while let Some(row) = rows.next().await? {
            requests.push(Self::parse_request(&row)?);
        }
        Ok(requests)
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn put(&self, request: &QueuedRequest) -> Result<()> {
        let data = serde_json::to_string(&request.data)?;

        self.conn
            .execute(
                "INSERT OR REPLACE INTO queued_requests
                 (id, kind, method, endpoint, data, timestamp, retries, status)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    request.id.as_str(),
                    request.kind.as_str(),
                    request.method.as_str(),
                    request.endpoint.as_str(),
                    data,
                    request.timestamp,
                    i64::from(request.retries),
                    request.status.as_str()
                ],
            )
            .await?;

        Ok(())
    }

    async fn get(&self, id: &RequestId) -> Result<Option<QueuedRequest>> {
        let mut rows = self
            .conn
            .query(&format!("{SELECT_COLUMNS} WHERE id = ?"), [id.as_str()])
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_request(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_status(
        &self,
        status: RequestStatus,
        limit: Option<usize>,
    ) -> Result<Vec<QueuedRequest>> {
        // LIMIT -1 means no limit in SQLite
        let limit = limit.map_or(-1, |limit| limit as i64);

        let rows = self
            .conn
            .query(
                &format!(
                    "{SELECT_COLUMNS} WHERE status = ? ORDER BY timestamp ASC, id ASC LIMIT ?"
                ),
                params![status.as_str(), limit],
            )
            .await?;

        Self::collect(rows).await
    }

    async fn count_by_status(&self, status: RequestStatus) -> Result<usize> {
        let mut rows = self
            .conn
            .query(
                "SELECT COUNT(*) FROM queued_requests WHERE status = ?",
                [status.as_str()],
            )
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or_default())
    }

    async fn delete(&self, id: &RequestId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM queued_requests WHERE id = ?", [id.as_str()])
            .await?;
        Ok(rows > 0)
    }

    async fn set_progress(
        &self,
        id: &RequestId,
        status: RequestStatus,
        retries: u32,
    ) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE queued_requests SET status = ?, retries = ? WHERE id = ?",
                params![status.as_str(), i64::from(retries), id.as_str()],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn delete_by_status(&self, status: RequestStatus) -> Result<usize> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM queued_requests WHERE status = ?",
                [status.as_str()],
            )
            .await?;
        Ok(usize::try_from(rows).unwrap_or(usize::MAX))
    }

    async fn move_status(
        &self,
        from: RequestStatus,
        to: RequestStatus,
        reset_retries: bool,
    ) -> Result<usize> {
        let sql = if reset_retries {
            "UPDATE queued_requests SET status = ?, retries = 0 WHERE status = ?"
        } else {
            "UPDATE queued_requests SET status = ? WHERE status = ?"
        };

        let rows = self
            .conn
            .execute(sql, [to.as_str(), from.as_str()])
            .await?;
        Ok(usize::try_from(rows).unwrap_or(usize::MAX))
    }

    async fn current_lease(&self) -> Result<Option<DrainLease>> {
        let mut rows = self
            .conn
            .query(
                "SELECT holder, acquired_at FROM sync_lease WHERE name = ?",
                [DRAIN_LEASE],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(DrainLease {
                holder: row.get(0)?,
                acquired_at: row.get(1)?,
            })),
            None => Ok(None),
        }
    }

    async fn acquire_lease(&self, holder: &str, now: i64, ttl_ms: i64) -> Result<LeaseOutcome> {
        // A lost race re-reads the lease and decides again
        for _attempt in 0..LEASE_ATTEMPTS {
            match self.current_lease().await? {
                None => {
                    let inserted = self
                        .conn
                        .execute(
                            "INSERT OR IGNORE INTO sync_lease (name, holder, acquired_at) VALUES (?, ?, ?)",
                            params![DRAIN_LEASE, holder, now],
                        )
                        .await?;
                    if inserted > 0 {
                        return Ok(LeaseOutcome::Acquired {
                            reclaimed_from: None,
                        });
                    }
                }
                Some(lease) if lease.holder == holder => {
                    self.renew_lease(holder, now).await?;
                    return Ok(LeaseOutcome::Acquired {
                        reclaimed_from: None,
                    });
                }
                Some(lease) if now.saturating_sub(lease.acquired_at) >= ttl_ms => {
                    let replaced = self
                        .conn
                        .execute(
                            "UPDATE sync_lease SET holder = ?, acquired_at = ?
                             WHERE name = ? AND holder = ? AND acquired_at = ?",
                            params![
                                holder,
                                now,
                                DRAIN_LEASE,
                                lease.holder.as_str(),
                                lease.acquired_at
                            ],
                        )
                        .await?;
                    if replaced > 0 {
                        return Ok(LeaseOutcome::Acquired {
                            reclaimed_from: Some(lease.holder),
                        });
                    }
                }
                Some(lease) => return Ok(LeaseOutcome::Held(lease)),
            }
        }

        Err(Error::Database(
            "drain lease kept changing while it was being acquired".to_string(),
        ))
    }

    async fn renew_lease(&self, holder: &str, now: i64) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_lease SET acquired_at = ? WHERE name = ? AND holder = ?",
                params![now, DRAIN_LEASE, holder],
            )
            .await?;
        Ok(rows > 0)
    }

    async fn release_lease(&self, holder: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM sync_lease WHERE name = ? AND holder = ?",
                [DRAIN_LEASE, holder],
            )
            .await?;
        Ok(rows > 0)
    }
}
