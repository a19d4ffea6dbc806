//! Drains the offline queue against the remote service.
//!
//! A drain cycle runs only while the device believes it is online. Within a
//! process an atomic flag keeps cycles single-flight; across processes that
//! share the store file, a durable lease row does the same. Each pending
//! request is marked `syncing`, dispatched, and then either deleted (success)
//! or returned to `pending`/`failed` with its retry count incremented.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::db::LeaseOutcome;
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::models::{QueuedRequest, RequestStatus};
use crate::network::NetworkMonitor;
use crate::queue::OfflineQueue;
use crate::services::QueueStore;
use crate::state::SyncState;
use crate::util::unix_timestamp_ms;

/// Platform hook asking the OS to wake the app for a later sync.
#[async_trait]
pub trait BackgroundSyncHook: Send + Sync {
    async fn register(&self) -> Result<()>;
}

/// Why a drain cycle did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    Offline,
    AlreadyDraining,
    LeaseHeld,
}

/// Tally of one completed drain cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Requests dispatched this cycle.
    pub attempted: usize,
    /// Delivered and deleted.
    pub succeeded: usize,
    /// Failed but still under the retry ceiling.
    pub requeued: usize,
    /// Reached the retry ceiling.
    pub failed: usize,
    /// Orphaned `syncing` requests returned to `pending` before the cycle.
    pub reclaimed: usize,
    /// Pending requests left after the cycle.
    pub remaining: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case", tag = "outcome")]
pub enum DrainOutcome {
    Completed(DrainReport),
    Skipped { reason: SkipReason },
}

impl DrainOutcome {
    const fn skipped(reason: SkipReason) -> Self {
        Self::Skipped { reason }
    }
}

struct EngineInner {
    queue: OfflineQueue,
    monitor: Arc<NetworkMonitor>,
    dispatcher: Dispatcher,
    hook: Option<Arc<dyn BackgroundSyncHook>>,
    holder: String,
    max_retries: u32,
    lease_ttl_ms: i64,
    interval: Duration,
    draining: AtomicBool,
    state_tx: watch::Sender<SyncState>,
}

/// Offline queue drain engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<EngineInner>,
}

impl SyncEngine {
    pub fn new(
        queue: OfflineQueue,
        monitor: Arc<NetworkMonitor>,
        dispatcher: Dispatcher,
        config: &QueueConfig,
    ) -> Self {
        let initial = if monitor.is_online() {
            SyncState::Synced
        } else {
            SyncState::Offline
        };
        let (state_tx, _) = watch::channel(initial);

        Self {
            inner: Arc::new(EngineInner {
                queue,
                monitor,
                dispatcher,
                hook: None,
                holder: Uuid::now_v7().to_string(),
                max_retries: config.max_retries,
                lease_ttl_ms: config.lease_ttl_ms(),
                interval: config.sync_interval(),
                draining: AtomicBool::new(false),
                state_tx,
            }),
        }
    }

    /// Attach a background sync hook. Must be called before the engine is shared.
    #[must_use]
    pub fn with_background_hook(self, hook: Arc<dyn BackgroundSyncHook>) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.hook = Some(hook);
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                tracing::warn!("Sync engine is already shared; background hook not attached");
                Self { inner }
            }
        }
    }

    /// Lease holder id of this engine instance.
    pub fn holder(&self) -> &str {
        &self.inner.holder
    }

    pub fn state(&self) -> SyncState {
        *self.inner.state_tx.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SyncState> {
        self.inner.state_tx.subscribe()
    }

    fn store(&self) -> &QueueStore {
        self.inner.queue.store()
    }

    fn set_state(&self, state: SyncState) {
        self.inner.state_tx.send_if_modified(|current| {
            if *current == state {
                false
            } else {
                *current = state;
                true
            }
        });
    }

    /// Run one drain cycle.
    pub async fn drain(&self) -> Result<DrainOutcome> {
        if !self.inner.monitor.is_online() {
            self.set_state(SyncState::Offline);
            tracing::debug!("Skipping drain: offline");
            return Ok(DrainOutcome::skipped(SkipReason::Offline));
        }

        let Some(_guard) = DrainGuard::try_acquire(&self.inner.draining) else {
            tracing::debug!("Skipping drain: a cycle is already running");
            return Ok(DrainOutcome::skipped(SkipReason::AlreadyDraining));
        };

        let previous = self.state();
        self.set_state(SyncState::Syncing);
        let result = self.run_leased_cycle().await;

        match &result {
            Ok(DrainOutcome::Completed(report)) => {
                tracing::info!(
                    "Drain finished: {} attempted, {} delivered, {} requeued, {} failed, {} pending",
                    report.attempted,
                    report.succeeded,
                    report.requeued,
                    report.failed,
                    report.remaining
                );
                self.set_state(SyncState::Synced);
                self.inner.queue.notify_observers().await;
                self.register_background_sync().await;
            }
            Ok(DrainOutcome::Skipped { .. }) => self.set_state(previous),
            Err(error) => {
                tracing::error!("Drain cycle aborted: {error}");
                self.set_state(SyncState::Error);
                self.inner.queue.notify_observers().await;
            }
        }

        result
    }

    async fn run_leased_cycle(&self) -> Result<DrainOutcome> {
        let holder = &self.inner.holder;
        match self
            .store()
            .acquire_lease(holder, unix_timestamp_ms(), self.inner.lease_ttl_ms)
            .await?
        {
            LeaseOutcome::Held(lease) => {
                tracing::debug!(
                    "Skipping drain: lease held by {} since {}",
                    lease.holder,
                    lease.acquired_at
                );
                return Ok(DrainOutcome::skipped(SkipReason::LeaseHeld));
            }
            LeaseOutcome::Acquired {
                reclaimed_from: Some(stale),
            } => tracing::warn!("Reclaimed stale drain lease from {stale}"),
            LeaseOutcome::Acquired { .. } => {}
        }

        let result = self.process_pending().await;

        if let Err(error) = self.store().release_lease(holder).await {
            tracing::warn!("Failed to release drain lease: {error}");
        }

        result.map(DrainOutcome::Completed)
    }

    async fn process_pending(&self) -> Result<DrainReport> {
        let store = self.store();
        let mut report = DrainReport {
            reclaimed: store.reclaim_syncing().await?,
            ..DrainReport::default()
        };
        if report.reclaimed > 0 {
            tracing::warn!(
                "Returned {} request(s) orphaned in syncing to pending",
                report.reclaimed
            );
        }

        for request in store.list_by_status(RequestStatus::Pending).await? {
            let Some(request) = store
                .update(&request.id, |record| record.status = RequestStatus::Syncing)
                .await?
            else {
                continue;
            };

            report.attempted += 1;
            self.replay(&request, &mut report).await?;

            if !store
                .renew_lease(&self.inner.holder, unix_timestamp_ms())
                .await?
            {
                tracing::warn!("Drain lease was taken over; stopping this cycle");
                break;
            }
        }

        report.remaining = store.count_by_status(RequestStatus::Pending).await?;
        Ok(report)
    }

    async fn replay(&self, request: &QueuedRequest, report: &mut DrainReport) -> Result<()> {
        let store = self.store();
        match self.inner.dispatcher.dispatch(request).await {
            Ok(()) => {
                store.delete(&request.id).await?;
                report.succeeded += 1;
                tracing::debug!("Delivered {} request {}", request.kind, request.id);
            }
            Err(error) => {
                let max_retries = self.inner.max_retries;
                let updated = store
                    .update(&request.id, |record| {
                        record.retries = record.retries.saturating_add(1);
                        record.status = if record.retries >= max_retries {
                            RequestStatus::Failed
                        } else {
                            RequestStatus::Pending
                        };
                    })
                    .await?;

                match updated {
                    Some(record) if record.status == RequestStatus::Failed => {
                        report.failed += 1;
                        tracing::error!(
                            "{} request {} failed permanently after {} attempts: {error}",
                            record.kind,
                            record.id,
                            record.retries
                        );
                    }
                    Some(record) => {
                        report.requeued += 1;
                        tracing::warn!(
                            "{} request {} failed (attempt {}/{max_retries}): {error}",
                            record.kind,
                            record.id,
                            record.retries
                        );
                    }
                    None => {}
                }
            }
        }
        Ok(())
    }

    async fn register_background_sync(&self) {
        let Some(hook) = &self.inner.hook else {
            return;
        };
        if let Err(error) = hook.register().await {
            tracing::warn!("Background sync registration failed: {error}");
        }
    }

    /// Drive drains from online transitions and a fixed interval until
    /// `shutdown` flips to true.
    pub fn spawn(&self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let engine = self.clone();
        tokio::spawn(async move {
            let mut online_rx = engine.inner.monitor.subscribe();
            let mut ticker = tokio::time::interval(engine.inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(
                "Sync engine started (interval {}s)",
                engine.inner.interval.as_secs()
            );

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow_and_update() {
                            break;
                        }
                        continue;
                    }
                    changed = online_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        if !*online_rx.borrow_and_update() {
                            engine.set_state(SyncState::Offline);
                            continue;
                        }
                    }
                    _ = ticker.tick() => {
                        if !engine.inner.monitor.is_online() {
                            continue;
                        }
                    }
                }

                if let Err(error) = engine.drain().await {
                    tracing::error!("Scheduled drain failed: {error}");
                }
            }

            tracing::info!("Sync engine stopped");
        })
    }
}

struct DrainGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> DrainGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
    use base64::Engine as _;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tempfile::tempdir;
    use tokio::sync::Notify;

    use super::*;
    use crate::dispatch::testing::{MemoryBlobStore, ScriptedApi};
    use crate::dispatch::{DispatchError, RemoteApi, RemoteCall};
    use crate::error::Error;
    use crate::models::{HttpMethod, RequestId, RequestKind};

    struct Harness {
        engine: SyncEngine,
        queue: OfflineQueue,
        monitor: Arc<NetworkMonitor>,
    }

    fn harness_with(store: QueueStore, dispatcher: Dispatcher) -> Harness {
        let queue = OfflineQueue::new(store);
        let monitor = Arc::new(NetworkMonitor::new(None, Duration::from_millis(100)));
        let engine = SyncEngine::new(
            queue.clone(),
            Arc::clone(&monitor),
            dispatcher,
            &QueueConfig::default(),
        );
        Harness {
            engine,
            queue,
            monitor,
        }
    }

    async fn harness(api: Arc<dyn RemoteApi>) -> Harness {
        harness_with(
            QueueStore::open_in_memory().await.unwrap(),
            Dispatcher::new(api),
        )
    }

    async fn enqueue_donation(queue: &OfflineQueue, amount: u32) -> RequestId {
        queue
            .queue_request(
                RequestKind::Donation,
                HttpMethod::Post,
                "/donations",
                json!({ "amount": amount }),
            )
            .await
            .unwrap()
    }

    fn completed(outcome: DrainOutcome) -> DrainReport {
        match outcome {
            DrainOutcome::Completed(report) => report,
            DrainOutcome::Skipped { reason } => panic!("drain was skipped: {reason:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn successful_replay_deletes_the_request() {
        let api = Arc::new(ScriptedApi::succeeding());
        let h = harness(api.clone()).await;
        let id = enqueue_donation(&h.queue, 50).await;

        let report = completed(h.engine.drain().await.unwrap());

        assert_eq!(report.attempted, 1);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.remaining, 0);
        assert!(h.queue.get(&id).await.unwrap().is_none());
        assert_eq!(api.calls().len(), 1);
        assert_eq!(h.engine.state(), SyncState::Synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn request_fails_permanently_after_three_attempts() {
        let api = Arc::new(ScriptedApi::failing());
        let h = harness(api.clone()).await;
        let id = enqueue_donation(&h.queue, 10).await;

        for expected_retries in 1..=2 {
            let report = completed(h.engine.drain().await.unwrap());
            assert_eq!(report.requeued, 1);
            let record = h.queue.get(&id).await.unwrap().unwrap();
            assert_eq!(record.status, RequestStatus::Pending);
            assert_eq!(record.retries, expected_retries);
        }

        let report = completed(h.engine.drain().await.unwrap());
        assert_eq!(report.failed, 1);
        let record = h.queue.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, RequestStatus::Failed);
        assert_eq!(record.retries, 3);

        let report = completed(h.engine.drain().await.unwrap());
        assert_eq!(report.attempted, 0);
        assert_eq!(api.calls().len(), 3);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn donation_failing_twice_is_delivered_on_third_cycle() {
        let api = Arc::new(ScriptedApi::failing_times(2));
        let h = harness(api.clone()).await;
        let id = enqueue_donation(&h.queue, 75).await;

        completed(h.engine.drain().await.unwrap());
        completed(h.engine.drain().await.unwrap());
        let record = h.queue.get(&id).await.unwrap().unwrap();
        assert_eq!(record.retries, 2);
        assert_eq!(record.status, RequestStatus::Pending);

        let report = completed(h.engine.drain().await.unwrap());
        assert_eq!(report.succeeded, 1);
        assert!(h.queue.get(&id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_drain_touches_nothing() {
        let api = Arc::new(ScriptedApi::succeeding());
        let h = harness(api.clone()).await;
        let id = enqueue_donation(&h.queue, 5).await;
        h.monitor.set_online(false);

        let outcome = h.engine.drain().await.unwrap();

        assert_eq!(outcome, DrainOutcome::skipped(SkipReason::Offline));
        assert!(api.calls().is_empty());
        let record = h.queue.get(&id).await.unwrap().unwrap();
        assert_eq!(record.status, RequestStatus::Pending);
        assert_eq!(record.retries, 0);
        assert_eq!(h.engine.state(), SyncState::Offline);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn requests_replay_in_enqueue_order() {
        let api = Arc::new(ScriptedApi::succeeding());
        let h = harness(api.clone()).await;

        for (amount, timestamp) in [(3, 3_000), (1, 1_000), (2, 2_000)] {
            let mut request = QueuedRequest::new(
                RequestKind::Donation,
                HttpMethod::Post,
                "/donations",
                json!({ "amount": amount }),
            )
            .unwrap();
            request.timestamp = timestamp;
            h.queue.store().put(&request).await.unwrap();
        }

        completed(h.engine.drain().await.unwrap());

        let amounts: Vec<Value> = api
            .calls()
            .into_iter()
            .map(|call| match call {
                RemoteCall::CreateDonation { payload } => payload["amount"].clone(),
                other => panic!("unexpected call {other:?}"),
            })
            .collect();
        assert_eq!(amounts, vec![json!(1), json!(2), json!(3)]);
    }

    /// Remote API that parks every call until released.
    struct GatedApi {
        entered: Notify,
        release: Notify,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl RemoteApi for GatedApi {
        async fn execute(&self, _call: &RemoteCall) -> std::result::Result<(), DispatchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_drain_is_a_no_op() {
        let api = Arc::new(GatedApi {
            entered: Notify::new(),
            release: Notify::new(),
            calls: AtomicUsize::new(0),
        });
        let h = harness(api.clone()).await;
        let id = enqueue_donation(&h.queue, 20).await;

        let engine = h.engine.clone();
        let first = tokio::spawn(async move { engine.drain().await });
        api.entered.notified().await;

        let second = h.engine.drain().await.unwrap();
        assert_eq!(second, DrainOutcome::skipped(SkipReason::AlreadyDraining));
        assert_eq!(h.engine.state(), SyncState::Syncing);

        api.release.notify_one();
        let report = completed(first.await.unwrap().unwrap());
        assert_eq!(report.succeeded, 1);
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        assert!(h.queue.get(&id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fresh_lease_held_elsewhere_skips_the_cycle() {
        let api = Arc::new(ScriptedApi::succeeding());
        let h = harness(api.clone()).await;
        enqueue_donation(&h.queue, 1).await;
        h.queue
            .store()
            .acquire_lease("other-process", unix_timestamp_ms(), 60_000)
            .await
            .unwrap();

        let outcome = h.engine.drain().await.unwrap();

        assert_eq!(outcome, DrainOutcome::skipped(SkipReason::LeaseHeld));
        assert!(api.calls().is_empty());
        assert_eq!(h.queue.pending_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_lease_is_reclaimed_with_its_orphans() {
        let api = Arc::new(ScriptedApi::failing());
        let h = harness(api.clone()).await;

        let mut orphan = QueuedRequest::new(
            RequestKind::ContactCreate,
            HttpMethod::Post,
            "/emergency-contacts",
            json!({ "name": "Neighbor" }),
        )
        .unwrap();
        orphan.status = RequestStatus::Syncing;
        orphan.retries = 1;
        h.queue.store().put(&orphan).await.unwrap();
        h.queue
            .store()
            .acquire_lease("crashed-process", 0, 60_000)
            .await
            .unwrap();

        let report = completed(h.engine.drain().await.unwrap());

        assert_eq!(report.reclaimed, 1);
        assert_eq!(report.attempted, 1);
        let record = h.queue.get(&orphan.id).await.unwrap().unwrap();
        assert_eq!(record.retries, 2);
        assert_eq!(record.status, RequestStatus::Pending);
        assert_eq!(h.queue.store().current_lease().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_requests_survive_restart() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("queue.db");

        let id = {
            let store = QueueStore::open_path(&path).await.unwrap();
            let h = harness_with(
                store,
                Dispatcher::new(Arc::new(ScriptedApi::succeeding())),
            );
            h.monitor.set_online(false);
            let id = enqueue_donation(&h.queue, 9).await;
            h.engine.drain().await.unwrap();
            id
        };

        let api = Arc::new(ScriptedApi::succeeding());
        let store = QueueStore::open_path(&path).await.unwrap();
        let h = harness_with(store, Dispatcher::new(api.clone()));
        assert_eq!(h.queue.pending_count().await.unwrap(), 1);

        completed(h.engine.drain().await.unwrap());
        assert!(h.queue.get(&id).await.unwrap().is_none());
        assert_eq!(api.calls().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn oversized_report_photo_is_dropped_and_report_delivered() {
        let api = Arc::new(ScriptedApi::succeeding());
        let blobs = Arc::new(MemoryBlobStore::default());
        let dispatcher = Dispatcher::new(api.clone()).with_blob_store(blobs.clone());
        let h = harness_with(QueueStore::open_in_memory().await.unwrap(), dispatcher);

        let photo = BASE64_STANDARD.encode(vec![0_u8; 11 * 1024 * 1024]);
        let id = h
            .queue
            .queue_request(
                RequestKind::ReportSubmit,
                HttpMethod::Post,
                "/hazard-reports",
                json!({ "title": "Downed power line", "photo": photo }),
            )
            .await
            .unwrap();

        let report = completed(h.engine.drain().await.unwrap());

        assert_eq!(report.succeeded, 1);
        assert!(h.queue.get(&id).await.unwrap().is_none());
        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        let RemoteCall::SubmitReport { payload, .. } = &calls[0] else {
            panic!("expected a report submission, got {calls:?}");
        };
        assert_eq!(payload, &json!({ "title": "Downed power line" }));
        assert!(blobs.uploads.lock().unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn observers_track_pending_count_through_a_drain() {
        let api = Arc::new(ScriptedApi::succeeding());
        let h = harness(api).await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _subscription = h
            .queue
            .subscribe(move |count| sink.lock().unwrap().push(count))
            .await
            .unwrap();

        enqueue_donation(&h.queue, 1).await;
        enqueue_donation(&h.queue, 2).await;
        assert_eq!(h.queue.pending_count().await.unwrap(), 2);

        completed(h.engine.drain().await.unwrap());

        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 0]);
    }

    struct CountingHook {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl BackgroundSyncHook for CountingHook {
        async fn register(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(Error::InvalidInput("background sync unsupported".to_string()))
            } else {
                Ok(())
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn background_hook_failure_does_not_fail_the_cycle() {
        let hook = Arc::new(CountingHook {
            calls: AtomicUsize::new(0),
            fail: true,
        });
        let api = Arc::new(ScriptedApi::succeeding());
        let h = harness(api).await;
        let engine = h.engine.with_background_hook(hook.clone());
        enqueue_donation(&h.queue, 1).await;

        completed(engine.drain().await.unwrap());
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);

        h.monitor.set_online(false);
        engine.drain().await.unwrap();
        assert_eq!(hook.calls.load(Ordering::SeqCst), 1);
    }

    async fn wait_for_pending(queue: &OfflineQueue, expected: usize) -> bool {
        for _attempt in 0..100 {
            if queue.pending_count().await.unwrap() == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn spawned_engine_drains_when_connectivity_returns() {
        let api = Arc::new(ScriptedApi::succeeding());
        let h = harness(api.clone()).await;
        h.monitor.set_online(false);
        enqueue_donation(&h.queue, 30).await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = h.engine.spawn(shutdown_rx);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.queue.pending_count().await.unwrap(), 1);

        h.monitor.set_online(true);
        assert!(wait_for_pending(&h.queue, 0).await);
        assert_eq!(api.calls().len(), 1);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
