//! Composition root wiring the store, monitor, queue, dispatcher and engine.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::QueueConfig;
use crate::dispatch::{BlobStore, Dispatcher, RemoteApi};
use crate::error::Result;
use crate::models::{HttpMethod, QueuedRequest, RequestId, RequestKind};
use crate::network::NetworkMonitor;
use crate::queue::OfflineQueue;
use crate::services::QueueStore;
use crate::sync::{BackgroundSyncHook, SyncEngine};

/// Result of submitting a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Delivered live.
    Sent,
    /// Stored for a later drain.
    Queued(RequestId),
}

/// Builder for [`OfflineService`].
pub struct OfflineServiceBuilder {
    config: QueueConfig,
    store: QueueStore,
    api: Arc<dyn RemoteApi>,
    blobs: Option<Arc<dyn BlobStore>>,
    hook: Option<Arc<dyn BackgroundSyncHook>>,
    monitor: Option<Arc<NetworkMonitor>>,
}

impl OfflineServiceBuilder {
    #[must_use]
    pub fn blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    #[must_use]
    pub fn background_hook(mut self, hook: Arc<dyn BackgroundSyncHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Use an existing monitor instead of one built from the config.
    #[must_use]
    pub fn monitor(mut self, monitor: Arc<NetworkMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn build(self) -> OfflineService {
        let monitor = self
            .monitor
            .unwrap_or_else(|| Arc::new(NetworkMonitor::from_config(&self.config)));

        let mut dispatcher =
            Dispatcher::new(self.api).with_max_attachment_bytes(self.config.max_attachment_bytes);
        if let Some(blobs) = self.blobs {
            dispatcher = dispatcher.with_blob_store(blobs);
        }

        let queue = OfflineQueue::new(self.store);
        let mut engine = SyncEngine::new(
            queue.clone(),
            Arc::clone(&monitor),
            dispatcher.clone(),
            &self.config,
        );
        if let Some(hook) = self.hook {
            engine = engine.with_background_hook(hook);
        }

        let (shutdown_tx, _) = watch::channel(false);
        OfflineService {
            queue,
            monitor,
            dispatcher,
            engine,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }
}

/// The offline request service. Build one per process and share it.
pub struct OfflineService {
    queue: OfflineQueue,
    monitor: Arc<NetworkMonitor>,
    dispatcher: Dispatcher,
    engine: SyncEngine,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl OfflineService {
    pub fn builder(
        config: QueueConfig,
        store: QueueStore,
        api: Arc<dyn RemoteApi>,
    ) -> OfflineServiceBuilder {
        OfflineServiceBuilder {
            config,
            store,
            api,
            blobs: None,
            hook: None,
            monitor: None,
        }
    }

    pub const fn queue(&self) -> &OfflineQueue {
        &self.queue
    }

    pub const fn monitor(&self) -> &Arc<NetworkMonitor> {
        &self.monitor
    }

    pub const fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Send a mutation now when online, otherwise queue it.
    ///
    /// A failed live attempt is queued as well.
    pub async fn submit(
        &self,
        kind: RequestKind,
        method: HttpMethod,
        endpoint: &str,
        data: Value,
    ) -> Result<SubmitOutcome> {
        let request = QueuedRequest::new(kind, method, endpoint, data)?;

        if self.monitor.is_online() {
            match self.dispatcher.dispatch(&request).await {
                Ok(()) => return Ok(SubmitOutcome::Sent),
                Err(error) => {
                    tracing::warn!("Live {kind} request failed, queueing for later: {error}");
                }
            }
        }

        let id = self.queue.enqueue(request).await?;
        Ok(SubmitOutcome::Queued(id))
    }

    /// Start the background drain loop.
    pub fn start(&self) {
        let handle = self.engine.spawn(self.shutdown_tx.subscribe());
        self.track(handle);
    }

    /// Derive the online flag from periodic reachability probes.
    pub fn poll_reachability(&self, interval: Duration) {
        let handle = self
            .monitor
            .spawn_reachability_poller(interval, self.shutdown_tx.subscribe());
        self.track(handle);
    }

    fn track(&self, handle: JoinHandle<()>) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Stop background tasks and wait for them to finish.
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let tasks = std::mem::take(
            &mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for task in tasks {
            if let Err(error) = task.await {
                tracing::warn!("Background task ended abnormally: {error}");
            }
        }
    }
}
