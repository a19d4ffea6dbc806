//! Connectivity signals and best-effort reachability probing.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::{QueueConfig, MAX_REACHABILITY_TIMEOUT_MS};

/// Connection type reported by the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    None,
    Wifi,
    Cellular,
    Ethernet,
    Other,
}

#[derive(Debug, Clone, Copy)]
struct NetworkSignals {
    platform_online: bool,
    connection_type: Option<ConnectionType>,
}

impl NetworkSignals {
    fn is_online(self) -> bool {
        self.platform_online && self.connection_type != Some(ConnectionType::None)
    }
}

/// Tracks whether the device believes it is online.
pub struct NetworkMonitor {
    signals: Mutex<NetworkSignals>,
    online_tx: watch::Sender<bool>,
    probe_url: Option<String>,
    probe_timeout: Duration,
    client: reqwest::Client,
}

impl NetworkMonitor {
    /// Create a monitor that starts online with no connection type signal.
    #[must_use]
    pub fn new(probe_url: Option<String>, probe_timeout: Duration) -> Self {
        let (online_tx, _) = watch::channel(true);
        let max_timeout = Duration::from_millis(MAX_REACHABILITY_TIMEOUT_MS);
        Self {
            signals: Mutex::new(NetworkSignals {
                platform_online: true,
                connection_type: None,
            }),
            online_tx,
            probe_url,
            probe_timeout: probe_timeout.min(max_timeout),
            client: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn from_config(config: &QueueConfig) -> Self {
        Self::new(
            config.reachability_target().map(str::to_string),
            config.reachability_timeout(),
        )
    }

    /// Current online belief. Performs no I/O.
    pub fn is_online(&self) -> bool {
        *self.online_tx.borrow()
    }

    /// Feed the platform's online flag.
    pub fn set_online(&self, online: bool) {
        self.update(|signals| signals.platform_online = online);
    }

    /// Feed the platform's connection type, or `None` when unavailable.
    pub fn set_connection_type(&self, connection_type: Option<ConnectionType>) {
        self.update(|signals| signals.connection_type = connection_type);
    }

    /// Watch the online flag. The receiver sees every offline/online transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.online_tx.subscribe()
    }

    fn update(&self, apply: impl FnOnce(&mut NetworkSignals)) {
        let online = {
            let mut signals = self
                .signals
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            apply(&mut signals);
            signals.is_online()
        };

        let changed = self.online_tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            if online {
                tracing::info!("Network is back online");
            } else {
                tracing::warn!("Network went offline");
            }
        }
    }

    /// Probe the configured endpoint. Any failure, non-success status or
    /// timeout is reported as unreachable.
    pub async fn check_reachability(&self) -> bool {
        let Some(url) = self.probe_url.as_deref() else {
            return false;
        };

        match tokio::time::timeout(self.probe_timeout, self.client.get(url).send()).await {
            Ok(Ok(response)) => {
                let reachable = response.status().is_success();
                if !reachable {
                    tracing::debug!(
                        "Reachability probe to {url} returned HTTP {}",
                        response.status().as_u16()
                    );
                }
                reachable
            }
            Ok(Err(error)) => {
                tracing::debug!("Reachability probe to {url} failed: {error}");
                false
            }
            Err(_) => {
                tracing::debug!(
                    "Reachability probe to {url} timed out after {}ms",
                    self.probe_timeout.as_millis()
                );
                false
            }
        }
    }

    /// Periodically probe reachability and feed the result into the online flag.
    ///
    /// For hosts with no platform connectivity events.
    pub fn spawn_reachability_poller(
        self: &Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if *shutdown.borrow() {
                    break;
                }

                let reachable = monitor.check_reachability().await;
                monitor.set_online(reachable);

                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
            tracing::debug!("Reachability poller stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    fn monitor_for(url: Option<String>) -> NetworkMonitor {
        NetworkMonitor::new(url, Duration::from_millis(MAX_REACHABILITY_TIMEOUT_MS))
    }

    #[test]
    fn starts_online() {
        assert!(monitor_for(None).is_online());
    }

    #[test]
    fn platform_flag_controls_online_state() {
        let monitor = monitor_for(None);
        monitor.set_online(false);
        assert!(!monitor.is_online());
        monitor.set_online(true);
        assert!(monitor.is_online());
    }

    #[test]
    fn connection_type_none_overrides_platform_flag() {
        let monitor = monitor_for(None);
        monitor.set_connection_type(Some(ConnectionType::None));
        assert!(!monitor.is_online());

        monitor.set_connection_type(Some(ConnectionType::Cellular));
        assert!(monitor.is_online());

        monitor.set_connection_type(None);
        assert!(monitor.is_online());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_observe_transitions() {
        let monitor = monitor_for(None);
        let mut rx = monitor.subscribe();

        monitor.set_online(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn repeated_signal_does_not_notify() {
        let monitor = monitor_for(None);
        let rx = monitor.subscribe();
        monitor.set_online(true);
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reachability_without_probe_url_is_false() {
        assert!(!monitor_for(None).check_reachability().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reachability_against_closed_port_is_false() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let monitor = monitor_for(Some(format!("http://127.0.0.1:{port}/health")));
        assert!(!monitor.check_reachability().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reachability_times_out_within_bound() {
        // Accepts connections but never answers.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let monitor = NetworkMonitor::new(
            Some(format!("http://127.0.0.1:{port}/health")),
            Duration::from_secs(30),
        );

        let started = Instant::now();
        assert!(!monitor.check_reachability().await);
        assert!(started.elapsed() < Duration::from_secs(2));
        drop(listener);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reachability_succeeds_against_healthy_endpoint() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0_u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        let monitor = monitor_for(Some(format!("http://127.0.0.1:{port}/health")));
        assert!(monitor.check_reachability().await);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn poller_stops_when_shutdown_sender_is_dropped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probes = Arc::new(AtomicUsize::new(0));
        let server_probes = Arc::clone(&probes);
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                server_probes.fetch_add(1, Ordering::SeqCst);
                let mut buf = [0_u8; 1024];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                    .await;
            }
        });

        let monitor = Arc::new(monitor_for(Some(format!(
            "http://127.0.0.1:{port}/health"
        ))));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = monitor.spawn_reachability_poller(Duration::from_secs(60), shutdown_rx);
        drop(shutdown_tx);

        let finished = tokio::time::timeout(Duration::from_secs(1), handle).await;
        assert!(finished.is_ok(), "poller kept running without a shutdown sender");
        assert!(probes.load(Ordering::SeqCst) <= 1);
    }
}
