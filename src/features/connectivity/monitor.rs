//! Connectivity monitor.
//!
//! Keeps a best-effort estimate of internet reachability by probing a list of
//! well-known endpoints, and tells registered callbacks when it changes.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::probe::Prober;
use crate::config::MonitorConfig;
use crate::error::panic_message;

/// Observed reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Online,
    Offline,
    /// A probe cycle is running, or none has finished yet.
    Checking,
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Checking => "checking",
        };
        f.write_str(s)
    }
}

/// Current status plus when it was last confirmed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectivityState {
    pub status: NetworkStatus,
    pub last_checked: Option<DateTime<Utc>>,
}

impl ConnectivityState {
    #[must_use]
    pub const fn is_online(&self) -> bool {
        matches!(self.status, NetworkStatus::Online)
    }
}

impl Default for ConnectivityState {
    fn default() -> Self {
        Self {
            status: NetworkStatus::Checking,
            last_checked: None,
        }
    }
}

/// Receives connectivity transitions.
///
/// An `Err` or a panic is logged by the monitor and does not stop delivery to
/// the remaining callbacks.
#[async_trait]
pub trait ConnectivityCallback: Send + Sync {
    async fn on_change(&self, old: NetworkStatus, new: NetworkStatus) -> anyhow::Result<()>;
}

struct FnCallback<F>(F);

#[async_trait]
impl<F> ConnectivityCallback for FnCallback<F>
where
    F: Fn(NetworkStatus, NetworkStatus) + Send + Sync,
{
    async fn on_change(&self, old: NetworkStatus, new: NetworkStatus) -> anyhow::Result<()> {
        (self.0)(old, new);
        Ok(())
    }
}

/// Wrap a plain closure as a callback.
pub fn callback_fn<F>(f: F) -> Arc<dyn ConnectivityCallback>
where
    F: Fn(NetworkStatus, NetworkStatus) + Send + Sync + 'static,
{
    Arc::new(FnCallback(f))
}

struct MonitorTask {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Periodically probes connectivity and reports transitions.
pub struct ConnectivityMonitor {
    prober: Arc<dyn Prober>,
    endpoints: Vec<String>,
    probe_timeout: Duration,
    interval: Duration,
    state: RwLock<ConnectivityState>,
    callbacks: RwLock<Vec<Arc<dyn ConnectivityCallback>>>,
    // Serializes probe cycles so `(old, new)` pairs are always consistent
    update_lock: tokio::sync::Mutex<()>,
    task: Mutex<Option<MonitorTask>>,
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("endpoints", &self.endpoints)
            .field("probe_timeout", &self.probe_timeout)
            .field("interval", &self.interval)
            .field("state", &*self.state.read())
            .field("callbacks", &self.callbacks.read().len())
            .finish_non_exhaustive()
    }
}

impl ConnectivityMonitor {
    /// Create a monitor with default timeout (5s) and interval (30s).
    #[must_use]
    pub fn new(prober: Arc<dyn Prober>, endpoints: Vec<String>) -> Self {
        let defaults = MonitorConfig::default();
        Self {
            prober,
            endpoints,
            probe_timeout: defaults.probe_timeout(),
            interval: defaults.interval(),
            state: RwLock::new(ConnectivityState::default()),
            callbacks: RwLock::new(Vec::new()),
            update_lock: tokio::sync::Mutex::new(()),
            task: Mutex::new(None),
        }
    }

    /// Create a monitor from configuration.
    #[must_use]
    pub fn from_config(prober: Arc<dyn Prober>, config: &MonitorConfig) -> Self {
        Self::new(prober, config.endpoints.clone())
            .with_probe_timeout(config.probe_timeout())
            .with_interval(config.interval())
    }

    #[must_use]
    pub const fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> ConnectivityState {
        *self.state.read()
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        self.state().is_online()
    }

    /// Probe endpoints in order; `true` at the first one answering below 500.
    pub async fn check_connectivity(&self) -> bool {
        for endpoint in &self.endpoints {
            let probe = self.prober.probe(endpoint, self.probe_timeout);
            match tokio::time::timeout(self.probe_timeout, probe).await {
                Ok(Ok(status)) if status < 500 => {
                    tracing::debug!(%endpoint, status, "probe answered");
                    return true;
                }
                Ok(Ok(status)) => {
                    tracing::debug!(%endpoint, status, "probe answered with server error");
                }
                Ok(Err(e)) => tracing::debug!(%endpoint, error = %e, "probe failed"),
                Err(_) => tracing::debug!(%endpoint, "probe timed out"),
            }
        }
        false
    }

    /// Run one probe cycle and notify callbacks if the status changed.
    ///
    /// Callbacks fire only when the previous status was a real observation
    /// (not `Checking`) and differs from the new one.
    pub async fn update_status(&self) -> ConnectivityState {
        let _cycle = self.update_lock.lock().await;

        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut state.status, NetworkStatus::Checking)
        };

        let status = if self.check_connectivity().await {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        };

        let current = {
            let mut state = self.state.write();
            state.status = status;
            state.last_checked = Some(Utc::now());
            *state
        };

        if previous != NetworkStatus::Checking && previous != status {
            tracing::info!(from = %previous, to = %status, "connectivity changed");
            self.notify(previous, status).await;
        }

        current
    }

    /// Register a callback. Adding the same `Arc` twice has no effect.
    pub fn add_callback(&self, callback: Arc<dyn ConnectivityCallback>) {
        let mut callbacks = self.callbacks.write();
        if !callbacks.iter().any(|c| Arc::ptr_eq(c, &callback)) {
            callbacks.push(callback);
        }
    }

    /// Unregister a callback; returns whether it was registered.
    pub fn remove_callback(&self, callback: &Arc<dyn ConnectivityCallback>) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|c| !Arc::ptr_eq(c, callback));
        callbacks.len() != before
    }

    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.callbacks.read().len()
    }

    // Sequential, in registration order
    async fn notify(&self, old: NetworkStatus, new: NetworkStatus) {
        let callbacks = self.callbacks.read().clone();

        for (index, callback) in callbacks.iter().enumerate() {
            match AssertUnwindSafe(callback.on_change(old, new))
                .catch_unwind()
                .await
            {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(callback = index, error = %e, "connectivity callback failed");
                }
                Err(panic) => tracing::error!(
                    callback = index,
                    panic = %panic_message(panic.as_ref()),
                    "connectivity callback panicked"
                ),
            }
        }
    }

    /// Start the periodic probe loop. Does nothing if it is already running.
    pub fn start_monitoring(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return;
        }

        let (shutdown, mut stop) = oneshot::channel();
        let monitor = Arc::downgrade(self);
        let interval = self.interval;

        let handle = tokio::spawn(async move {
            tracing::info!(?interval, "connectivity monitoring started");
            loop {
                if !run_cycle(&monitor).await {
                    break;
                }
                tokio::select! {
                    () = tokio::time::sleep(interval) => {}
                    _ = &mut stop => break,
                }
            }
            tracing::info!("connectivity monitoring stopped");
        });

        *task = Some(MonitorTask { shutdown, handle });
    }

    /// Stop the probe loop and wait for it to exit. Does nothing if it is not
    /// running.
    pub async fn stop_monitoring(&self) {
        let task = self.task.lock().take();
        let Some(task) = task else {
            return;
        };

        // The receiver is gone only if the loop already ended on its own
        let _ = task.shutdown.send(());
        if let Err(e) = task.handle.await {
            tracing::error!(error = %e, "connectivity monitor task ended abnormally");
        }
    }

    #[must_use]
    pub fn is_monitoring(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }
}

/// One loop iteration; `false` once the monitor has been dropped.
async fn run_cycle(monitor: &Weak<ConnectivityMonitor>) -> bool {
    let Some(monitor) = monitor.upgrade() else {
        return false;
    };
    monitor.update_status().await;
    true
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;
    use crate::error::SyncError;
    use crate::features::connectivity::probe::MockProber;

    /// Prober whose answer is flipped by the test.
    struct SwitchProber {
        online: AtomicBool,
        calls: AtomicUsize,
    }

    impl SwitchProber {
        fn new(online: bool) -> Arc<Self> {
            Arc::new(Self {
                online: AtomicBool::new(online),
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, online: bool) {
            self.online.store(online, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Prober for SwitchProber {
        async fn probe(&self, _endpoint: &str, _timeout: Duration) -> Result<u16, SyncError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.online.load(Ordering::SeqCst) {
                Ok(204)
            } else {
                Err(SyncError::Network("unreachable".to_string()))
            }
        }
    }

    fn endpoints(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("https://probe-{i}.example")).collect()
    }

    fn recorder() -> (Arc<Mutex<Vec<(NetworkStatus, NetworkStatus)>>>, Arc<dyn ConnectivityCallback>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = callback_fn(move |old, new| sink.lock().push((old, new)));
        (seen, callback)
    }

    #[tokio::test]
    async fn test_first_non_server_error_wins() {
        let mut prober = MockProber::new();
        prober
            .expect_probe()
            .times(2)
            .returning(|endpoint, _| {
                if endpoint.contains("probe-0") {
                    Ok(503)
                } else {
                    Ok(404)
                }
            });

        let monitor = ConnectivityMonitor::new(Arc::new(prober), endpoints(3));
        assert!(monitor.check_connectivity().await);
    }

    #[tokio::test]
    async fn test_all_endpoints_failing_is_offline() {
        let mut prober = MockProber::new();
        prober
            .expect_probe()
            .times(3)
            .returning(|_, _| Err(SyncError::Network("down".to_string())));

        let monitor = ConnectivityMonitor::new(Arc::new(prober), endpoints(3));
        assert!(!monitor.check_connectivity().await);
    }

    #[tokio::test]
    async fn test_server_errors_only_is_offline() {
        let mut prober = MockProber::new();
        prober.expect_probe().times(3).returning(|_, _| Ok(500));

        let monitor = ConnectivityMonitor::new(Arc::new(prober), endpoints(3));
        assert!(!monitor.check_connectivity().await);
    }

    #[tokio::test]
    async fn test_starts_checking_then_settles() {
        let prober = SwitchProber::new(true);
        let monitor = ConnectivityMonitor::new(prober, endpoints(1));

        assert_eq!(monitor.state().status, NetworkStatus::Checking);
        assert!(monitor.state().last_checked.is_none());

        let state = monitor.update_status().await;
        assert_eq!(state.status, NetworkStatus::Online);
        assert!(state.last_checked.is_some());
        assert!(monitor.is_online());
    }

    #[tokio::test]
    async fn test_callbacks_only_on_real_transitions() {
        let prober = SwitchProber::new(false);
        let monitor = ConnectivityMonitor::new(prober.clone(), endpoints(1));
        let (seen, callback) = recorder();
        monitor.add_callback(callback);

        // Checking -> Offline is the first observation, not a transition
        monitor.update_status().await;
        assert!(seen.lock().is_empty());

        // Offline -> Offline
        monitor.update_status().await;
        assert!(seen.lock().is_empty());

        prober.set(true);
        monitor.update_status().await;
        prober.set(false);
        monitor.update_status().await;

        assert_eq!(
            *seen.lock(),
            vec![
                (NetworkStatus::Offline, NetworkStatus::Online),
                (NetworkStatus::Online, NetworkStatus::Offline),
            ]
        );
    }

    #[tokio::test]
    async fn test_callbacks_deduplicated_and_removable() {
        let prober = SwitchProber::new(false);
        let monitor = ConnectivityMonitor::new(prober.clone(), endpoints(1));
        let (seen, callback) = recorder();

        monitor.add_callback(Arc::clone(&callback));
        monitor.add_callback(Arc::clone(&callback));
        assert_eq!(monitor.callback_count(), 1);

        monitor.update_status().await;
        prober.set(true);
        monitor.update_status().await;
        assert_eq!(seen.lock().len(), 1);

        assert!(monitor.remove_callback(&callback));
        assert!(!monitor.remove_callback(&callback));

        prober.set(false);
        monitor.update_status().await;
        assert_eq!(seen.lock().len(), 1);
    }

    struct FailingCallback;

    #[async_trait]
    impl ConnectivityCallback for FailingCallback {
        async fn on_change(&self, _old: NetworkStatus, _new: NetworkStatus) -> anyhow::Result<()> {
            anyhow::bail!("ui went away")
        }
    }

    struct PanickingCallback;

    #[async_trait]
    impl ConnectivityCallback for PanickingCallback {
        async fn on_change(&self, _old: NetworkStatus, _new: NetworkStatus) -> anyhow::Result<()> {
            panic!("callback bug")
        }
    }

    #[tokio::test]
    async fn test_failing_callbacks_do_not_block_others() {
        let prober = SwitchProber::new(false);
        let monitor = ConnectivityMonitor::new(prober.clone(), endpoints(1));
        let (seen, callback) = recorder();

        monitor.add_callback(Arc::new(FailingCallback));
        monitor.add_callback(Arc::new(PanickingCallback));
        monitor.add_callback(callback);

        monitor.update_status().await;
        prober.set(true);
        let state = monitor.update_status().await;

        assert_eq!(state.status, NetworkStatus::Online);
        assert_eq!(monitor.state().status, NetworkStatus::Online);
        assert_eq!(
            *seen.lock(),
            vec![(NetworkStatus::Offline, NetworkStatus::Online)]
        );
    }

    /// Appends `start` and `end` entries around a pause.
    struct SlowCallback {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ConnectivityCallback for SlowCallback {
        async fn on_change(&self, _old: NetworkStatus, _new: NetworkStatus) -> anyhow::Result<()> {
            self.log.lock().push(format!("{}-start", self.name));
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.log.lock().push(format!("{}-end", self.name));
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_callbacks_run_one_at_a_time_in_registration_order() {
        let prober = SwitchProber::new(false);
        let monitor = ConnectivityMonitor::new(prober.clone(), endpoints(1));
        let log = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second"] {
            monitor.add_callback(Arc::new(SlowCallback {
                name,
                log: Arc::clone(&log),
            }));
        }

        monitor.update_status().await;
        prober.set(true);
        monitor.update_status().await;

        assert_eq!(
            *log.lock(),
            vec!["first-start", "first-end", "second-start", "second-end"]
        );
    }

    #[tokio::test]
    async fn test_start_stop_is_idempotent() {
        let prober = SwitchProber::new(true);
        let monitor = Arc::new(
            ConnectivityMonitor::new(prober.clone(), endpoints(1))
                .with_interval(Duration::from_secs(3600)),
        );

        // Stopping a monitor that never started is fine
        monitor.stop_monitoring().await;

        monitor.start_monitoring();
        monitor.start_monitoring();
        assert!(monitor.is_monitoring());

        // The first cycle runs immediately
        tokio::time::timeout(Duration::from_secs(5), async {
            while prober.calls.load(Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        // Stop must not wait out the hour-long sleep
        tokio::time::timeout(Duration::from_secs(5), monitor.stop_monitoring())
            .await
            .unwrap();
        assert!(!monitor.is_monitoring());
        assert_eq!(prober.calls.load(Ordering::SeqCst), 1);

        monitor.stop_monitoring().await;
    }

    #[tokio::test]
    async fn test_loop_keeps_probing() {
        let prober = SwitchProber::new(true);
        let monitor = Arc::new(
            ConnectivityMonitor::new(prober.clone(), endpoints(1))
                .with_interval(Duration::from_millis(10)),
        );

        monitor.start_monitoring();
        tokio::time::timeout(Duration::from_secs(5), async {
            while prober.calls.load(Ordering::SeqCst) < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        monitor.stop_monitoring().await;

        let calls = prober.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(prober.calls.load(Ordering::SeqCst), calls);
    }
}
