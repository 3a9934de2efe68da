//! Sync engine.
//!
//! Drains the operation queue through the registered executors, either on
//! demand or when the connectivity monitor reports that the network is back.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::conflict::{resolve, ConflictDetector, ConflictStrategy, NoConflictDetector, Resolution};
use super::executor::Executor;
use crate::error::{panic_message, SyncError};
use crate::features::connectivity::{ConnectivityCallback, ConnectivityMonitor, NetworkStatus};
use crate::features::queue::{Operation, OperationQueue, OperationType, Payload};

/// How a sync call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRunStatus {
    /// The pass ran over the pending snapshot.
    Completed,
    /// Another pass was active; nothing was touched.
    AlreadySyncing,
    /// The monitor did not report online; nothing was touched.
    Offline,
}

/// Aggregate result of one sync call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncRun {
    pub status: SyncRunStatus,
    /// Operations this pass claimed and ran to a terminal state
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Completed rows removed by the sweep at the end of the pass
    pub cleaned: usize,
}

impl SyncRun {
    #[must_use]
    pub const fn already_syncing() -> Self {
        Self::skipped(SyncRunStatus::AlreadySyncing)
    }

    #[must_use]
    pub const fn offline() -> Self {
        Self::skipped(SyncRunStatus::Offline)
    }

    const fn skipped(status: SyncRunStatus) -> Self {
        Self {
            status,
            processed: 0,
            succeeded: 0,
            failed: 0,
            cleaned: 0,
        }
    }

    /// Whether a pass actually ran.
    #[must_use]
    pub const fn ran(&self) -> bool {
        matches!(self.status, SyncRunStatus::Completed)
    }
}

/// Marks a pass as active for as long as it lives.
struct PassGuard<'a> {
    active: &'a AtomicUsize,
    idle: &'a Notify,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Runs queued operations through their executors.
pub struct SyncEngine {
    queue: Arc<OperationQueue>,
    monitor: Arc<ConnectivityMonitor>,
    handlers: RwLock<HashMap<OperationType, Arc<dyn Executor>>>,
    strategy: RwLock<ConflictStrategy>,
    detector: RwLock<Arc<dyn ConflictDetector>>,
    active_passes: AtomicUsize,
    idle: Notify,
    /// Passes spawned by the automatic trigger
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut handlers: Vec<_> = self.handlers.read().keys().copied().collect();
        handlers.sort_by_key(OperationType::as_str);
        f.debug_struct("SyncEngine")
            .field("handlers", &handlers)
            .field("strategy", &*self.strategy.read())
            .field("active_passes", &self.active_passes.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SyncEngine {
    /// Create an engine with no handlers, `LocalWins`, and no conflict
    /// detection.
    #[must_use]
    pub fn new(queue: Arc<OperationQueue>, monitor: Arc<ConnectivityMonitor>) -> Self {
        Self {
            queue,
            monitor,
            handlers: RwLock::new(HashMap::new()),
            strategy: RwLock::new(ConflictStrategy::default()),
            detector: RwLock::new(Arc::new(NoConflictDetector)),
            active_passes: AtomicUsize::new(0),
            idle: Notify::new(),
            background: Mutex::new(Vec::new()),
        }
    }

    /// Register the executor for an operation type, replacing any previous one.
    pub fn register_handler(&self, operation_type: OperationType, executor: Arc<dyn Executor>) {
        if self
            .handlers
            .write()
            .insert(operation_type, executor)
            .is_some()
        {
            tracing::warn!(%operation_type, "replacing registered handler");
        }
    }

    #[must_use]
    pub fn has_handler(&self, operation_type: OperationType) -> bool {
        self.handlers.read().contains_key(&operation_type)
    }

    pub fn set_conflict_strategy(&self, strategy: ConflictStrategy) {
        *self.strategy.write() = strategy;
    }

    #[must_use]
    pub fn conflict_strategy(&self) -> ConflictStrategy {
        *self.strategy.read()
    }

    pub fn set_conflict_detector(&self, detector: Arc<dyn ConflictDetector>) {
        *self.detector.write() = detector;
    }

    /// Whether any pass is running.
    #[must_use]
    pub fn is_syncing(&self) -> bool {
        self.active_passes.load(Ordering::SeqCst) > 0
    }

    /// Wait until every automatically started pass has finished and no pass
    /// is running.
    pub async fn wait_idle(&self) {
        loop {
            let handles = std::mem::take(&mut *self.background.lock());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "automatic sync task ended abnormally");
                }
            }
        }

        loop {
            let idle = self.idle.notified();
            tokio::pin!(idle);
            idle.as_mut().enable();
            if !self.is_syncing() {
                return;
            }
            idle.await;
        }
    }

    fn spawn_background(self: Arc<Self>) {
        let engine = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            match engine.sync(false).await {
                Ok(run) => tracing::debug!(status = ?run.status, "automatic sync finished"),
                Err(e) => tracing::error!(error = %e, "automatic sync failed"),
            }
        });

        let mut background = self.background.lock();
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }

    /// Subscribe to `monitor` so that every `Offline -> Online` transition
    /// starts a non-forced pass in the background.
    pub fn attach(self: &Arc<Self>, monitor: &ConnectivityMonitor) {
        monitor.add_callback(Arc::new(AutoSyncTrigger {
            engine: Arc::downgrade(self),
        }));
    }

    /// Run one sync pass.
    ///
    /// Without `force`, returns [`SyncRun::already_syncing`] while another
    /// pass is active. With `force`, the pass may overlap a running one; each
    /// operation is claimed before it runs, so no operation executes twice.
    /// In both cases the pass only runs while the monitor reports online.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read or updated. Failures of
    /// individual operations are recorded on the operation instead.
    pub async fn sync(&self, force: bool) -> Result<SyncRun, SyncError> {
        let Some(_pass) = self.begin_pass(force) else {
            tracing::debug!("sync requested while a pass is active");
            return Ok(SyncRun::already_syncing());
        };

        if !self.monitor.is_online() {
            tracing::debug!("sync requested while offline");
            return Ok(SyncRun::offline());
        }

        let pending = self.queue.get_pending_operations()?;
        tracing::info!(pending = pending.len(), force, "sync pass started");

        let mut run = SyncRun::skipped(SyncRunStatus::Completed);
        for operation in pending {
            match self.run_operation(&operation).await? {
                Some(true) => run.succeeded += 1,
                Some(false) => run.failed += 1,
                None => continue,
            }
            run.processed += 1;
        }

        run.cleaned = self.queue.clear_completed()?;

        tracing::info!(
            processed = run.processed,
            succeeded = run.succeeded,
            failed = run.failed,
            cleaned = run.cleaned,
            "sync pass finished"
        );
        Ok(run)
    }

    fn begin_pass(&self, force: bool) -> Option<PassGuard<'_>> {
        if force {
            self.active_passes.fetch_add(1, Ordering::SeqCst);
        } else if self
            .active_passes
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return None;
        }
        Some(PassGuard {
            active: &self.active_passes,
            idle: &self.idle,
        })
    }

    /// Claim, resolve, and execute one operation.
    ///
    /// Returns `None` when another pass claimed it first.
    async fn run_operation(&self, operation: &Operation) -> Result<Option<bool>, SyncError> {
        let id = &operation.id;

        match self.queue.mark_in_progress(id) {
            Ok(()) => {}
            Err(SyncError::InvalidTransition { .. } | SyncError::NotFound(_)) => {
                tracing::debug!(%id, "operation claimed by another pass");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }

        let outcome = match self.resolve_payload(operation).await {
            Ok(payload) => self.execute(operation.operation_type, &payload).await,
            Err(error) => Err(error),
        };

        match outcome {
            Ok(()) => {
                self.queue.mark_completed(id)?;
                tracing::debug!(%id, operation_type = %operation.operation_type, "operation completed");
                Ok(Some(true))
            }
            Err(error) => {
                tracing::warn!(%id, operation_type = %operation.operation_type, %error, "operation failed");
                self.queue.mark_failed(id, &error)?;
                Ok(Some(false))
            }
        }
    }

    /// Payload to execute after conflict handling, or the failure text.
    async fn resolve_payload(&self, operation: &Operation) -> Result<Payload, String> {
        let detector = Arc::clone(&*self.detector.read());

        let detected = AssertUnwindSafe(detector.detect(operation.operation_type, &operation.payload))
            .catch_unwind()
            .await;

        let remote = match detected {
            Ok(Ok(None)) => return Ok(operation.payload.clone()),
            Ok(Ok(Some(remote))) => remote,
            Ok(Err(e)) => return Err(format!("conflict detection failed: {e:#}")),
            Err(panic) => {
                return Err(format!(
                    "conflict detection failed: detector panicked: {}",
                    panic_message(panic.as_ref())
                ))
            }
        };

        let strategy = self.conflict_strategy();
        tracing::info!(id = %operation.id, %strategy, "conflict detected");

        match resolve(strategy, &operation.payload, &remote) {
            Resolution::Execute(payload) => Ok(payload),
            Resolution::Manual => Err("manual resolution required".to_string()),
        }
    }

    async fn execute(&self, operation_type: OperationType, payload: &Payload) -> Result<(), String> {
        let executor = self.handlers.read().get(&operation_type).cloned();
        let Some(executor) = executor else {
            return Err(format!(
                "no handler registered for operation type {operation_type}"
            ));
        };

        match AssertUnwindSafe(executor.execute(payload))
            .catch_unwind()
            .await
        {
            Ok(Ok(true)) => Ok(()),
            Ok(Ok(false)) => Err("handler reported failure".to_string()),
            Ok(Err(e)) => Err(format!("handler error: {e:#}")),
            Err(panic) => Err(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            )),
        }
    }
}

/// Starts a background pass when connectivity comes back.
struct AutoSyncTrigger {
    engine: Weak<SyncEngine>,
}

#[async_trait]
impl ConnectivityCallback for AutoSyncTrigger {
    async fn on_change(&self, old: NetworkStatus, new: NetworkStatus) -> anyhow::Result<()> {
        if old != NetworkStatus::Offline || new != NetworkStatus::Online {
            return Ok(());
        }
        let Some(engine) = self.engine.upgrade() else {
            return Ok(());
        };

        engine.spawn_background();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::features::connectivity::Prober;
    use crate::features::queue::{OperationId, OperationStatus};
    use crate::features::sync::executor::{executor_fn, MockExecutor};

    struct FlagProber(AtomicBool);

    #[async_trait]
    impl Prober for FlagProber {
        async fn probe(&self, _endpoint: &str, _timeout: Duration) -> Result<u16, SyncError> {
            if self.0.load(Ordering::SeqCst) {
                Ok(200)
            } else {
                Err(SyncError::Network("unreachable".to_string()))
            }
        }
    }

    struct Fixture {
        queue: Arc<OperationQueue>,
        monitor: Arc<ConnectivityMonitor>,
        prober: Arc<FlagProber>,
        engine: Arc<SyncEngine>,
    }

    impl Fixture {
        async fn new(online: bool) -> Self {
            let queue = Arc::new(OperationQueue::in_memory().unwrap());
            let prober = Arc::new(FlagProber(AtomicBool::new(online)));
            let monitor = Arc::new(ConnectivityMonitor::new(
                prober.clone(),
                vec!["https://probe.example".to_string()],
            ));
            monitor.update_status().await;
            let engine = Arc::new(SyncEngine::new(Arc::clone(&queue), Arc::clone(&monitor)));
            Self {
                queue,
                monitor,
                prober,
                engine,
            }
        }

        fn enqueue(&self, operation_type: OperationType, value: serde_json::Value) -> OperationId {
            let payload = value.as_object().cloned().unwrap();
            self.queue.enqueue(operation_type, payload, 0).unwrap()
        }

        fn status_of(&self, id: &OperationId) -> Option<OperationStatus> {
            self.queue.get(id).unwrap().map(|op| op.status)
        }
    }

    fn succeeding() -> Arc<dyn Executor> {
        executor_fn(|_| async { Ok(true) })
    }

    struct StaticDetector(Payload);

    #[async_trait]
    impl ConflictDetector for StaticDetector {
        async fn detect(
            &self,
            _operation_type: OperationType,
            _payload: &Payload,
        ) -> anyhow::Result<Option<Payload>> {
            Ok(Some(self.0.clone()))
        }
    }

    struct BrokenDetector;

    #[async_trait]
    impl ConflictDetector for BrokenDetector {
        async fn detect(
            &self,
            _operation_type: OperationType,
            _payload: &Payload,
        ) -> anyhow::Result<Option<Payload>> {
            anyhow::bail!("registry unreachable")
        }
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_successful_pass_drains_queue() {
        let fx = Fixture::new(true).await;
        fx.engine.register_handler(OperationType::ApiCall, succeeding());
        fx.enqueue(OperationType::ApiCall, json!({"url": "https://api.example/runs"}));

        let run = fx.engine.sync(false).await.unwrap();

        assert_eq!(run.status, SyncRunStatus::Completed);
        assert_eq!((run.processed, run.succeeded, run.failed), (1, 1, 0));
        assert_eq!(run.cleaned, 1);
        assert!(fx.queue.get_pending_operations().unwrap().is_empty());
        assert!(!fx.engine.is_syncing());
    }

    #[tokio::test]
    async fn test_missing_handler_fails_and_survives_sweep() {
        let fx = Fixture::new(true).await;
        let id = fx.enqueue(OperationType::ModelPush, json!({"model": "resnet"}));

        let run = fx.engine.sync(false).await.unwrap();
        assert_eq!((run.processed, run.succeeded, run.failed), (1, 0, 1));

        fx.queue.clear_completed().unwrap();
        let op = fx.queue.get(&id).unwrap().unwrap();
        assert_eq!(op.status, OperationStatus::Failed);
        assert_eq!(
            op.last_error.as_deref(),
            Some("no handler registered for operation type model_push")
        );
    }

    #[tokio::test]
    async fn test_offline_pass_touches_nothing() {
        let fx = Fixture::new(false).await;
        let mut executor = MockExecutor::new();
        executor.expect_execute().never();
        fx.engine
            .register_handler(OperationType::ApiCall, Arc::new(executor));
        let id = fx.enqueue(OperationType::ApiCall, json!({}));

        assert_eq!(fx.engine.sync(false).await.unwrap(), SyncRun::offline());
        assert_eq!(fx.engine.sync(true).await.unwrap(), SyncRun::offline());

        let op = fx.queue.get(&id).unwrap().unwrap();
        assert_eq!(op.status, OperationStatus::Pending);
        assert_eq!(op.attempts, 0);
        assert!(!fx.engine.is_syncing());
    }

    #[tokio::test]
    async fn test_failures_are_recorded_with_distinct_errors() {
        let fx = Fixture::new(true).await;
        fx.engine.register_handler(
            OperationType::ApiCall,
            executor_fn(|payload: Payload| async move {
                match payload.get("mode").and_then(serde_json::Value::as_str) {
                    Some("false") => Ok(false),
                    Some("error") => anyhow::bail!("HTTP 502"),
                    Some("panic") => panic!("executor bug"),
                    _ => Ok(true),
                }
            }),
        );

        let reported = fx.enqueue(OperationType::ApiCall, json!({"mode": "false"}));
        let errored = fx.enqueue(OperationType::ApiCall, json!({"mode": "error"}));
        let panicked = fx.enqueue(OperationType::ApiCall, json!({"mode": "panic"}));
        let ok = fx.enqueue(OperationType::ApiCall, json!({"mode": "ok"}));

        let run = fx.engine.sync(false).await.unwrap();
        assert_eq!((run.processed, run.succeeded, run.failed), (4, 1, 3));
        assert_eq!(run.cleaned, 1);
        assert_eq!(fx.status_of(&ok), None);

        let error_of = |id: &OperationId| fx.queue.get(id).unwrap().unwrap().last_error.unwrap();
        assert_eq!(error_of(&reported), "handler reported failure");
        assert_eq!(error_of(&errored), "handler error: HTTP 502");
        assert_eq!(error_of(&panicked), "handler panicked: executor bug");
    }

    #[tokio::test]
    async fn test_completed_sweep_keeps_failed() {
        let fx = Fixture::new(true).await;
        fx.engine.register_handler(OperationType::ApiCall, succeeding());
        fx.enqueue(OperationType::ApiCall, json!({}));
        fx.enqueue(OperationType::ApiCall, json!({}));
        fx.enqueue(OperationType::ArtifactPush, json!({}));

        let run = fx.engine.sync(false).await.unwrap();

        assert_eq!(run.cleaned, run.succeeded);
        assert_eq!(run.cleaned, 2);
        let stats = fx.queue.get_queue_stats().unwrap();
        assert_eq!((stats.total, stats.failed), (1, 1));
    }

    #[tokio::test]
    async fn test_conflict_strategies_shape_executed_payload() {
        let local = json!({"name": "resnet", "version": 2});
        let remote = json!({"name": "resnet-old", "owner": "ml"});

        let cases = [
            (ConflictStrategy::LocalWins, Some(local.clone())),
            (ConflictStrategy::RemoteWins, Some(remote.clone())),
            (
                ConflictStrategy::Merge,
                Some(json!({"name": "resnet", "version": 2, "owner": "ml"})),
            ),
            (ConflictStrategy::Manual, None),
        ];

        for (strategy, expected) in cases {
            let fx = Fixture::new(true).await;
            fx.engine
                .set_conflict_detector(Arc::new(StaticDetector(remote.as_object().cloned().unwrap())));
            fx.engine.set_conflict_strategy(strategy);

            let mut executor = MockExecutor::new();
            match expected {
                Some(expected) => {
                    let expected = expected.as_object().cloned().unwrap();
                    executor
                        .expect_execute()
                        .withf(move |payload| *payload == expected)
                        .times(1)
                        .returning(|_| Ok(true));
                }
                None => {
                    executor.expect_execute().never();
                }
            }
            fx.engine
                .register_handler(OperationType::RegistryWrite, Arc::new(executor));

            let id = fx.enqueue(OperationType::RegistryWrite, local.clone());
            fx.engine.sync(false).await.unwrap();

            if strategy == ConflictStrategy::Manual {
                let op = fx.queue.get(&id).unwrap().unwrap();
                assert_eq!(op.status, OperationStatus::Failed);
                assert_eq!(op.last_error.as_deref(), Some("manual resolution required"));
            } else {
                assert_eq!(fx.status_of(&id), None, "{strategy} should complete");
            }
        }
    }

    #[tokio::test]
    async fn test_detector_error_fails_operation() {
        let fx = Fixture::new(true).await;
        fx.engine.set_conflict_detector(Arc::new(BrokenDetector));
        let mut executor = MockExecutor::new();
        executor.expect_execute().never();
        fx.engine
            .register_handler(OperationType::ApiCall, Arc::new(executor));
        let id = fx.enqueue(OperationType::ApiCall, json!({}));

        let run = fx.engine.sync(false).await.unwrap();

        assert_eq!(run.failed, 1);
        assert_eq!(
            fx.queue.get(&id).unwrap().unwrap().last_error.as_deref(),
            Some("conflict detection failed: registry unreachable")
        );
    }

    #[tokio::test]
    async fn test_concurrent_sync_yields_single_pass() {
        let fx = Fixture::new(true).await;
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        fx.engine.register_handler(
            OperationType::ApiCall,
            executor_fn(move |_| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok(true)
                }
            }),
        );
        let first = fx.enqueue(OperationType::ApiCall, json!({}));
        let second = fx.enqueue(OperationType::ApiCall, json!({}));

        let engine = Arc::clone(&fx.engine);
        let pass = tokio::spawn(async move { engine.sync(false).await });

        wait_until(|| fx.status_of(&first) == Some(OperationStatus::InProgress)).await;
        assert!(fx.engine.is_syncing());

        let rejected = fx.engine.sync(false).await.unwrap();
        assert_eq!(rejected, SyncRun::already_syncing());
        assert_eq!(fx.status_of(&second), Some(OperationStatus::Pending));
        assert_eq!(fx.queue.get(&second).unwrap().unwrap().attempts, 0);

        release.notify_one();
        wait_until(|| fx.status_of(&second) == Some(OperationStatus::InProgress)).await;
        release.notify_one();

        let run = pass.await.unwrap().unwrap();
        assert_eq!((run.processed, run.succeeded), (2, 2));
        assert!(!fx.engine.is_syncing());
    }

    #[tokio::test]
    async fn test_forced_pass_skips_claimed_operations() {
        let fx = Fixture::new(true).await;
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        fx.engine.register_handler(
            OperationType::ApiCall,
            executor_fn(move |payload: Payload| {
                let gate = Arc::clone(&gate);
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if payload.contains_key("block") {
                        gate.notified().await;
                    }
                    Ok(true)
                }
            }),
        );

        let payload = json!({"block": true}).as_object().cloned().unwrap();
        let blocked = fx.queue.enqueue(OperationType::ApiCall, payload, 10).unwrap();
        fx.enqueue(OperationType::ApiCall, json!({}));

        let engine = Arc::clone(&fx.engine);
        let pass = tokio::spawn(async move { engine.sync(false).await });
        wait_until(|| fx.status_of(&blocked) == Some(OperationStatus::InProgress)).await;

        let forced = fx.engine.sync(true).await.unwrap();
        assert_eq!(forced.status, SyncRunStatus::Completed);
        assert_eq!((forced.processed, forced.succeeded), (1, 1));

        release.notify_one();
        let run = pass.await.unwrap().unwrap();
        assert_eq!((run.processed, run.succeeded), (1, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!fx.engine.is_syncing());
    }

    #[tokio::test]
    async fn test_reconnect_triggers_sync() {
        let fx = Fixture::new(false).await;
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        fx.engine.register_handler(
            OperationType::ArtifactPush,
            executor_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(true) }
            }),
        );
        fx.engine.attach(&fx.monitor);
        fx.enqueue(OperationType::ArtifactPush, json!({"path": "a.bin"}));
        fx.enqueue(OperationType::ArtifactPush, json!({"path": "b.bin"}));

        fx.prober.0.store(true, Ordering::SeqCst);
        fx.monitor.update_status().await;

        wait_until(|| {
            calls.load(Ordering::SeqCst) == 2 && fx.queue.get_queue_stats().unwrap().total == 0
        })
        .await;
        wait_until(|| !fx.engine.is_syncing()).await;
    }

    #[tokio::test]
    async fn test_wait_idle_covers_passes_not_yet_started() {
        let fx = Fixture::new(false).await;
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        fx.engine.register_handler(
            OperationType::ApiCall,
            executor_fn(move |_| {
                let flag = Arc::clone(&flag);
                async move {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    flag.store(true, Ordering::SeqCst);
                    Ok(true)
                }
            }),
        );
        fx.engine.attach(&fx.monitor);
        fx.enqueue(OperationType::ApiCall, json!({}));

        fx.prober.0.store(true, Ordering::SeqCst);
        fx.monitor.update_status().await;
        fx.engine.wait_idle().await;

        assert!(finished.load(Ordering::SeqCst));
        assert!(!fx.engine.is_syncing());
        assert_eq!(fx.queue.get_queue_stats().unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_wait_idle_waits_for_manual_pass() {
        let fx = Fixture::new(true).await;
        let gate = Arc::new(Notify::new());
        let release = Arc::clone(&gate);
        fx.engine.register_handler(
            OperationType::ApiCall,
            executor_fn(move |_| {
                let gate = Arc::clone(&gate);
                async move {
                    gate.notified().await;
                    Ok(true)
                }
            }),
        );
        let id = fx.enqueue(OperationType::ApiCall, json!({}));

        let engine = Arc::clone(&fx.engine);
        let pass = tokio::spawn(async move { engine.sync(false).await });
        wait_until(|| fx.status_of(&id) == Some(OperationStatus::InProgress)).await;

        let engine = Arc::clone(&fx.engine);
        let waiter = tokio::spawn(async move { engine.wait_idle().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        release.notify_one();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(pass.await.unwrap().unwrap().ran());
    }

    #[tokio::test]
    async fn test_replacing_handler() {
        let fx = Fixture::new(true).await;
        let mut first = MockExecutor::new();
        first.expect_execute().never();
        fx.engine
            .register_handler(OperationType::ApiCall, Arc::new(first));
        fx.engine.register_handler(OperationType::ApiCall, succeeding());
        assert!(fx.engine.has_handler(OperationType::ApiCall));
        assert!(!fx.engine.has_handler(OperationType::ModelPush));

        fx.enqueue(OperationType::ApiCall, json!({}));
        assert_eq!(fx.engine.sync(false).await.unwrap().succeeded, 1);
    }
}
