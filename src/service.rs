//! Composition root.
//!
//! [`SyncService`] owns the queue, the connectivity monitor and the sync
//! engine, and wires them together. Host applications construct one and pass
//! it around instead of reaching for globals.

use std::sync::Arc;

use crate::config::{Config, Paths};
use crate::error::SyncError;
use crate::executors::HttpCallExecutor;
use crate::features::connectivity::{ConnectivityMonitor, ConnectivityState, HttpProber};
use crate::features::queue::{OperationId, OperationQueue, OperationType, Payload, QueueStats};
use crate::features::sync::{ConflictStrategy, Executor, SyncEngine, SyncRun};

/// Queue, monitor and engine, wired for automatic sync.
#[derive(Debug, Clone)]
pub struct SyncService {
    queue: Arc<OperationQueue>,
    monitor: Arc<ConnectivityMonitor>,
    engine: Arc<SyncEngine>,
}

impl SyncService {
    /// Open the on-disk queue and build the service from configuration.
    ///
    /// Operations left in progress by a previous process are returned to
    /// pending so the next pass attempts them again.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory or database cannot be opened,
    /// or an HTTP client cannot be built.
    pub fn open(config: &Config, paths: &Paths) -> Result<Self, SyncError> {
        paths.ensure_dirs()?;

        let queue = Arc::new(OperationQueue::open(&paths.database)?);
        queue.recover_in_progress()?;

        let prober = Arc::new(HttpProber::new()?);
        let monitor = Arc::new(ConnectivityMonitor::from_config(prober, &config.monitor));

        let service = Self::from_parts(queue, monitor);
        service.set_conflict_strategy(config.sync.conflict_strategy);
        if config.sync.register_http_executor {
            service.register_handler(OperationType::ApiCall, Arc::new(HttpCallExecutor::new()?));
        }

        Ok(service)
    }

    /// Build a service from existing components and attach automatic sync.
    #[must_use]
    pub fn from_parts(queue: Arc<OperationQueue>, monitor: Arc<ConnectivityMonitor>) -> Self {
        let engine = Arc::new(SyncEngine::new(Arc::clone(&queue), Arc::clone(&monitor)));
        engine.attach(&monitor);

        Self {
            queue,
            monitor,
            engine,
        }
    }

    #[must_use]
    pub const fn queue(&self) -> &Arc<OperationQueue> {
        &self.queue
    }

    #[must_use]
    pub const fn monitor(&self) -> &Arc<ConnectivityMonitor> {
        &self.monitor
    }

    #[must_use]
    pub const fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Queue an operation for the next sync pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation cannot be persisted.
    pub fn enqueue(
        &self,
        operation_type: OperationType,
        payload: Payload,
        priority: i32,
    ) -> Result<OperationId, SyncError> {
        self.queue.enqueue(operation_type, payload, priority)
    }

    /// # Errors
    ///
    /// Returns an error if the queue cannot be read.
    pub fn stats(&self) -> Result<QueueStats, SyncError> {
        self.queue.get_queue_stats()
    }

    pub fn register_handler(&self, operation_type: OperationType, executor: Arc<dyn Executor>) {
        self.engine.register_handler(operation_type, executor);
    }

    pub fn set_conflict_strategy(&self, strategy: ConflictStrategy) {
        self.engine.set_conflict_strategy(strategy);
    }

    /// Probe once and return the resulting state.
    pub async fn check_connectivity(&self) -> ConnectivityState {
        self.monitor.update_status().await
    }

    /// Run one sync pass against the current connectivity state.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read or updated.
    pub async fn sync(&self, force: bool) -> Result<SyncRun, SyncError> {
        self.engine.sync(force).await
    }

    /// Start periodic connectivity monitoring.
    pub fn start(&self) {
        self.monitor.start_monitoring();
    }

    /// Stop monitoring, wait for running and automatically started passes to
    /// finish, and close the queue.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be closed cleanly.
    pub async fn shutdown(&self) -> Result<(), SyncError> {
        self.monitor.stop_monitoring().await;
        self.engine.wait_idle().await;
        self.queue.close()
    }
}
