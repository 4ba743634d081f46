//! Queue worker: drains pending requests in sequence order
//!
//! Each pass takes up to `max-batch-size` entries from the front of the
//! queue, applies them through [`ServiceStateStore::update_service`], records
//! the outcome on the request and retires the entry. Store outages abort the
//! pass and leave the remaining entries queued for the next one.

use std::sync::Arc;

use coordstore::CoordinationStore;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::WorkerConfig;
use crate::domain::{QueuedRequestId, RequestLifecycleState, service_not_found_message};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::store::{RequestQueue, RequestRecordStore, ServiceStateStore};

/// Counters for one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerPassStats {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub invalid: usize,
    pub canceled: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Succeeded,
    Failed,
    Invalid,
    Canceled,
}

impl WorkerPassStats {
    fn record(&mut self, outcome: ItemOutcome) {
        self.processed += 1;
        match outcome {
            ItemOutcome::Succeeded => self.succeeded += 1,
            ItemOutcome::Failed => self.failed += 1,
            ItemOutcome::Invalid => self.invalid += 1,
            ItemOutcome::Canceled => self.canceled += 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Worker {
    config: WorkerConfig,
    queue: RequestQueue,
    requests: RequestRecordStore,
    services: ServiceStateStore,
}

impl Worker {
    pub fn new(store: CoordinationStore, config: WorkerConfig) -> Self {
        Self {
            config,
            queue: RequestQueue::new(store.clone()),
            requests: RequestRecordStore::new(store.clone()),
            services: ServiceStateStore::new(store),
        }
    }

    /// Process one batch from the front of the queue
    pub fn run_once(&self) -> OrchestratorResult<WorkerPassStats> {
        debug!("run_once: called");
        let mut stats = WorkerPassStats::default();

        for queued in self.queue.list_queued()?.into_iter().take(self.config.max_batch_size) {
            let outcome = match self.process(&queued) {
                Ok(outcome) => outcome,
                Err(OrchestratorError::NotFound(what)) => {
                    warn!(entry = %queued, %what, "Request disappeared while processing");
                    ItemOutcome::Canceled
                }
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    error!(entry = %queued, error = %e, "Failed to process queue entry");
                    self.record_failure(&queued.request_id, &e.to_string());
                    ItemOutcome::Failed
                }
            };
            self.queue.remove(&queued)?;
            stats.record(outcome);
        }

        if stats.processed > 0 {
            info!(
                processed = stats.processed,
                succeeded = stats.succeeded,
                failed = stats.failed,
                invalid = stats.invalid,
                canceled = stats.canceled,
                "Worker pass complete"
            );
        }
        Ok(stats)
    }

    fn process(&self, queued: &QueuedRequestId) -> OrchestratorResult<ItemOutcome> {
        debug!(entry = %queued, "process: called");
        let request_id = &queued.request_id;
        let Some(request) = self.requests.get(request_id)? else {
            warn!(%request_id, "Queued request no longer exists");
            return Ok(ItemOutcome::Canceled);
        };

        if request.is_removal_only() && !self.services.service_exists(request.service_id())? {
            self.requests.set_state(request_id, RequestLifecycleState::InvalidRequestNoop)?;
            self.requests
                .set_message(request_id, &service_not_found_message(request.service_id()))?;
            info!(%request_id, service_id = %request.service_id(), "Rejected request for unknown service");
            return Ok(ItemOutcome::Invalid);
        }

        match self.services.update_service(&request) {
            Ok(outcome) => {
                self.requests.set_state(request_id, RequestLifecycleState::Success)?;
                self.requests.set_message(
                    request_id,
                    &format!(
                        "Applied: {} upstreams added, {} removed",
                        outcome.created.len(),
                        outcome.deleted.len()
                    ),
                )?;
                Ok(ItemOutcome::Succeeded)
            }
            Err(e) if e.is_unavailable() => Err(e),
            Err(e) => {
                warn!(%request_id, error = %e, "Request failed");
                self.requests.set_state(request_id, RequestLifecycleState::Failed)?;
                self.requests.set_message(request_id, &e.to_string())?;
                Ok(ItemOutcome::Failed)
            }
        }
    }

    /// Best effort: the entry is retired whether or not this lands
    fn record_failure(&self, request_id: &str, message: &str) {
        let result = self
            .requests
            .set_state(request_id, RequestLifecycleState::Failed)
            .and_then(|_| self.requests.set_message(request_id, message));
        if let Err(e) = result {
            warn!(%request_id, error = %e, "Could not record failure on request");
        }
    }

    /// Poll until `shutdown_rx` fires
    ///
    /// Pass errors are logged and retried on the next tick.
    pub async fn run(self, mut shutdown_rx: mpsc::Receiver<()>) -> OrchestratorResult<()> {
        debug!("run: called");
        if !self.config.enabled {
            info!("Worker disabled, not polling");
            return Ok(());
        }

        tokio::select! {
            _ = tokio::time::sleep(self.config.initial_delay()) => {}
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received before first pass");
                return Ok(());
            }
        }

        info!(interval_ms = self.config.interval_ms, batch = self.config.max_batch_size, "Worker starting");
        let mut interval = tokio::time::interval(self.config.interval());
        let worker = Arc::new(self);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let pass = Arc::clone(&worker);
                    match tokio::task::spawn_blocking(move || pass.run_once()).await? {
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "Worker pass failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        debug!("run: complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Request, ServiceDefinition, UpstreamInfo};
    use std::time::Duration;

    fn setup(max_batch_size: usize) -> (CoordinationStore, Worker) {
        let store = CoordinationStore::in_memory();
        let config = WorkerConfig {
            max_batch_size,
            interval_ms: 10,
            ..WorkerConfig::default()
        };
        (store.clone(), Worker::new(store, config))
    }

    fn replace(id: &str, service: &str) -> Request {
        Request::replace(id, ServiceDefinition::new(service), vec![UpstreamInfo::new("10.0.0.1", 80, "web")])
    }

    #[test]
    fn test_pass_applies_and_retires() {
        let (store, worker) = setup(10);
        let queue = RequestQueue::new(store.clone());
        let requests = RequestRecordStore::new(store.clone());
        queue.enqueue(&replace("r1", "svc-a"), RequestLifecycleState::Pending).unwrap();

        let stats = worker.run_once().unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.succeeded, 1);
        assert_eq!(queue.size().unwrap(), 0);
        assert_eq!(requests.get_state("r1").unwrap(), Some(RequestLifecycleState::Success));
    }

    #[test]
    fn test_batch_size_limits_pass() {
        let (store, worker) = setup(2);
        let queue = RequestQueue::new(store);
        for i in 0..5 {
            queue
                .enqueue(&replace(&format!("r{}", i), "svc-a"), RequestLifecycleState::Pending)
                .unwrap();
        }

        assert_eq!(worker.run_once().unwrap().processed, 2);
        let remaining: Vec<String> = queue.list_queued().unwrap().into_iter().map(|q| q.request_id).collect();
        assert_eq!(remaining, vec!["r2", "r3", "r4"]);
    }

    #[test]
    fn test_removal_for_unknown_service_is_noop() {
        let (store, worker) = setup(10);
        let queue = RequestQueue::new(store.clone());
        let requests = RequestRecordStore::new(store.clone());
        let request = Request::new("r1", ServiceDefinition::new("ghost"), vec![], vec![UpstreamInfo::new("h", 1, "web")]);
        queue.enqueue(&request, RequestLifecycleState::Pending).unwrap();

        let stats = worker.run_once().unwrap();
        assert_eq!(stats.invalid, 1);
        assert_eq!(
            requests.get_state("r1").unwrap(),
            Some(RequestLifecycleState::InvalidRequestNoop)
        );
        assert_eq!(requests.get_message("r1").unwrap().as_deref(), Some("Service ghost not found"));
        assert!(!ServiceStateStore::new(store).service_exists("ghost").unwrap());
    }

    #[test]
    fn test_deleted_request_counts_as_canceled() {
        let (store, worker) = setup(10);
        let queue = RequestQueue::new(store.clone());
        queue.enqueue(&replace("r1", "svc-a"), RequestLifecycleState::Pending).unwrap();
        RequestRecordStore::new(store).delete("r1").unwrap();

        let stats = worker.run_once().unwrap();
        assert_eq!(stats.canceled, 1);
        assert_eq!(queue.size().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let (store, worker) = setup(10);
        let queue = RequestQueue::new(store);
        queue.enqueue(&replace("r1", "svc-a"), RequestLifecycleState::Pending).unwrap();

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(worker.run(shutdown_rx));

        for _ in 0..100 {
            if queue.size().unwrap() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.size().unwrap(), 0);

        shutdown_tx.send(()).await.unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_disabled_worker_returns_immediately() {
        let store = CoordinationStore::in_memory();
        let config = WorkerConfig {
            enabled: false,
            ..WorkerConfig::default()
        };
        let (_shutdown_tx, shutdown_rx) = mpsc::channel(1);
        Worker::new(store, config).run(shutdown_rx).await.unwrap();
    }
}
