//! Durable, sequence-ordered request queue

use std::time::Duration;

use chrono::{DateTime, Utc};
use coordstore::{CoordinationStore, StoreError, path};
use tracing::{debug, info, warn};

use crate::domain::{QueuedRequestId, Request, RequestLifecycleState};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::paths;

/// Pending work under `/queue`, one sequential node per request
#[derive(Debug, Clone)]
pub struct RequestQueue {
    store: CoordinationStore,
}

impl RequestQueue {
    pub fn new(store: CoordinationStore) -> Self {
        Self { store }
    }

    /// Persist a request, its initial state and its queue entry in one transaction
    ///
    /// A request id that already exists is rejected with `AlreadyQueued`;
    /// the earlier submission is left as it was.
    pub fn enqueue(&self, request: &Request, initial_state: RequestLifecycleState) -> OrchestratorResult<QueuedRequestId> {
        debug!(request_id = %request.id, service_id = %request.service_id(), "enqueue: called");
        request.validate()?;

        self.store.create_if_absent(paths::REQUESTS)?;
        self.store.create_if_absent(paths::QUEUE)?;

        let body_path = paths::request(&request.id);
        let prefix = paths::queue_prefix(request.service_id(), &request.id);

        let mut txn = self.store.transaction();
        txn.create_json(body_path.clone(), request)?
            .create_json(paths::request_status(&request.id), &initial_state)?
            .create_sequential(prefix.clone(), Vec::new());

        let result = self.store.commit(txn).map_err(|err| {
            if matches!(err.root_cause(), StoreError::NodeAlreadyExists(p) if *p == body_path) {
                OrchestratorError::AlreadyQueued(request.id.clone())
            } else {
                err.into()
            }
        })?;

        let minted = result
            .created_path(&prefix)
            .ok_or_else(|| OrchestratorError::InvalidQueueEntry(prefix.clone()))?;
        let queued = QueuedRequestId::parse(path::name(minted))?;
        info!(request_id = %request.id, sequence = queued.sequence, "Enqueued request");
        Ok(queued)
    }

    /// Queued entries, oldest (lowest sequence) first
    pub fn list_queued(&self) -> OrchestratorResult<Vec<QueuedRequestId>> {
        debug!("list_queued: called");
        let mut queued = self
            .store
            .children(paths::QUEUE)?
            .iter()
            .map(|name| QueuedRequestId::parse(name))
            .collect::<OrchestratorResult<Vec<_>>>()?;
        queued.sort();
        Ok(queued)
    }

    pub fn size(&self) -> OrchestratorResult<usize> {
        Ok(self.store.children(paths::QUEUE)?.len())
    }

    /// Age of the oldest entry; zero when the queue is empty
    ///
    /// Entries that vanish or fail to stat mid-scan are skipped.
    pub fn oldest_age(&self) -> OrchestratorResult<Duration> {
        debug!("oldest_age: called");
        let oldest = self
            .store
            .children(paths::QUEUE)?
            .iter()
            .filter_map(|name| match self.store.mtime(&paths::queue_item(name)) {
                Ok(Some(mtime)) => Some(mtime),
                Ok(None) => {
                    debug!(entry = %name, "oldest_age: entry vanished during scan");
                    None
                }
                Err(e) => {
                    warn!(entry = %name, error = %e, "Skipping queue entry in age scan");
                    None
                }
            })
            .min();

        Ok(oldest.map(age_since).unwrap_or_default())
    }

    /// Retire one entry; the request body and status stay queryable
    pub fn remove(&self, queued: &QueuedRequestId) -> OrchestratorResult<bool> {
        debug!(entry = %queued, "remove: called");
        Ok(self.store.delete(&paths::queue_item(&queued.node_name()), false)?)
    }
}

fn age_since(then: DateTime<Utc>) -> Duration {
    (Utc::now() - then).to_std().unwrap_or_default()
}
