//! Request bodies and their lifecycle state/message

use chrono::{DateTime, Utc};
use coordstore::{CoordinationStore, StoreError};
use tracing::{debug, info};

use crate::domain::{Request, RequestLifecycleState, RequestResponse};
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::paths;

/// CRUD over `/request/{id}` and its `status`/`message` children
///
/// Every call is an independent single-path operation. Creation happens
/// only through [`crate::RequestQueue::enqueue`].
#[derive(Debug, Clone)]
pub struct RequestRecordStore {
    store: CoordinationStore,
}

/// Turn a missing request node into `NotFound`
fn missing_request(request_id: &str) -> impl FnOnce(StoreError) -> OrchestratorError + '_ {
    move |err| {
        if matches!(err.root_cause(), StoreError::NodeMissing(path) if *path == paths::request(request_id)) {
            OrchestratorError::NotFound(format!("request {}", request_id))
        } else {
            err.into()
        }
    }
}

impl RequestRecordStore {
    pub fn new(store: CoordinationStore) -> Self {
        Self { store }
    }

    pub fn get(&self, request_id: &str) -> OrchestratorResult<Option<Request>> {
        debug!(%request_id, "get: called");
        Ok(self.store.read(&paths::request(request_id))?)
    }

    /// True while the request body exists
    pub fn exists(&self, request_id: &str) -> OrchestratorResult<bool> {
        Ok(self.store.exists(&paths::request(request_id))?)
    }

    /// Delete a request with its status and message; returns what was stored
    ///
    /// Deleting an absent request is not an error.
    pub fn delete(&self, request_id: &str) -> OrchestratorResult<Option<Request>> {
        debug!(%request_id, "delete: called");
        let previous = self.get(request_id)?;
        if self.store.delete(&paths::request(request_id), true)? {
            info!(%request_id, "Deleted request");
        }
        Ok(previous)
    }

    /// Overwrite an existing request body; returns the previous body
    pub fn update(&self, request: &Request) -> OrchestratorResult<Request> {
        debug!(request_id = %request.id, "update: called");
        let previous = self
            .get(&request.id)?
            .ok_or_else(|| OrchestratorError::NotFound(format!("request {}", request.id)))?;

        let mut txn = self.store.transaction();
        txn.set_json(paths::request(&request.id), request)?;
        self.store.commit(txn).map_err(missing_request(&request.id))?;
        Ok(previous)
    }

    pub fn list_ids(&self) -> OrchestratorResult<Vec<String>> {
        Ok(self.store.children(paths::REQUESTS)?)
    }

    pub fn get_state(&self, request_id: &str) -> OrchestratorResult<Option<RequestLifecycleState>> {
        Ok(self.store.read(&paths::request_status(request_id))?)
    }

    pub fn set_state(&self, request_id: &str, state: RequestLifecycleState) -> OrchestratorResult<()> {
        debug!(%request_id, %state, "set_state: called");
        self.store
            .upsert(&paths::request_status(request_id), &state)
            .map_err(missing_request(request_id))
    }

    pub fn get_message(&self, request_id: &str) -> OrchestratorResult<Option<String>> {
        Ok(self.store.read(&paths::request_message(request_id))?)
    }

    pub fn set_message(&self, request_id: &str, message: &str) -> OrchestratorResult<()> {
        debug!(%request_id, "set_message: called");
        self.store
            .upsert(&paths::request_message(request_id), message)
            .map_err(missing_request(request_id))
    }

    /// When the status node last changed
    pub fn get_updated_at(&self, request_id: &str) -> OrchestratorResult<Option<DateTime<Utc>>> {
        Ok(self.store.mtime(&paths::request_status(request_id))?)
    }

    /// Body, state and message in one client-facing value
    pub fn response(&self, request_id: &str) -> OrchestratorResult<RequestResponse> {
        let Some(request) = self.get(request_id)? else {
            return Ok(RequestResponse::request_does_not_exist(request_id));
        };
        let state = self.get_state(request_id)?.unwrap_or(RequestLifecycleState::Pending);
        let message = self.get_message(request_id)?;
        Ok(RequestResponse::new(request, state, message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ServiceDefinition, UpstreamInfo};
    use crate::store::RequestQueue;

    fn setup() -> (RequestQueue, RequestRecordStore) {
        let store = CoordinationStore::in_memory();
        (RequestQueue::new(store.clone()), RequestRecordStore::new(store))
    }

    fn request(id: &str) -> Request {
        Request::replace(id, ServiceDefinition::new("svc-a"), vec![UpstreamInfo::new("10.0.0.1", 80, "web")])
    }

    #[test]
    fn test_state_and_message() {
        let (queue, records) = setup();
        queue.enqueue(&request("r1"), RequestLifecycleState::Pending).unwrap();

        assert_eq!(records.get_state("r1").unwrap(), Some(RequestLifecycleState::Pending));
        assert_eq!(records.get_message("r1").unwrap(), None);

        records.set_state("r1", RequestLifecycleState::Failed).unwrap();
        records.set_message("r1", "upstream rejected").unwrap();

        assert_eq!(records.get_state("r1").unwrap(), Some(RequestLifecycleState::Failed));
        assert_eq!(records.get_message("r1").unwrap().as_deref(), Some("upstream rejected"));
        assert!(records.get_updated_at("r1").unwrap().is_some());

        let response = records.response("r1").unwrap();
        assert_eq!(response.load_balancer_state, RequestLifecycleState::Failed);
        assert_eq!(response.request.map(|r| r.id), Some("r1".to_string()));
    }

    #[test]
    fn test_state_on_missing_request_is_not_found() {
        let (_, records) = setup();
        let err = records.set_state("ghost", RequestLifecycleState::Success).unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));
        assert!(!records.exists("ghost").unwrap());
    }

    #[test]
    fn test_update_requires_existing_request() {
        let (queue, records) = setup();
        let err = records.update(&request("r1")).unwrap_err();
        assert!(matches!(err, OrchestratorError::NotFound(_)));

        queue.enqueue(&request("r1"), RequestLifecycleState::Pending).unwrap();
        let mut changed = request("r1");
        changed.upstream_update_only = true;
        let previous = records.update(&changed).unwrap();
        assert!(!previous.upstream_update_only);
        assert!(records.get("r1").unwrap().unwrap().upstream_update_only);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (queue, records) = setup();
        queue.enqueue(&request("r1"), RequestLifecycleState::Pending).unwrap();
        records.set_message("r1", "hello").unwrap();

        let removed = records.delete("r1").unwrap();
        assert_eq!(removed.map(|r| r.id), Some("r1".to_string()));
        assert_eq!(records.get("r1").unwrap(), None);
        assert_eq!(records.get_state("r1").unwrap(), None);

        assert_eq!(records.delete("r1").unwrap(), None);
        assert_eq!(
            records.response("r1").unwrap().load_balancer_state,
            RequestLifecycleState::Canceled
        );
    }

    #[test]
    fn test_list_ids() {
        let (queue, records) = setup();
        assert!(records.list_ids().unwrap().is_empty());
        queue.enqueue(&request("r2"), RequestLifecycleState::Pending).unwrap();
        queue.enqueue(&request("r1"), RequestLifecycleState::Pending).unwrap();
        assert_eq!(records.list_ids().unwrap(), vec!["r1", "r2"]);
    }
}
