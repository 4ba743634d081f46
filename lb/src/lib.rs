//! lborch - load-balancer configuration orchestrator
//!
//! Accepts requests to change which upstreams serve a service, persists them
//! in a coordination store, and exposes the resulting global state to the
//! agents that render load-balancer config.
//!
//! # Architecture
//!
//! ```text
//! RequestQueue::enqueue ──► /request/{id}, /request/{id}/status, /queue/{svc}|{id}|{seq}
//!                                      (one transaction)
//! Worker::run_once ──► ServiceStateStore::update_service ──► /state/{svc}/{upstream}
//!                  └─► RequestRecordStore::set_state            /state-last-updated
//! GlobalStateAggregator::compute_snapshot ◄── parallel reads of /state
//! ```

pub mod aggregate;
pub mod cli;
pub mod config;
pub mod domain;
mod error;
pub mod paths;
pub mod store;
pub mod worker;

pub use coordstore::CoordinationStore;

pub use aggregate::{GlobalStateAggregator, ParallelFetcher};
pub use domain::{
    QueuedRequestId, Request, RequestLifecycleState, RequestResponse, ServiceDefinition, ServiceState,
    StateVersion, UpstreamDiff, UpstreamInfo, UpstreamKey, generate_request_id,
};
pub use error::{OrchestratorError, OrchestratorResult};
pub use store::{RequestQueue, RequestRecordStore, ServiceStateStore, UpdateOutcome};
pub use worker::{Worker, WorkerPassStats};
