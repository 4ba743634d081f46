//! Domain types shared by the stores, the aggregator and the worker

mod lifecycle;
mod queued;
mod request;
mod response;
mod snapshot;
mod upstream;

pub use lifecycle::RequestLifecycleState;
pub use queued::QueuedRequestId;
pub use request::{Request, ServiceDefinition, UpstreamDiff, generate_request_id};
pub use response::RequestResponse;
pub(crate) use response::service_not_found_message;
pub use snapshot::{ServiceState, StateVersion};
pub use upstream::{DEFAULT_GROUP, UpstreamInfo, UpstreamKey};
