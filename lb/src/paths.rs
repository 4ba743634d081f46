//! Coordination-store path layout
//!
//! ```text
//! /request/{requestId}            request body
//! /request/{requestId}/status     lifecycle state
//! /request/{requestId}/message    optional human-readable message
//! /queue/{serviceId}|{requestId}|{seq}
//! /state/{serviceId}              service definition
//! /state/{serviceId}/{upstream}   content-free upstream markers
//! /state-last-updated             version marker
//! ```
//!
//! These names are shared with every other process reading the store and
//! must not change.

use coordstore::path;

pub const REQUESTS: &str = "/request";
pub const QUEUE: &str = "/queue";
pub const SERVICES: &str = "/state";
pub const STATE_VERSION: &str = "/state-last-updated";

const STATUS: &str = "status";
const MESSAGE: &str = "message";

pub fn request(request_id: &str) -> String {
    path::join(REQUESTS, request_id)
}

pub fn request_status(request_id: &str) -> String {
    path::join(&request(request_id), STATUS)
}

pub fn request_message(request_id: &str) -> String {
    path::join(&request(request_id), MESSAGE)
}

/// Prefix handed to a sequential create; the store appends the sequence
pub fn queue_prefix(service_id: &str, request_id: &str) -> String {
    path::join(QUEUE, &format!("{}|{}|", service_id, request_id))
}

pub fn queue_item(node_name: &str) -> String {
    path::join(QUEUE, node_name)
}

pub fn service(service_id: &str) -> String {
    path::join(SERVICES, service_id)
}

pub fn upstream(service_id: &str, node_name: &str) -> String {
    path::join(&service(service_id), node_name)
}
