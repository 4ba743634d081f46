//! Client-facing view of a request's progress

use serde::{Deserialize, Serialize};

use super::lifecycle::RequestLifecycleState;
use super::request::Request;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestResponse {
    pub load_balancer_request_id: String,
    pub load_balancer_state: RequestLifecycleState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Request>,
}

impl RequestResponse {
    pub fn new(request: Request, state: RequestLifecycleState, message: Option<String>) -> Self {
        Self {
            load_balancer_request_id: request.id.clone(),
            load_balancer_state: state,
            message,
            request: Some(request),
        }
    }

    pub fn failure(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            load_balancer_request_id: request_id.into(),
            load_balancer_state: RequestLifecycleState::Failed,
            message: Some(message.into()),
            request: None,
        }
    }

    pub fn request_does_not_exist(request_id: impl Into<String>) -> Self {
        let request_id = request_id.into();
        Self {
            message: Some(format!("Request {} does not exist", request_id)),
            load_balancer_request_id: request_id,
            load_balancer_state: RequestLifecycleState::Canceled,
            request: None,
        }
    }

    pub fn service_not_found(request_id: impl Into<String>, service_id: &str) -> Self {
        Self {
            load_balancer_request_id: request_id.into(),
            load_balancer_state: RequestLifecycleState::InvalidRequestNoop,
            message: Some(service_not_found_message(service_id)),
            request: None,
        }
    }
}

pub(crate) fn service_not_found_message(service_id: &str) -> String {
    format!("Service {} not found", service_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let gone = RequestResponse::request_does_not_exist("r1");
        assert_eq!(gone.load_balancer_state, RequestLifecycleState::Canceled);
        assert_eq!(gone.message.as_deref(), Some("Request r1 does not exist"));

        let noop = RequestResponse::service_not_found("r2", "svc-a");
        assert_eq!(noop.load_balancer_state, RequestLifecycleState::InvalidRequestNoop);
        assert_eq!(noop.message.as_deref(), Some("Service svc-a not found"));

        let failed = RequestResponse::failure("r3", "boom");
        assert_eq!(failed.load_balancer_state, RequestLifecycleState::Failed);
        assert!(failed.request.is_none());
    }
}
