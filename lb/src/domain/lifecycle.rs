//! Request lifecycle states

use serde::{Deserialize, Serialize};

/// Where a request stands in the processing pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestLifecycleState {
    /// Queued, not yet applied
    Pending,
    Success,
    Failed,
    /// The request no longer exists
    Canceled,
    /// Rejected without being applied
    InvalidRequestNoop,
}

impl RequestLifecycleState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl std::fmt::Display for RequestLifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Canceled => "CANCELED",
            Self::InvalidRequestNoop => "INVALID_REQUEST_NOOP",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_names_match_display() {
        for state in [
            RequestLifecycleState::Pending,
            RequestLifecycleState::Success,
            RequestLifecycleState::Failed,
            RequestLifecycleState::Canceled,
            RequestLifecycleState::InvalidRequestNoop,
        ] {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state));
        }
    }

    #[test]
    fn test_only_pending_is_open() {
        assert!(!RequestLifecycleState::Pending.is_terminal());
        assert!(RequestLifecycleState::Success.is_terminal());
        assert!(RequestLifecycleState::InvalidRequestNoop.is_terminal());
    }
}
