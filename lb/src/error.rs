//! Orchestrator error taxonomy

use coordstore::StoreError;
use thiserror::Error;

/// Errors surfaced by the request, queue, state and snapshot components
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request {0} already exists")]
    AlreadyQueued(String),

    #[error("Invalid request {id}: {reason}")]
    InvalidRequest { id: String, reason: String },

    #[error("Malformed queue entry: {0}")]
    InvalidQueueEntry(String),

    #[error("Malformed upstream {name}: {reason}")]
    InvalidUpstream { name: String, reason: String },

    #[error("Transaction aborted: {0}")]
    TransactionAborted(#[source] StoreError),

    #[error("Coordination store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),

    #[error("Corrupt stored value: {0}")]
    Serialization(#[source] StoreError),

    #[error("Store error: {0}")]
    Store(#[source] StoreError),

    #[error("Failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Fetch task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Fetch pool closed")]
    FetchPoolClosed,
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        if err.is_unavailable() {
            return Self::StoreUnavailable(err);
        }
        match err {
            StoreError::TransactionAborted { .. } => Self::TransactionAborted(err),
            StoreError::Serialization { .. } => Self::Serialization(err),
            other => Self::Store(other),
        }
    }
}

impl OrchestratorError {
    /// Connectivity or timeout trouble; the caller's retry policy applies
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_mapping() {
        let aborted = StoreError::TransactionAborted {
            index: 1,
            op: "delete /state/a".to_string(),
            source: Box::new(StoreError::NodeMissing("/state/a".to_string())),
        };
        assert!(matches!(OrchestratorError::from(aborted), OrchestratorError::TransactionAborted(_)));

        let unavailable = StoreError::Unavailable("lock poisoned".to_string());
        assert!(OrchestratorError::from(unavailable).is_unavailable());

        let missing = StoreError::NodeMissing("/request/r1".to_string());
        assert!(matches!(OrchestratorError::from(missing), OrchestratorError::Store(_)));
    }
}
