//! Queue entry identifiers

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};

/// A queued request: `{serviceId}|{requestId}|{sequence}`
///
/// The sequence is minted by the store when the entry is created and
/// alone decides processing order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRequestId {
    pub service_id: String,
    pub request_id: String,
    pub sequence: u64,
}

impl QueuedRequestId {
    /// Parse a queue node name
    pub fn parse(node_name: &str) -> OrchestratorResult<Self> {
        let invalid = || OrchestratorError::InvalidQueueEntry(node_name.to_string());

        let mut parts = node_name.splitn(3, '|');
        let (Some(service_id), Some(request_id), Some(sequence)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(invalid());
        };
        if service_id.is_empty() || request_id.is_empty() {
            return Err(invalid());
        }
        if sequence.is_empty() || !sequence.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let sequence = sequence.parse().map_err(|_| invalid())?;

        Ok(Self {
            service_id: service_id.to_string(),
            request_id: request_id.to_string(),
            sequence,
        })
    }

    /// Node name under the queue root
    pub fn node_name(&self) -> String {
        format!(
            "{}|{}|{:0width$}",
            self.service_id,
            self.request_id,
            self.sequence,
            width = coordstore::SEQUENCE_WIDTH
        )
    }
}

impl Ord for QueuedRequestId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sequence
            .cmp(&other.sequence)
            .then_with(|| self.service_id.cmp(&other.service_id))
            .then_with(|| self.request_id.cmp(&other.request_id))
    }
}

impl PartialOrd for QueuedRequestId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for QueuedRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.node_name())
    }
}
