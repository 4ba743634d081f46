//! Snapshot entries and the state version token

use serde::{Deserialize, Serialize};

use super::request::ServiceDefinition;
use super::upstream::UpstreamInfo;

/// One service and its upstreams as seen by agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceState {
    pub service: ServiceDefinition,
    pub upstreams: Vec<UpstreamInfo>,
}

/// Opaque change-detection token
///
/// Only comparison is meaningful: a greater token means state changed since
/// the lesser one was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateVersion(i64);

impl StateVersion {
    pub(crate) fn from_revision(revision: i64) -> Self {
        Self(revision)
    }
}

impl std::fmt::Display for StateVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
