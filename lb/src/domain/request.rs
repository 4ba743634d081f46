//! Requests and the service definitions they target

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::upstream::UpstreamInfo;
use crate::error::{OrchestratorError, OrchestratorResult};

/// Generate a fresh, time-ordered request id
pub fn generate_request_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Reject ids that cannot be embedded in node names
fn check_id(kind: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} must not be empty", kind));
    }
    if value.contains(['/', '|']) {
        return Err(format!("{} '{}' must not contain '/' or '|'", kind, value));
    }
    Ok(())
}

/// A logical service and its load-balancer routing metadata
///
/// Everything but `service_id` is opaque here; equality is structural.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDefinition {
    pub service_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_base_path: Option<String>,

    #[serde(default)]
    pub owners: Vec<String>,

    #[serde(default)]
    pub load_balancer_groups: BTreeSet<String>,

    #[serde(default)]
    pub options: BTreeMap<String, serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
}

impl ServiceDefinition {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            ..Self::default()
        }
    }

    pub fn with_base_path(mut self, base_path: impl Into<String>) -> Self {
        self.service_base_path = Some(base_path.into());
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.load_balancer_groups.insert(group.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owners.push(owner.into());
        self
    }
}

/// How a request changes a service's upstream set
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UpstreamDiff<'a> {
    /// Full replacement set
    Replace(&'a [UpstreamInfo]),
    /// Paired add/remove sets applied to the current set
    Incremental {
        add: &'a [UpstreamInfo],
        remove: &'a [UpstreamInfo],
    },
}

/// A request to change the upstreams (and possibly the definition) of a service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    #[serde(rename = "loadBalancerRequestId")]
    pub id: String,

    #[serde(rename = "loadBalancerService")]
    pub service: ServiceDefinition,

    #[serde(default)]
    pub add_upstreams: Vec<UpstreamInfo>,

    #[serde(default)]
    pub remove_upstreams: Vec<UpstreamInfo>,

    #[serde(default)]
    pub replace_upstreams: Vec<UpstreamInfo>,

    /// Only touch upstreams; never rewrite the stored definition
    #[serde(default)]
    pub upstream_update_only: bool,
}

impl Request {
    /// Incremental request
    pub fn new(
        id: impl Into<String>,
        service: ServiceDefinition,
        add: Vec<UpstreamInfo>,
        remove: Vec<UpstreamInfo>,
    ) -> Self {
        Self {
            id: id.into(),
            service,
            add_upstreams: add,
            remove_upstreams: remove,
            replace_upstreams: Vec::new(),
            upstream_update_only: false,
        }
    }

    /// Request replacing the whole upstream set
    pub fn replace(id: impl Into<String>, service: ServiceDefinition, upstreams: Vec<UpstreamInfo>) -> Self {
        Self {
            replace_upstreams: upstreams,
            ..Self::new(id, service, Vec::new(), Vec::new())
        }
    }

    pub fn upstream_only(mut self) -> Self {
        self.upstream_update_only = true;
        self
    }

    pub fn service_id(&self) -> &str {
        &self.service.service_id
    }

    /// A non-empty replace set wins over add/remove
    pub fn upstream_diff(&self) -> UpstreamDiff<'_> {
        if self.replace_upstreams.is_empty() {
            UpstreamDiff::Incremental {
                add: &self.add_upstreams,
                remove: &self.remove_upstreams,
            }
        } else {
            UpstreamDiff::Replace(&self.replace_upstreams)
        }
    }

    /// Incremental request that only removes upstreams
    pub fn is_removal_only(&self) -> bool {
        matches!(self.upstream_diff(), UpstreamDiff::Incremental { add, .. } if add.is_empty())
    }

    pub fn validate(&self) -> OrchestratorResult<()> {
        let invalid = |reason| OrchestratorError::InvalidRequest {
            id: self.id.clone(),
            reason,
        };
        check_id("request id", &self.id).map_err(invalid)?;
        check_id("service id", self.service_id()).map_err(invalid)?;

        self.add_upstreams
            .iter()
            .chain(&self.remove_upstreams)
            .chain(&self.replace_upstreams)
            .try_for_each(UpstreamInfo::validate)
    }
}
