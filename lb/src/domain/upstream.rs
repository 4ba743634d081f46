//! Upstream backends and their node-name encoding
//!
//! An upstream is stored as a content-free child of its service node whose
//! name carries the whole value: `{host}:{port}|{requestId}|{rackId}|{group}`.
//! Two upstreams are the same logical backend when their [`UpstreamKey`]
//! (host, port, group) matches, whatever extras the name encodes.

use serde::{Deserialize, Serialize};

use crate::error::OrchestratorError;

/// Group assigned when none is given
pub const DEFAULT_GROUP: &str = "default";

const FIELD_SEPARATOR: char = '|';

fn default_group() -> String {
    DEFAULT_GROUP.to_string()
}

/// Identity of an upstream for matching and dedup
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UpstreamKey {
    pub host: String,
    pub port: u16,
    pub group: String,
}

impl std::fmt::Display for UpstreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} ({})", self.host, self.port, self.group)
    }
}

/// A backend instance eligible to receive traffic for a service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamInfo {
    pub host: String,
    pub port: u16,

    #[serde(default = "default_group")]
    pub group: String,

    /// Request that last placed this upstream
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack_id: Option<String>,

    /// Literal node name this value was parsed from; never taken from input
    #[serde(skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub original_path: Option<String>,
}

impl UpstreamInfo {
    pub fn new(host: impl Into<String>, port: u16, group: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            group: group.into(),
            request_id: None,
            rack_id: None,
            original_path: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_rack_id(mut self, rack_id: impl Into<String>) -> Self {
        self.rack_id = Some(rack_id.into());
        self
    }

    pub fn key(&self) -> UpstreamKey {
        UpstreamKey {
            host: self.host.clone(),
            port: self.port,
            group: self.group.clone(),
        }
    }

    /// Same host, port and group
    pub fn matches(&self, other: &UpstreamInfo) -> bool {
        self.host == other.host && self.port == other.port && self.group == other.group
    }

    /// `host:port`, with IPv6 hosts bracketed
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Node name encoding this upstream's fields
    pub fn node_name(&self) -> String {
        format!(
            "{addr}{sep}{request}{sep}{rack}{sep}{group}",
            addr = self.address(),
            request = self.request_id.as_deref().unwrap_or(""),
            rack = self.rack_id.as_deref().unwrap_or(""),
            group = self.group,
            sep = FIELD_SEPARATOR,
        )
    }

    /// Name an upstream read from the store lives under: the parsed name if known, else the encoding
    ///
    /// Only meaningful for stored entries. New nodes are always named by [`UpstreamInfo::node_name`].
    pub fn stored_name(&self) -> String {
        self.original_path.clone().unwrap_or_else(|| self.node_name())
    }

    /// Parse a node name back into an upstream
    ///
    /// Accepts one to four `|`-separated fields; a bare `host:port` lands in
    /// the default group.
    pub fn parse(name: &str) -> Result<Self, OrchestratorError> {
        let invalid = |reason: &str| OrchestratorError::InvalidUpstream {
            name: name.to_string(),
            reason: reason.to_string(),
        };

        let mut fields = name.splitn(4, FIELD_SEPARATOR);
        let address = fields.next().unwrap_or("");
        let request_id = fields.next().filter(|s| !s.is_empty());
        let rack_id = fields.next().filter(|s| !s.is_empty());
        let group = fields.next().filter(|s| !s.is_empty()).unwrap_or(DEFAULT_GROUP);

        let (host, port) = address.rsplit_once(':').ok_or_else(|| invalid("missing port"))?;
        let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
        if host.is_empty() {
            return Err(invalid("empty host"));
        }
        let port: u16 = port.parse().map_err(|_| invalid("port is not a number"))?;

        Ok(Self {
            host: host.to_string(),
            port,
            group: group.to_string(),
            request_id: request_id.map(str::to_string),
            rack_id: rack_id.map(str::to_string),
            original_path: Some(name.to_string()),
        })
    }

    /// Reject values whose fields would corrupt the node-name encoding
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        let invalid = |reason: String| OrchestratorError::InvalidUpstream {
            name: self.node_name(),
            reason,
        };
        if self.host.is_empty() {
            return Err(invalid("empty host".to_string()));
        }
        let fields = [
            ("host", Some(self.host.as_str())),
            ("group", Some(self.group.as_str())),
            ("requestId", self.request_id.as_deref()),
            ("rackId", self.rack_id.as_deref()),
        ];
        for (field, value) in fields {
            if let Some(value) = value
                && value.contains(['/', FIELD_SEPARATOR])
            {
                return Err(invalid(format!("{} must not contain '/' or '|'", field)));
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for UpstreamInfo {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for UpstreamInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.address(), self.group)
    }
}
