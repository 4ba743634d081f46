//! Per-service definitions and upstream sets

use std::collections::HashSet;

use coordstore::CoordinationStore;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::version;
use crate::domain::{Request, ServiceDefinition, UpstreamDiff, UpstreamInfo, UpstreamKey};
use crate::error::OrchestratorResult;
use crate::paths;

/// What one `update_service` commit changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    /// The definition node was created or rewritten
    pub service_written: bool,
    /// Upstream node names created
    pub created: Vec<String>,
    /// Upstream node names deleted
    pub deleted: Vec<String>,
}

/// Authoritative service state under `/state`
#[derive(Debug, Clone)]
pub struct ServiceStateStore {
    store: CoordinationStore,
}

/// Upstream deletes and creates staged for one transaction
///
/// Matching is by [`UpstreamKey`]; node names only decide whether a node
/// must be touched at all. Current entries keep the names they were read
/// under, targets are always encoded from their fields.
struct UpstreamPlan<'a> {
    current: &'a [UpstreamInfo],
    present: HashSet<String>,
    deletes: Vec<String>,
    staged_deletes: HashSet<String>,
    creates: Vec<(UpstreamKey, String)>,
}

impl<'a> UpstreamPlan<'a> {
    fn new(current: &'a [UpstreamInfo]) -> Self {
        Self {
            current,
            present: current.iter().map(UpstreamInfo::stored_name).collect(),
            deletes: Vec::new(),
            staged_deletes: HashSet::new(),
            creates: Vec::new(),
        }
    }

    fn stage_delete(&mut self, name: String) {
        if self.staged_deletes.insert(name.clone()) {
            self.deletes.push(name);
        }
    }

    /// Stage deletes for current entries with `target`'s identity, except `keep`
    ///
    /// Returns how many current entries share the identity.
    fn delete_matching(&mut self, target: &UpstreamInfo, keep: Option<&str>) -> usize {
        let matching: Vec<String> = self
            .current
            .iter()
            .filter(|u| u.matches(target))
            .map(UpstreamInfo::stored_name)
            .collect();
        let count = matching.len();
        for name in matching {
            if Some(name.as_str()) != keep {
                self.stage_delete(name);
            }
        }
        count
    }

    /// Stage a create unless the node is already there and staying
    ///
    /// A later create with the same identity supersedes an earlier one.
    fn stage_create(&mut self, upstream: &UpstreamInfo) {
        let key = upstream.key();
        let name = upstream.node_name();
        self.creates.retain(|(staged, _)| *staged != key);
        if self.present.contains(&name) && !self.staged_deletes.contains(&name) {
            return;
        }
        self.creates.push((key, name));
    }

    fn replace(&mut self, upstreams: &[UpstreamInfo]) {
        for existing in self.current {
            self.stage_delete(existing.stored_name());
        }
        for upstream in upstreams {
            self.stage_create(upstream);
        }
    }

    fn incremental(&mut self, service_id: &str, add: &[UpstreamInfo], remove: &[UpstreamInfo]) {
        for upstream in remove {
            if self.delete_matching(upstream, None) == 0 {
                warn!(%service_id, upstream = %upstream, "No stored upstream matches removal");
            }
        }
        for upstream in add {
            let name = upstream.node_name();
            self.delete_matching(upstream, Some(&name));
            self.stage_create(upstream);
        }
    }
}

impl ServiceStateStore {
    pub fn new(store: CoordinationStore) -> Self {
        Self { store }
    }

    pub fn get_service(&self, service_id: &str) -> OrchestratorResult<Option<ServiceDefinition>> {
        Ok(self.store.read(&paths::service(service_id))?)
    }

    pub fn service_exists(&self, service_id: &str) -> OrchestratorResult<bool> {
        Ok(self.store.exists(&paths::service(service_id))?)
    }

    pub fn list_services(&self) -> OrchestratorResult<Vec<String>> {
        Ok(self.store.children(paths::SERVICES)?)
    }

    /// Upstreams parsed from the service's child names; empty if the service is absent
    pub fn get_upstreams(&self, service_id: &str) -> OrchestratorResult<Vec<UpstreamInfo>> {
        self.store
            .children(&paths::service(service_id))?
            .iter()
            .map(|name| UpstreamInfo::parse(name))
            .collect()
    }

    /// Write a definition without touching its upstreams
    pub fn save_service(&self, service: &ServiceDefinition) -> OrchestratorResult<()> {
        debug!(service_id = %service.service_id, "save_service: called");
        self.store.write(&paths::service(&service.service_id), service)?;
        version::bump(&self.store)?;
        Ok(())
    }

    /// Delete every upstream, then the service; false if there was nothing to delete
    ///
    /// Not transactional: a crash part way leaves a service with fewer upstreams,
    /// never upstreams without a service.
    pub fn remove_service(&self, service_id: &str) -> OrchestratorResult<bool> {
        debug!(%service_id, "remove_service: called");
        let service_path = paths::service(service_id);
        if !self.store.exists(&service_path)? {
            return Ok(false);
        }

        for name in self.store.children(&service_path)? {
            self.store.delete(&paths::upstream(service_id, &name), false)?;
        }
        let removed = self.store.delete(&service_path, false)?;
        version::bump(&self.store)?;
        info!(%service_id, "Removed service");
        Ok(removed)
    }

    /// True for upstream-only requests or when the stored definition already matches
    pub fn is_service_unchanged(&self, request: &Request) -> OrchestratorResult<bool> {
        if request.upstream_update_only {
            return Ok(true);
        }
        let stored = self.get_service(request.service_id())?;
        Ok(definition_unchanged(request, stored.as_ref()))
    }

    /// Apply a request's definition and upstream diff as one transaction
    ///
    /// The state version is bumped in the same commit. On failure nothing
    /// is applied.
    pub fn update_service(&self, request: &Request) -> OrchestratorResult<UpdateOutcome> {
        let service_id = request.service_id();
        debug!(%service_id, request_id = %request.id, "update_service: called");
        request.validate()?;

        self.store.create_if_absent(paths::SERVICES)?;
        version::ensure_marker(&self.store)?;

        let service_path = paths::service(service_id);
        let current = self.get_upstreams(service_id)?;
        let stored = self.get_service(service_id)?;

        let mut txn = self.store.transaction();
        let service_written = match stored {
            None => {
                txn.create_json(service_path, &request.service)?;
                true
            }
            Some(existing) if !definition_unchanged(request, Some(&existing)) => {
                txn.set_json(service_path, &request.service)?;
                true
            }
            Some(_) => false,
        };

        let mut plan = UpstreamPlan::new(&current);
        match request.upstream_diff() {
            UpstreamDiff::Replace(upstreams) => plan.replace(upstreams),
            UpstreamDiff::Incremental { add, remove } => plan.incremental(service_id, add, remove),
        }

        for name in &plan.deletes {
            txn.delete(paths::upstream(service_id, name));
        }
        for (_, name) in &plan.creates {
            txn.create(paths::upstream(service_id, name), Vec::new());
        }
        version::stage_bump(&mut txn)?;

        self.store.commit(txn)?;

        let outcome = UpdateOutcome {
            service_written,
            created: plan.creates.into_iter().map(|(_, name)| name).collect(),
            deleted: plan.deletes,
        };
        info!(
            %service_id,
            request_id = %request.id,
            service_written,
            created = outcome.created.len(),
            deleted = outcome.deleted.len(),
            "Updated service"
        );
        Ok(outcome)
    }
}

fn definition_unchanged(request: &Request, stored: Option<&ServiceDefinition>) -> bool {
    request.upstream_update_only || stored == Some(&request.service)
}
