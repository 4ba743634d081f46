//! Global state snapshot and version token

mod fetcher;

use std::collections::HashMap;

use coordstore::CoordinationStore;
use tracing::{debug, info};

pub use fetcher::ParallelFetcher;

use crate::domain::{ServiceDefinition, ServiceState, StateVersion, UpstreamInfo};
use crate::error::OrchestratorResult;
use crate::paths;
use crate::store::version;

/// Builds the snapshot agents pull, and the token telling them when to pull again
#[derive(Debug, Clone)]
pub struct GlobalStateAggregator {
    store: CoordinationStore,
    fetcher: ParallelFetcher,
}

impl GlobalStateAggregator {
    pub fn new(store: CoordinationStore, fetch_concurrency: usize) -> Self {
        Self {
            fetcher: ParallelFetcher::new(store.clone(), fetch_concurrency),
            store,
        }
    }

    /// Every service with its upstreams, ordered by service id
    ///
    /// Definitions and child lists are fetched in two parallel fan-outs. Any
    /// failed read fails the whole snapshot.
    pub async fn compute_snapshot(&self) -> OrchestratorResult<Vec<ServiceState>> {
        debug!("compute_snapshot: called");
        let store = self.store.clone();
        let service_ids = tokio::task::spawn_blocking(move || store.children(paths::SERVICES)).await??;

        let definitions = self
            .fetcher
            .fan_out(&service_ids, |store, id| store.read::<ServiceDefinition>(&paths::service(id)));
        let children = self
            .fetcher
            .fan_out(&service_ids, |store, id| store.children(&paths::service(id)));
        let (definitions, children) = tokio::try_join!(definitions, children)?;

        let mut children: HashMap<String, Vec<String>> = children.into_iter().collect();
        let mut snapshot = Vec::with_capacity(definitions.len());
        for (service_id, definition) in definitions {
            let Some(service) = definition else {
                debug!(%service_id, "compute_snapshot: service vanished during fetch");
                continue;
            };
            let upstreams = children
                .remove(&service_id)
                .unwrap_or_default()
                .iter()
                .map(|name| UpstreamInfo::parse(name))
                .collect::<OrchestratorResult<Vec<_>>>()?;
            snapshot.push(ServiceState { service, upstreams });
        }
        snapshot.sort_by(|a, b| a.service.service_id.cmp(&b.service.service_id));

        info!(services = snapshot.len(), "Computed global state snapshot");
        Ok(snapshot)
    }

    /// Snapshot serialized as JSON
    pub async fn global_state_bytes(&self) -> OrchestratorResult<Vec<u8>> {
        let snapshot = self.compute_snapshot().await?;
        Ok(serde_json::to_vec(&snapshot)?)
    }

    pub fn increment_state_version(&self) -> OrchestratorResult<StateVersion> {
        version::bump(&self.store)
    }

    /// `None` until the first state change
    pub fn get_state_version(&self) -> OrchestratorResult<Option<StateVersion>> {
        version::current(&self.store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Request;
    use crate::store::ServiceStateStore;

    #[tokio::test]
    async fn test_snapshot_joins_definitions_and_upstreams() {
        let store = CoordinationStore::in_memory();
        let services = ServiceStateStore::new(store.clone());
        services
            .update_service(&Request::replace(
                "r1",
                ServiceDefinition::new("svc-b"),
                vec![UpstreamInfo::new("10.0.0.2", 80, "web")],
            ))
            .unwrap();
        services.save_service(&ServiceDefinition::new("svc-a")).unwrap();

        let aggregator = GlobalStateAggregator::new(store, 4);
        let snapshot = aggregator.compute_snapshot().await.unwrap();

        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].service.service_id, "svc-a");
        assert!(snapshot[0].upstreams.is_empty());
        assert_eq!(snapshot[1].service.service_id, "svc-b");
        assert_eq!(snapshot[1].upstreams[0].host, "10.0.0.2");

        let bytes = aggregator.global_state_bytes().await.unwrap();
        let parsed: Vec<ServiceState> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_store_gives_empty_snapshot() {
        let aggregator = GlobalStateAggregator::new(CoordinationStore::in_memory(), 4);
        assert!(aggregator.compute_snapshot().await.unwrap().is_empty());
        assert_eq!(aggregator.get_state_version().unwrap(), None);
    }

    #[tokio::test]
    async fn test_corrupt_definition_fails_snapshot() {
        let store = CoordinationStore::in_memory();
        store.write_bytes("/state/svc-a", b"{broken".to_vec()).unwrap();
        let aggregator = GlobalStateAggregator::new(store, 4);
        assert!(aggregator.compute_snapshot().await.is_err());
    }

    #[test]
    fn test_version_token() {
        let aggregator = GlobalStateAggregator::new(CoordinationStore::in_memory(), 1);
        let first = aggregator.increment_state_version().unwrap();
        assert_eq!(aggregator.get_state_version().unwrap(), Some(first));
        let second = aggregator.increment_state_version().unwrap();
        assert!(second > first);
    }
}
