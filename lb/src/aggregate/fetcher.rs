//! Bounded parallel reads against the coordination store

use std::sync::Arc;

use coordstore::{CoordinationStore, StoreError};
use futures::future::try_join_all;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Runs blocking store reads on the blocking pool, at most `concurrency` at a time
#[derive(Debug, Clone)]
pub struct ParallelFetcher {
    store: CoordinationStore,
    permits: Arc<Semaphore>,
}

impl ParallelFetcher {
    pub fn new(store: CoordinationStore, concurrency: usize) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Fetch one value per key; results keep the order of `keys`
    ///
    /// Waits for every read, or fails with the first error.
    pub async fn fan_out<T, F>(&self, keys: &[String], fetch: F) -> OrchestratorResult<Vec<(String, T)>>
    where
        T: Send + 'static,
        F: Fn(&CoordinationStore, &str) -> Result<T, StoreError> + Send + Sync + 'static,
    {
        debug!(count = keys.len(), "fan_out: called");
        let fetch = Arc::new(fetch);
        let reads = keys.iter().cloned().map(|key| {
            let permits = Arc::clone(&self.permits);
            let store = self.store.clone();
            let fetch = Arc::clone(&fetch);
            async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| OrchestratorError::FetchPoolClosed)?;
                let value = tokio::task::spawn_blocking(move || fetch(&store, &key).map(|value| (key, value))).await??;
                Ok::<_, OrchestratorError>(value)
            }
        });
        try_join_all(reads).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fan_out_preserves_order() {
        let store = CoordinationStore::in_memory();
        for i in 0..20 {
            store.write(&format!("/items/{:02}", i), &i).unwrap();
        }
        let keys: Vec<String> = (0..20).map(|i| format!("/items/{:02}", i)).collect();

        let fetcher = ParallelFetcher::new(store, 4);
        let values = fetcher
            .fan_out(&keys, |store, path| store.read::<u32>(path))
            .await
            .unwrap();

        assert_eq!(values.len(), 20);
        for (i, (key, value)) in values.into_iter().enumerate() {
            assert_eq!(key, keys[i]);
            assert_eq!(value, Some(i as u32));
        }
    }

    #[tokio::test]
    async fn test_fan_out_fails_on_any_error() {
        let store = CoordinationStore::in_memory();
        store.write("/items/ok", &1).unwrap();
        store.write_bytes("/items/bad", b"not json".to_vec()).unwrap();
        let keys = vec!["/items/ok".to_string(), "/items/bad".to_string()];

        let fetcher = ParallelFetcher::new(store, 2);
        let result = fetcher.fan_out(&keys, |store, path| store.read::<u32>(path)).await;
        assert!(matches!(result, Err(OrchestratorError::Serialization(_))));
    }
}
