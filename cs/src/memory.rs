//! In-process node store
//!
//! Keeps every node in an ordered map so a node's children are a contiguous
//! key range. Commits run against a working copy that replaces the live map
//! only when every op succeeded.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use crate::error::StoreError;
use crate::node::{NodeRecord, NodeStat, NodeTable, apply_ops};
use crate::path;
use crate::store::NodeStore;
use crate::txn::{Op, OpResult};

type Nodes = BTreeMap<String, NodeRecord>;

/// Process-local [`NodeStore`]
#[derive(Debug)]
pub struct MemoryStore {
    nodes: Mutex<Nodes>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut nodes = Nodes::new();
        nodes.insert(path::ROOT.to_string(), NodeRecord::new(Vec::new(), crate::now_ms()));
        Self {
            nodes: Mutex::new(nodes),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Nodes>, StoreError> {
        self.nodes
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl NodeStore for MemoryStore {
    fn stat(&self, path: &str) -> Result<Option<NodeStat>, StoreError> {
        path::validate(path)?;
        self.lock()?.stat(path)
    }

    fn get_data(&self, path: &str) -> Result<Option<(Vec<u8>, NodeStat)>, StoreError> {
        path::validate(path)?;
        self.lock()?.get_data(path)
    }

    fn children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        path::validate(path)?;
        self.lock()?.child_names(path)
    }

    fn commit(&self, ops: &[Op]) -> Result<Vec<OpResult>, StoreError> {
        debug!(op_count = ops.len(), "MemoryStore::commit: called");
        let mut live = self.lock()?;
        let mut working = live.clone();
        let results = apply_ops(&mut working, ops, crate::now_ms())?;
        *live = working;
        Ok(results)
    }
}

impl NodeTable for Nodes {
    fn node(&self, path: &str) -> Result<Option<NodeRecord>, StoreError> {
        Ok(self.get(path).cloned())
    }

    fn child_names(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let prefix = if path == path::ROOT {
            path::ROOT.to_string()
        } else {
            format!("{}/", path)
        };
        let names = self
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, _)| {
                let rest = &key[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        Ok(names)
    }

    fn insert(&mut self, path: &str, record: NodeRecord) -> Result<(), StoreError> {
        BTreeMap::insert(self, path.to_string(), record);
        Ok(())
    }

    fn replace(&mut self, path: &str, record: NodeRecord) -> Result<(), StoreError> {
        BTreeMap::insert(self, path.to_string(), record);
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), StoreError> {
        BTreeMap::remove(self, path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn create(path: &str) -> Op {
        Op::Create {
            path: path.to_string(),
            data: Vec::new(),
            sequential: false,
        }
    }

    #[test]
    fn test_children_only_direct() {
        let store = MemoryStore::new();
        store
            .commit(&[create("/a"), create("/a/x"), create("/a/x/deep"), create("/a/y"), create("/ab")])
            .unwrap();

        assert_eq!(store.children("/a").unwrap(), vec!["x", "y"]);
        assert_eq!(store.children("/").unwrap(), vec!["a", "ab"]);
        assert!(store.children("/missing").unwrap().is_empty());
        assert_eq!(store.stat("/a").unwrap().unwrap().num_children, 2);
    }

    #[test]
    fn test_failed_commit_leaves_nothing_behind() {
        let store = MemoryStore::new();
        store.commit(&[create("/taken")]).unwrap();

        let err = store.commit(&[create("/fresh"), create("/taken")]).unwrap_err();
        assert!(matches!(err, StoreError::TransactionAborted { index: 1, .. }));
        assert!(store.stat("/fresh").unwrap().is_none());
    }

    proptest! {
        #[test]
        fn sequential_names_never_repeat(deletes in proptest::collection::vec(any::<bool>(), 1..40)) {
            let store = MemoryStore::new();
            store.commit(&[create("/q")]).unwrap();

            let mut minted = Vec::new();
            for delete_after in deletes {
                let results = store
                    .commit(&[Op::Create {
                        path: "/q/item-".to_string(),
                        data: Vec::new(),
                        sequential: true,
                    }])
                    .unwrap();
                let OpResult::Created { path, .. } = &results[0] else {
                    panic!("expected a create result");
                };
                if delete_after {
                    store.commit(&[Op::Delete { path: path.clone() }]).unwrap();
                }
                minted.push(path.clone());
            }

            for pair in minted.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
