//! Core CoordinationStore implementation
//!
//! [`NodeStore`] is the raw byte-level contract a backend provides.
//! [`CoordinationStore`] wraps one and adds the typed JSON reads and writes,
//! parent creation, recursive delete and the transaction entry point that
//! every higher component builds on.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::memory::MemoryStore;
use crate::node::NodeStat;
use crate::path;
use crate::sqlite::SqliteStore;
use crate::txn::{Op, OpResult, Transaction, TransactionResult, to_json};

/// Attempts a create-or-overwrite makes while racing concurrent writers
const WRITE_ATTEMPTS: usize = 3;

/// Raw node contract implemented by each backend
///
/// All calls block until the backend answers. Reads of an absent node return
/// `Ok(None)` (or an empty child list); `commit` applies every op or none.
pub trait NodeStore: Send + Sync {
    fn stat(&self, path: &str) -> Result<Option<NodeStat>, StoreError>;

    fn get_data(&self, path: &str) -> Result<Option<(Vec<u8>, NodeStat)>, StoreError>;

    /// Direct child names, sorted; empty when the node is absent
    fn children(&self, path: &str) -> Result<Vec<String>, StoreError>;

    fn commit(&self, ops: &[Op]) -> Result<Vec<OpResult>, StoreError>;
}

/// Typed handle over a [`NodeStore`]
#[derive(Clone)]
pub struct CoordinationStore {
    backend: Arc<dyn NodeStore>,
}

impl std::fmt::Debug for CoordinationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinationStore").finish_non_exhaustive()
    }
}

impl CoordinationStore {
    pub fn new(backend: impl NodeStore + 'static) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }

    pub fn from_backend(backend: Arc<dyn NodeStore>) -> Self {
        Self { backend }
    }

    /// Fresh process-local store
    pub fn in_memory() -> Self {
        Self::new(MemoryStore::new())
    }

    /// Open the durable store at `db_path`
    pub fn open_sqlite(db_path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        Ok(Self::new(SqliteStore::open(db_path, busy_timeout)?))
    }

    // === Reads ===

    /// Read and deserialize a node; `None` if absent
    pub fn read<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, StoreError> {
        Ok(self.read_with_stat(path)?.map(|(value, _)| value))
    }

    /// Read and deserialize a node together with its metadata
    pub fn read_with_stat<T: DeserializeOwned>(&self, path: &str) -> Result<Option<(T, NodeStat)>, StoreError> {
        debug!(%path, "read_with_stat: called");
        match self.backend.get_data(path)? {
            Some((data, stat)) => {
                let value = serde_json::from_slice(&data).map_err(|source| StoreError::Serialization {
                    path: path.to_string(),
                    source,
                })?;
                Ok(Some((value, stat)))
            }
            None => Ok(None),
        }
    }

    /// Raw payload of a node
    pub fn read_bytes(&self, path: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.backend.get_data(path)?.map(|(data, _)| data))
    }

    pub fn children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        self.backend.children(path)
    }

    pub fn exists(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.backend.stat(path)?.is_some())
    }

    pub fn stat(&self, path: &str) -> Result<Option<NodeStat>, StoreError> {
        self.backend.stat(path)
    }

    /// Store-assigned data version of a node
    pub fn revision(&self, path: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.backend.stat(path)?.map(|stat| stat.version))
    }

    /// Last modification time of a node
    pub fn mtime(&self, path: &str) -> Result<Option<DateTime<Utc>>, StoreError> {
        Ok(self
            .backend
            .stat(path)?
            .and_then(|stat| Utc.timestamp_millis_opt(stat.mtime_ms).single()))
    }

    // === Writes ===

    /// Create-or-overwrite `path` with `value`, creating missing parents
    pub fn write<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<(), StoreError> {
        self.put(path, to_json(path, value)?, true)
    }

    /// Create-or-overwrite `path` with `value`; the parent must already exist
    pub fn upsert<T: Serialize + ?Sized>(&self, path: &str, value: &T) -> Result<(), StoreError> {
        self.put(path, to_json(path, value)?, false)
    }

    /// Create-or-overwrite with a raw payload, creating missing parents
    pub fn write_bytes(&self, path: &str, data: Vec<u8>) -> Result<(), StoreError> {
        self.put(path, data, true)
    }

    fn put(&self, path: &str, data: Vec<u8>, create_parents: bool) -> Result<(), StoreError> {
        debug!(%path, create_parents, "put: called");
        for _ in 0..WRITE_ATTEMPTS {
            if self.exists(path)? {
                match self.commit_one(Op::SetData {
                    path: path.to_string(),
                    data: data.clone(),
                }) {
                    Ok(_) => return Ok(()),
                    Err(StoreError::NodeMissing(_)) => continue,
                    Err(e) => return Err(e),
                }
            }

            if create_parents {
                self.ensure_parents(path)?;
            }
            match self.commit_one(Op::Create {
                path: path.to_string(),
                data: data.clone(),
                sequential: false,
            }) {
                Ok(_) => return Ok(()),
                Err(StoreError::NodeAlreadyExists(p)) if p == path => continue,
                Err(e) => return Err(e),
            }
        }
        Err(StoreError::Unavailable(format!(
            "write to {} kept racing concurrent writers",
            path
        )))
    }

    /// Create an empty node unless one is already there; true if this call created it
    pub fn create_if_absent(&self, path: &str) -> Result<bool, StoreError> {
        if self.exists(path)? {
            return Ok(false);
        }
        match self.commit_one(Op::Create {
            path: path.to_string(),
            data: Vec::new(),
            sequential: false,
        }) {
            Ok(_) => {
                debug!(%path, "create_if_absent: created");
                Ok(true)
            }
            Err(StoreError::NodeAlreadyExists(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn ensure_parents(&self, path: &str) -> Result<(), StoreError> {
        for ancestor in path::ancestors(path) {
            self.create_if_absent(ancestor)?;
        }
        Ok(())
    }

    /// Delete a node; false if it was already absent
    ///
    /// A recursive delete removes the whole subtree, deepest first, in one commit.
    pub fn delete(&self, path: &str, recursive: bool) -> Result<bool, StoreError> {
        debug!(%path, recursive, "delete: called");
        if !recursive {
            return match self.commit_one(Op::Delete { path: path.to_string() }) {
                Ok(_) => Ok(true),
                Err(StoreError::NodeMissing(p)) if p == path => Ok(false),
                Err(e) => Err(e),
            };
        }

        if !self.exists(path)? {
            return Ok(false);
        }
        let mut doomed = Vec::new();
        self.collect_subtree(path, &mut doomed)?;
        let mut txn = self.transaction();
        for p in doomed {
            txn.delete(p);
        }
        match self.commit(txn) {
            Ok(result) => {
                info!(%path, nodes = result.results().len(), "Deleted subtree");
                Ok(true)
            }
            Err(e) if matches!(e.root_cause(), StoreError::NodeMissing(p) if p == path) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn collect_subtree(&self, path: &str, out: &mut Vec<String>) -> Result<(), StoreError> {
        for child in self.children(path)? {
            self.collect_subtree(&path::join(path, &child), out)?;
        }
        out.push(path.to_string());
        Ok(())
    }

    // === Transactions ===

    pub fn transaction(&self) -> Transaction {
        Transaction::new()
    }

    /// Commit every staged op atomically
    pub fn commit(&self, txn: Transaction) -> Result<TransactionResult, StoreError> {
        debug!(op_count = txn.len(), "commit: called");
        if txn.is_empty() {
            return Ok(TransactionResult::default());
        }
        Ok(TransactionResult::new(self.backend.commit(txn.ops())?))
    }

    fn commit_one(&self, op: Op) -> Result<OpResult, StoreError> {
        let mut results = self
            .backend
            .commit(std::slice::from_ref(&op))
            .map_err(StoreError::into_root_cause)?;
        results
            .pop()
            .ok_or_else(|| StoreError::Unavailable(format!("backend returned no result for {}", op)))
    }
}
