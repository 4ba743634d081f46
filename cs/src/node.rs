//! Node records and the operation semantics shared by every backend
//!
//! Backends only provide row-level access through [`NodeTable`]; the rules
//! for create/set/delete (parent must exist, no clobbering, no deleting
//! nodes with children, sequential naming) live here once.

use serde::Serialize;
use tracing::trace;

use crate::error::StoreError;
use crate::path;
use crate::txn::{Op, OpResult};

/// Store-assigned metadata for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeStat {
    /// Data version, 0 at creation and +1 per set-data
    pub version: i64,
    /// Child version, +1 per child created or deleted
    pub cversion: i64,
    /// Creation time (unix ms)
    pub ctime_ms: i64,
    /// Last modification time (unix ms)
    pub mtime_ms: i64,
    /// Number of direct children
    pub num_children: usize,
}

/// Stored form of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct NodeRecord {
    pub data: Vec<u8>,
    pub version: i64,
    pub cversion: i64,
    pub ctime_ms: i64,
    pub mtime_ms: i64,
    /// Next counter handed to a sequential child; never decreases
    pub next_seq: i64,
}

impl NodeRecord {
    pub fn new(data: Vec<u8>, now_ms: i64) -> Self {
        Self {
            data,
            version: 0,
            cversion: 0,
            ctime_ms: now_ms,
            mtime_ms: now_ms,
            next_seq: 0,
        }
    }

    pub fn stat(&self, num_children: usize) -> NodeStat {
        NodeStat {
            version: self.version,
            cversion: self.cversion,
            ctime_ms: self.ctime_ms,
            mtime_ms: self.mtime_ms,
            num_children,
        }
    }
}

/// Row-level access to a backend's nodes
pub(crate) trait NodeTable {
    fn node(&self, path: &str) -> Result<Option<NodeRecord>, StoreError>;

    /// Names (not paths) of direct children, sorted
    fn child_names(&self, path: &str) -> Result<Vec<String>, StoreError>;

    fn insert(&mut self, path: &str, record: NodeRecord) -> Result<(), StoreError>;

    fn replace(&mut self, path: &str, record: NodeRecord) -> Result<(), StoreError>;

    fn remove(&mut self, path: &str) -> Result<(), StoreError>;

    fn stat(&self, path: &str) -> Result<Option<NodeStat>, StoreError> {
        match self.node(path)? {
            Some(record) => Ok(Some(record.stat(self.child_names(path)?.len()))),
            None => Ok(None),
        }
    }

    fn get_data(&self, path: &str) -> Result<Option<(Vec<u8>, NodeStat)>, StoreError> {
        match self.node(path)? {
            Some(record) => {
                let stat = record.stat(self.child_names(path)?.len());
                Ok(Some((record.data, stat)))
            }
            None => Ok(None),
        }
    }
}

/// Apply `ops` in order; the first failure aborts with its index
///
/// Callers must discard the table's changes when this returns an error.
pub(crate) fn apply_ops<T: NodeTable + ?Sized>(table: &mut T, ops: &[Op], now_ms: i64) -> Result<Vec<OpResult>, StoreError> {
    let mut results = Vec::with_capacity(ops.len());
    for (index, op) in ops.iter().enumerate() {
        let result = apply_op(table, op, now_ms).map_err(|source| StoreError::TransactionAborted {
            index,
            op: op.to_string(),
            source: Box::new(source),
        })?;
        results.push(result);
    }
    Ok(results)
}

fn apply_op<T: NodeTable + ?Sized>(table: &mut T, op: &Op, now_ms: i64) -> Result<OpResult, StoreError> {
    trace!(%op, "apply_op: called");
    path::validate(op.path())?;
    match op {
        Op::Create { path, data, sequential } => {
            let parent_path = path::parent(path).ok_or_else(|| StoreError::NodeAlreadyExists(path.clone()))?;
            let mut parent = table
                .node(parent_path)?
                .ok_or_else(|| StoreError::NodeMissing(parent_path.to_string()))?;

            let created = if *sequential {
                let minted = format!("{}{:0width$}", path, parent.next_seq, width = crate::SEQUENCE_WIDTH);
                parent.next_seq += 1;
                minted
            } else {
                path.clone()
            };

            if table.node(&created)?.is_some() {
                return Err(StoreError::NodeAlreadyExists(created));
            }

            table.insert(&created, NodeRecord::new(data.clone(), now_ms))?;
            parent.cversion += 1;
            table.replace(parent_path, parent)?;

            Ok(OpResult::Created {
                requested: path.clone(),
                path: created,
            })
        }
        Op::SetData { path, data } => {
            let mut record = table.node(path)?.ok_or_else(|| StoreError::NodeMissing(path.clone()))?;
            record.data = data.clone();
            record.version += 1;
            record.mtime_ms = now_ms;
            let version = record.version;
            table.replace(path, record)?;
            Ok(OpResult::DataSet {
                path: path.clone(),
                version,
            })
        }
        Op::Delete { path } => {
            let parent_path = path::parent(path).ok_or_else(|| StoreError::InvalidPath {
                path: path.clone(),
                reason: "the root cannot be deleted",
            })?;
            if table.node(path)?.is_none() {
                return Err(StoreError::NodeMissing(path.clone()));
            }
            if !table.child_names(path)?.is_empty() {
                return Err(StoreError::NotEmpty(path.clone()));
            }
            table.remove(path)?;
            if let Some(mut parent) = table.node(parent_path)? {
                parent.cversion += 1;
                table.replace(parent_path, parent)?;
            }
            Ok(OpResult::Deleted { path: path.clone() })
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn table() -> BTreeMap<String, NodeRecord> {
        let mut nodes = BTreeMap::new();
        nodes.insert(path::ROOT.to_string(), NodeRecord::new(Vec::new(), 0));
        nodes
    }

    #[test]
    fn test_create_requires_parent() {
        let mut nodes = table();
        let err = apply_ops(
            &mut nodes,
            &[Op::Create {
                path: "/a/b".to_string(),
                data: Vec::new(),
                sequential: false,
            }],
            1,
        )
        .unwrap_err();
        assert!(matches!(err.root_cause(), StoreError::NodeMissing(p) if p == "/a"));
    }

    #[test]
    fn test_sequential_counter_is_per_parent() {
        let mut nodes = table();
        let seq = |prefix: &str| Op::Create {
            path: prefix.to_string(),
            data: Vec::new(),
            sequential: true,
        };
        let results = apply_ops(&mut nodes, &[seq("/q-"), seq("/q-"), seq("/other-")], 1).unwrap();
        let paths: Vec<_> = results
            .iter()
            .map(|r| match r {
                OpResult::Created { path, .. } => path.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(paths, vec!["/q-0000000000", "/q-0000000001", "/other-0000000002"]);
    }

    #[test]
    fn test_set_data_bumps_version_and_mtime() {
        let mut nodes = table();
        apply_ops(
            &mut nodes,
            &[
                Op::Create {
                    path: "/v".to_string(),
                    data: Vec::new(),
                    sequential: false,
                },
                Op::SetData {
                    path: "/v".to_string(),
                    data: b"1".to_vec(),
                },
            ],
            10,
        )
        .unwrap();
        apply_ops(
            &mut nodes,
            &[Op::SetData {
                path: "/v".to_string(),
                data: b"2".to_vec(),
            }],
            20,
        )
        .unwrap();

        let stat = nodes.stat("/v").unwrap().unwrap();
        assert_eq!(stat.version, 2);
        assert_eq!(stat.ctime_ms, 10);
        assert_eq!(stat.mtime_ms, 20);
    }

    #[test]
    fn test_delete_rejects_children_and_root() {
        let mut nodes = table();
        apply_ops(
            &mut nodes,
            &[
                Op::Create {
                    path: "/a".to_string(),
                    data: Vec::new(),
                    sequential: false,
                },
                Op::Create {
                    path: "/a/b".to_string(),
                    data: Vec::new(),
                    sequential: false,
                },
            ],
            1,
        )
        .unwrap();

        let err = apply_ops(&mut nodes, &[Op::Delete { path: "/a".to_string() }], 2).unwrap_err();
        assert!(matches!(err.root_cause(), StoreError::NotEmpty(_)));

        let err = apply_ops(&mut nodes, &[Op::Delete { path: "/".to_string() }], 2).unwrap_err();
        assert!(matches!(err.root_cause(), StoreError::InvalidPath { .. }));
    }
}
