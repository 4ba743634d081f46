//! Transaction builder and results
//!
//! A [`Transaction`] is an ordered list of operations submitted as one unit.
//! Each operation sees the effects of the ones before it, so a single
//! transaction may create a node and then a child beneath it.

use serde::Serialize;

use crate::error::StoreError;

/// A single staged operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Create a node; with `sequential` the store appends a minted counter to `path`
    Create {
        path: String,
        data: Vec<u8>,
        sequential: bool,
    },
    /// Replace the payload of an existing node
    SetData { path: String, data: Vec<u8> },
    /// Delete an existing childless node
    Delete { path: String },
}

impl Op {
    /// Path the operation is bound to (the prefix, for sequential creates)
    pub fn path(&self) -> &str {
        match self {
            Self::Create { path, .. } | Self::SetData { path, .. } | Self::Delete { path } => path,
        }
    }

    /// Short name of the operation kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Create { sequential: false, .. } => "create",
            Self::Create { sequential: true, .. } => "create-sequential",
            Self::SetData { .. } => "set-data",
            Self::Delete { .. } => "delete",
        }
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind(), self.path())
    }
}

/// Outcome of one committed operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpResult {
    /// `requested` is the path as staged, `path` the node actually created
    Created { requested: String, path: String },
    DataSet { path: String, version: i64 },
    Deleted { path: String },
}

/// Ordered list of operations committed all-or-nothing
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    ops: Vec<Op>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self, path: impl Into<String>, data: Vec<u8>) -> &mut Self {
        self.ops.push(Op::Create {
            path: path.into(),
            data,
            sequential: false,
        });
        self
    }

    /// Stage a create whose payload is `value` serialized as JSON
    pub fn create_json<T: Serialize + ?Sized>(&mut self, path: impl Into<String>, value: &T) -> Result<&mut Self, StoreError> {
        let path = path.into();
        let data = to_json(&path, value)?;
        Ok(self.create(path, data))
    }

    /// Stage a sequential create under the parent of `prefix`
    pub fn create_sequential(&mut self, prefix: impl Into<String>, data: Vec<u8>) -> &mut Self {
        self.ops.push(Op::Create {
            path: prefix.into(),
            data,
            sequential: true,
        });
        self
    }

    pub fn set_data(&mut self, path: impl Into<String>, data: Vec<u8>) -> &mut Self {
        self.ops.push(Op::SetData {
            path: path.into(),
            data,
        });
        self
    }

    /// Stage a set-data whose payload is `value` serialized as JSON
    pub fn set_json<T: Serialize + ?Sized>(&mut self, path: impl Into<String>, value: &T) -> Result<&mut Self, StoreError> {
        let path = path.into();
        let data = to_json(&path, value)?;
        Ok(self.set_data(path, data))
    }

    pub fn delete(&mut self, path: impl Into<String>) -> &mut Self {
        self.ops.push(Op::Delete { path: path.into() });
        self
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Results of a committed transaction, one per staged op in order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionResult {
    results: Vec<OpResult>,
}

impl TransactionResult {
    pub(crate) fn new(results: Vec<OpResult>) -> Self {
        Self { results }
    }

    pub fn results(&self) -> &[OpResult] {
        &self.results
    }

    /// Actual path of the node created by the create staged at `requested`
    pub fn created_path(&self, requested: &str) -> Option<&str> {
        self.results.iter().find_map(|r| match r {
            OpResult::Created { requested: req, path } if req == requested => Some(path.as_str()),
            _ => None,
        })
    }

    /// Paths minted by sequential creates, in staging order
    pub fn sequential_paths(&self) -> Vec<&str> {
        self.results
            .iter()
            .filter_map(|r| match r {
                OpResult::Created { requested, path } if requested != path => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }
}

pub(crate) fn to_json<T: Serialize + ?Sized>(path: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(value).map_err(|source| StoreError::Serialization {
        path: path.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_preserves_order() {
        let mut txn = Transaction::new();
        txn.create("/a", Vec::new())
            .create_sequential("/a/item-", Vec::new())
            .set_data("/b", b"x".to_vec())
            .delete("/c");

        let kinds: Vec<_> = txn.ops().iter().map(Op::kind).collect();
        assert_eq!(kinds, vec!["create", "create-sequential", "set-data", "delete"]);
        assert_eq!(txn.len(), 4);
        assert_eq!(txn.ops()[1].to_string(), "create-sequential /a/item-");
    }

    #[test]
    fn test_result_lookup() {
        let result = TransactionResult::new(vec![
            OpResult::Created {
                requested: "/a".to_string(),
                path: "/a".to_string(),
            },
            OpResult::Created {
                requested: "/a/item-".to_string(),
                path: "/a/item-0000000007".to_string(),
            },
        ]);
        assert_eq!(result.created_path("/a/item-"), Some("/a/item-0000000007"));
        assert_eq!(result.sequential_paths(), vec!["/a/item-0000000007"]);
        assert_eq!(result.created_path("/missing"), None);
    }
}
