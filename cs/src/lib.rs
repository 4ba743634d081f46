//! CoordStore - hierarchical coordination store
//!
//! A ZooKeeper-shaped node store: every node lives at an absolute path, carries
//! an opaque byte payload plus store-assigned metadata (data version, ctime,
//! mtime), and may have children. Multi-path changes are committed through an
//! ordered [`Transaction`] that applies all-or-nothing.
//!
//! # Architecture
//!
//! ```text
//! CoordinationStore (typed JSON wrapper, cheap Clone)
//!   └── Arc<dyn NodeStore>
//!         ├── MemoryStore   (process-local, BTreeMap behind a Mutex)
//!         └── SqliteStore   (durable, one `nodes` table, shareable across processes)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use coordstore::CoordinationStore;
//!
//! let store = CoordinationStore::in_memory();
//! store.write("/state/svc-a", &serde_json::json!({"serviceId": "svc-a"}))?;
//!
//! let mut txn = store.transaction();
//! txn.create_sequential("/queue/item-", Vec::new());
//! let result = store.commit(txn)?;
//! let minted = result.created_path("/queue/item-");
//! ```

pub mod cli;
pub mod config;
mod error;
mod memory;
mod node;
pub mod path;
mod sqlite;
mod store;
mod txn;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use node::NodeStat;
pub use sqlite::SqliteStore;
pub use store::{CoordinationStore, NodeStore};
pub use txn::{Op, OpResult, Transaction, TransactionResult};

/// Width of the zero-padded counter appended to sequential node names
pub const SEQUENCE_WIDTH: usize = 10;

/// Default SQLite busy timeout (5s)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Current wall-clock time in unix milliseconds
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
