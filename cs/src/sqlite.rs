//! SQLite-backed node store
//!
//! All nodes live in one table keyed by path with an index on the parent
//! path. Every commit is a single `BEGIN IMMEDIATE` transaction, so several
//! processes may share one database file and still see all-or-nothing
//! commits and a single sequence counter per parent.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::node::{NodeRecord, NodeStat, NodeTable, apply_ops};
use crate::path;
use crate::store::NodeStore;
use crate::txn::{Op, OpResult};

const SCHEMA_VERSION: i64 = 1;
const CACHE_SIZE_KB: i64 = -8_000;

/// Durable [`NodeStore`] on a SQLite database file
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (creating if needed) the store at `db_path`
    pub fn open(db_path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        debug!(db_path = %db_path.display(), "SqliteStore::open: called");

        if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|source| StoreError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(&db_path)?;
        apply_pragmas(&conn)?;
        conn.busy_timeout(busy_timeout)?;
        initialize_schema(&conn)?;

        info!(db_path = %db_path.display(), "Opened sqlite coordination store");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

impl NodeStore for SqliteStore {
    fn stat(&self, path: &str) -> Result<Option<NodeStat>, StoreError> {
        path::validate(path)?;
        let conn = self.lock()?;
        SqlTable { conn: &conn }.stat(path)
    }

    fn get_data(&self, path: &str) -> Result<Option<(Vec<u8>, NodeStat)>, StoreError> {
        path::validate(path)?;
        let conn = self.lock()?;
        SqlTable { conn: &conn }.get_data(path)
    }

    fn children(&self, path: &str) -> Result<Vec<String>, StoreError> {
        path::validate(path)?;
        let conn = self.lock()?;
        SqlTable { conn: &conn }.child_names(path)
    }

    fn commit(&self, ops: &[Op]) -> Result<Vec<OpResult>, StoreError> {
        debug!(op_count = ops.len(), "SqliteStore::commit: called");
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // An error here drops `tx`, which rolls it back.
        let results = apply_ops(&mut SqlTable { conn: &tx }, ops, crate::now_ms())?;
        tx.commit()?;
        Ok(results)
    }
}

struct SqlTable<'a> {
    conn: &'a Connection,
}

impl NodeTable for SqlTable<'_> {
    fn node(&self, path: &str) -> Result<Option<NodeRecord>, StoreError> {
        let record = self
            .conn
            .query_row(
                "SELECT data, version, cversion, ctime_ms, mtime_ms, next_seq FROM nodes WHERE path = ?1",
                params![path],
                |row| {
                    Ok(NodeRecord {
                        data: row.get(0)?,
                        version: row.get(1)?,
                        cversion: row.get(2)?,
                        ctime_ms: row.get(3)?,
                        mtime_ms: row.get(4)?,
                        next_seq: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    fn child_names(&self, path: &str) -> Result<Vec<String>, StoreError> {
        let mut stmt = self
            .conn
            .prepare_cached("SELECT path FROM nodes WHERE parent = ?1 ORDER BY path ASC")?;
        let mut rows = stmt.query(params![path])?;
        let mut names = Vec::new();
        while let Some(row) = rows.next()? {
            let child: String = row.get(0)?;
            names.push(path::name(&child).to_string());
        }
        Ok(names)
    }

    fn insert(&mut self, path: &str, record: NodeRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO nodes (path, parent, data, version, cversion, ctime_ms, mtime_ms, next_seq) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                path,
                path::parent(path),
                record.data,
                record.version,
                record.cversion,
                record.ctime_ms,
                record.mtime_ms,
                record.next_seq
            ],
        )?;
        Ok(())
    }

    fn replace(&mut self, path: &str, record: NodeRecord) -> Result<(), StoreError> {
        self.conn.execute(
            "UPDATE nodes SET data = ?2, version = ?3, cversion = ?4, ctime_ms = ?5, mtime_ms = ?6, next_seq = ?7 \
             WHERE path = ?1",
            params![
                path,
                record.data,
                record.version,
                record.cversion,
                record.ctime_ms,
                record.mtime_ms,
                record.next_seq
            ],
        )?;
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), StoreError> {
        self.conn.execute("DELETE FROM nodes WHERE path = ?1", params![path])?;
        Ok(())
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", CACHE_SIZE_KB)?;
    Ok(())
}

fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS nodes (
           path TEXT PRIMARY KEY,
           parent TEXT,
           data BLOB NOT NULL,
           version INTEGER NOT NULL,
           cversion INTEGER NOT NULL,
           ctime_ms INTEGER NOT NULL,
           mtime_ms INTEGER NOT NULL,
           next_seq INTEGER NOT NULL
         );
         CREATE INDEX IF NOT EXISTS nodes_by_parent ON nodes (parent, path);
         CREATE TABLE IF NOT EXISTS meta (
           key TEXT PRIMARY KEY,
           value TEXT NOT NULL
         );",
    )?;

    let existing: Option<String> = conn
        .query_row("SELECT value FROM meta WHERE key = 'schema_version'", [], |row| row.get(0))
        .optional()?;
    match existing {
        Some(value) if value != SCHEMA_VERSION.to_string() => {
            return Err(StoreError::Unavailable(format!(
                "store schema version mismatch: expected {}, got {}",
                SCHEMA_VERSION, value
            )));
        }
        Some(_) => {}
        None => {
            conn.execute(
                "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
                params![SCHEMA_VERSION.to_string()],
            )?;
        }
    }

    let now = crate::now_ms();
    conn.execute(
        "INSERT OR IGNORE INTO nodes (path, parent, data, version, cversion, ctime_ms, mtime_ms, next_seq) \
         VALUES (?1, NULL, x'', 0, 0, ?2, ?2, 0)",
        params![path::ROOT, now],
    )?;
    Ok(())
}
