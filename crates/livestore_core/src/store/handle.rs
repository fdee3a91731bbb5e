//! Thread-confined store handle and the providers that open it.
//!
//! # Responsibility
//! - Wrap the worker's SQLite connection and record store-level change
//!   notifications through SQLite update/commit/rollback hooks.
//! - Define how a handle is opened (`HandleProvider`).
//!
//! # Invariants
//! - `Handle` is `!Send` and `!Sync`; it only exists inside the worker thread.
//! - Only committed changes are reported; rolled back row changes are dropped.

use crate::config::StoreConfig;
use crate::db::{ensure_entity_table, open_store, DbResult};
use rusqlite::hooks::Action;
use rusqlite::{Connection, Transaction};
use std::collections::{BTreeSet, HashSet};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

/// Opens the connection that backs a worker's handle.
///
/// Called at most once per worker, on the worker thread. Implementations must
/// not cache connections themselves.
pub trait HandleProvider: Send + 'static {
    fn open(&self) -> DbResult<Connection>;

    /// Location shown in log lines.
    fn describe(&self) -> String;
}

/// Default provider backed by `db::open_store`.
#[derive(Debug, Clone)]
pub struct SqliteHandleProvider {
    config: StoreConfig,
}

impl SqliteHandleProvider {
    pub fn new(config: StoreConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }
}

impl HandleProvider for SqliteHandleProvider {
    fn open(&self) -> DbResult<Connection> {
        open_store(&self.config)
    }

    fn describe(&self) -> String {
        self.config.describe_location()
    }
}

#[derive(Debug, Default)]
struct ChangeLog {
    pending: BTreeSet<String>,
    committed: BTreeSet<String>,
}

type SharedChangeLog = Arc<Mutex<ChangeLog>>;

fn with_log<R>(log: &SharedChangeLog, f: impl FnOnce(&mut ChangeLog) -> R) -> R {
    let mut guard = log.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

/// Session onto the store, owned by exactly one worker thread.
pub struct Handle {
    conn: Connection,
    changes: SharedChangeLog,
    ensured: HashSet<&'static str>,
    data_version: i64,
    _confined: PhantomData<*const ()>,
}

impl Handle {
    /// Takes ownership of a freshly opened connection and installs the hooks.
    pub(crate) fn attach(conn: Connection) -> DbResult<Self> {
        let changes = SharedChangeLog::default();

        let on_update = Arc::clone(&changes);
        conn.update_hook(Some(
            move |_action: Action, _db: &str, table: &str, _rowid: i64| {
                with_log(&on_update, |log| {
                    if !log.pending.contains(table) {
                        log.pending.insert(table.to_string());
                    }
                });
            },
        ));

        let on_commit = Arc::clone(&changes);
        conn.commit_hook(Some(move || {
            with_log(&on_commit, |log| {
                let pending = std::mem::take(&mut log.pending);
                log.committed.extend(pending);
            });
            false
        }));

        let on_rollback = Arc::clone(&changes);
        conn.rollback_hook(Some(move || {
            with_log(&on_rollback, |log| log.pending.clear());
        }));

        let data_version = read_data_version(&conn)?;
        Ok(Self {
            conn,
            changes,
            ensured: HashSet::new(),
            data_version,
            _confined: PhantomData,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Creates the collection's table once per handle.
    pub fn ensure_collection(&mut self, collection: &'static str) -> DbResult<()> {
        if self.ensured.contains(collection) {
            return Ok(());
        }
        ensure_entity_table(&self.conn, collection)?;
        self.ensured.insert(collection);
        Ok(())
    }

    /// Runs `f` inside one transaction; commits on `Ok`, rolls back on `Err`.
    pub fn transaction<R, E>(
        &mut self,
        f: impl FnOnce(&Transaction<'_>) -> Result<R, E>,
    ) -> Result<R, E>
    where
        E: From<rusqlite::Error>,
    {
        let tx = self.conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Drains the tables changed by commits on this handle.
    pub(crate) fn take_changes(&self) -> BTreeSet<String> {
        with_log(&self.changes, |log| std::mem::take(&mut log.committed))
    }

    /// Returns whether another connection committed since the last call.
    pub(crate) fn poll_external_commit(&mut self) -> DbResult<bool> {
        let current = read_data_version(&self.conn)?;
        let changed = current != self.data_version;
        self.data_version = current;
        Ok(changed)
    }
}

fn read_data_version(conn: &Connection) -> DbResult<i64> {
    let version = conn.query_row("PRAGMA data_version;", [], |row| row.get(0))?;
    Ok(version)
}
