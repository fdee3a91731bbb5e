//! Connection bootstrap for the worker-owned handle.
//!
//! # Responsibility
//! - Open file or in-memory SQLite connections from a `StoreConfig`.
//! - Apply the encryption key, pragmas and schema reconciliation.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON` and the configured busy timeout.
//! - File stores run in WAL mode so other connections can read while we write.
//! - Returned connections are at the configured schema version.

use super::migrations::reconcile_schema;
use super::{DbError, DbResult};
use crate::config::{StoreConfig, StoreLocation};
use log::{error, info};
use rusqlite::Connection;
use std::time::{Duration, Instant};

const ENTITY_TABLE_PREFIX: &str = "entity_";

/// Opens the store described by `config` and reconciles its schema version.
///
/// # Side effects
/// - Creates missing parent directories for file stores.
/// - Emits `db_open` logging events with duration and status.
pub fn open_store(config: &StoreConfig) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = match config.location {
        StoreLocation::File(_) => "file",
        StoreLocation::InMemory => "memory",
    };
    info!("event=db_open module=db status=start mode={mode}");

    let result = open_connection(config).and_then(|mut conn| {
        bootstrap_connection(&mut conn, config)?;
        Ok(conn)
    });

    match &result {
        Ok(_) => info!(
            "event=db_open module=db status=ok mode={mode} location={} duration_ms={}",
            config.describe_location(),
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error mode={mode} location={} duration_ms={} error={}",
            config.describe_location(),
            started_at.elapsed().as_millis(),
            err
        ),
    }

    result
}

/// Returns the table backing `collection`.
pub fn entity_table_name(collection: &str) -> String {
    format!("{ENTITY_TABLE_PREFIX}{collection}")
}

/// Creates the table backing `collection` when it does not exist yet.
///
/// Rows keep their rowid across upserts, which is what store-native order
/// means for unsorted queries.
pub fn ensure_entity_table(conn: &Connection, collection: &str) -> DbResult<()> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (
            id TEXT PRIMARY KEY NOT NULL,
            body TEXT NOT NULL
        );",
        entity_table_name(collection)
    ))?;
    Ok(())
}

/// Lists every entity table currently present in the store.
pub(crate) fn entity_tables(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name
         FROM sqlite_master
         WHERE type = 'table' AND substr(name, 1, length(?1)) = ?1
         ORDER BY name;",
    )?;
    let names = stmt
        .query_map([ENTITY_TABLE_PREFIX], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names)
}

fn open_connection(config: &StoreConfig) -> DbResult<Connection> {
    if config.encryption_key.is_some() && !cfg!(feature = "sqlcipher") {
        return Err(DbError::InvalidConfig(
            "encryption_key requires the `sqlcipher` feature".to_string(),
        ));
    }

    let conn = match &config.location {
        StoreLocation::File(path) => {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)?
        }
        StoreLocation::InMemory => Connection::open_in_memory()?,
    };

    if let Some(key) = &config.encryption_key {
        // Must be the first statement on the connection.
        conn.pragma_update(None, "key", key.expose())?;
    }

    Ok(conn)
}

fn bootstrap_connection(conn: &mut Connection, config: &StoreConfig) -> DbResult<()> {
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    if let StoreLocation::File(_) = config.location {
        let _mode: String =
            conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    }
    reconcile_schema(conn, config)?;
    Ok(())
}
