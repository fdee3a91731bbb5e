//! Schema version reconciliation and configured migration steps.
//!
//! # Responsibility
//! - Compare `PRAGMA user_version` with `StoreConfig::schema_version`.
//! - Apply the configured `MigrationPolicy` atomically.
//!
//! # Invariants
//! - Step versions must be strictly increasing and never exceed the target.
//! - A store newer than the configured version is never opened.
//! - Steps and the version stamp commit in the same transaction.

use super::open::entity_tables;
use crate::config::{MigrationPolicy, MigrationStep, StoreConfig};
use crate::db::{DbError, DbResult};
use log::{info, warn};
use rusqlite::Connection;

/// Brings the connection to `config.schema_version` or fails.
pub fn reconcile_schema(conn: &mut Connection, config: &StoreConfig) -> DbResult<()> {
    validate_plan(&config.migrations, config.schema_version)?;

    let current = current_user_version(conn)?;
    let target = config.schema_version;

    if current > target {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: target,
        });
    }

    if current == target {
        return Ok(());
    }

    match config.migration {
        MigrationPolicy::Migrate => apply_steps(conn, &config.migrations, current, target),
        MigrationPolicy::ResetOnMismatch => reset_store(conn, current, target),
        MigrationPolicy::Reject => {
            let is_fresh = current == 0 && entity_tables(conn)?.is_empty();
            if !is_fresh {
                return Err(DbError::SchemaMismatch {
                    db_version: current,
                    expected: target,
                });
            }
            conn.execute_batch(&format!("PRAGMA user_version = {target};"))?;
            Ok(())
        }
    }
}

/// Reads the schema version currently stamped on the store.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

fn validate_plan(steps: &[MigrationStep], target: u32) -> DbResult<()> {
    let mut previous = 0;
    for step in steps {
        if step.version <= previous {
            return Err(DbError::InvalidConfig(format!(
                "migration step {} is not after step {previous}",
                step.version
            )));
        }
        if step.version > target {
            return Err(DbError::InvalidConfig(format!(
                "migration step {} exceeds schema version {target}",
                step.version
            )));
        }
        previous = step.version;
    }
    Ok(())
}

fn apply_steps(
    conn: &mut Connection,
    steps: &[MigrationStep],
    current: u32,
    target: u32,
) -> DbResult<()> {
    let tx = conn.transaction()?;
    let mut applied = 0usize;
    for step in steps {
        if step.version <= current {
            continue;
        }

        tx.execute_batch(&step.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", step.version))?;
        applied += 1;
    }
    tx.execute_batch(&format!("PRAGMA user_version = {target};"))?;
    tx.commit()?;

    info!(
        "event=schema_migrate module=db status=ok from_version={current} to_version={target} steps={applied}"
    );
    Ok(())
}

fn reset_store(conn: &mut Connection, current: u32, target: u32) -> DbResult<()> {
    let tables = entity_tables(conn)?;
    let tx = conn.transaction()?;
    for table in &tables {
        tx.execute_batch(&format!("DROP TABLE \"{table}\";"))?;
    }
    tx.execute_batch(&format!("PRAGMA user_version = {target};"))?;
    tx.commit()?;

    warn!(
        "event=schema_reset module=db status=ok from_version={current} to_version={target} dropped_tables={}",
        tables.len()
    );
    Ok(())
}
