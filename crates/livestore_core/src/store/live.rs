//! Handle-scoped live collections.
//!
//! # Responsibility
//! - Materialise a compiled query against the worker's handle.
//! - Re-evaluate on demand and report whether contents or order changed.
//!
//! # Invariants
//! - A `LiveCollection` is `!Send`; it lives beside its handle on the worker.
//! - Rows are raw `(id, body)` pairs; decoding happens in the stream adapter.

use super::handle::Handle;
use crate::db::{entity_table_name, DbResult};
use crate::query::compile::CompiledQuery;
use rusqlite::params_from_iter;
use std::marker::PhantomData;

/// Raw stored entity as read from its collection table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub id: String,
    pub body: String,
}

pub struct LiveCollection {
    query: CompiledQuery,
    table: String,
    sql: String,
    last: Option<Vec<StoredRow>>,
    _confined: PhantomData<*const ()>,
}

impl LiveCollection {
    /// Binds `query` to the handle, creating the collection table if needed.
    pub fn open(handle: &mut Handle, query: CompiledQuery) -> DbResult<Self> {
        handle.ensure_collection(query.collection())?;
        Ok(Self {
            table: entity_table_name(query.collection()),
            sql: query.sql(),
            query,
            last: None,
            _confined: PhantomData,
        })
    }

    /// Table whose changes invalidate this collection.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Evaluates the query now.
    pub fn rows(&self, handle: &Handle) -> DbResult<Vec<StoredRow>> {
        let mut stmt = handle.connection().prepare_cached(&self.sql)?;
        let rows = stmt
            .query_map(params_from_iter(self.query.params()), |row| {
                Ok(StoredRow {
                    id: row.get(0)?,
                    body: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Re-evaluates and returns the rows only when they differ from the last
    /// returned snapshot. The first call always returns rows.
    pub fn refresh(&mut self, handle: &Handle) -> DbResult<Option<&[StoredRow]>> {
        let rows = self.rows(handle)?;
        if self.last.as_ref() == Some(&rows) {
            return Ok(None);
        }
        Ok(Some(self.last.insert(rows).as_slice()))
    }
}
