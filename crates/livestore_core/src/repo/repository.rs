//! Generic repository contract and its SQLite-backed implementation.
//!
//! # Responsibility
//! - Expose the query/save/delete surface for one entity type.
//! - Defer every operation and execute it on the repository's worker.
//!
//! # Invariants
//! - Each write runs in exactly one transaction: all rows commit or none do.
//! - Saves upsert by identity key; an unchanged body is not rewritten.
//! - Deleting an absent key succeeds without touching the store.
//! - Queries are validated before anything is scheduled.

use super::completion::Completion;
use super::error::{RepoError, RepoResult};
use crate::config::StoreConfig;
use crate::db::entity_table_name;
use crate::model::entity::Identifiable;
use crate::query::compile::{compile, validate_collection, CompiledQuery, QueryResult};
use crate::query::predicate::{Predicate, SortDescriptor};
use crate::store::handle::{Handle, HandleProvider, SqliteHandleProvider};
use crate::store::live::LiveCollection;
use crate::stream::{decode_rows, Subscription};
use crate::worker::{Worker, WorkerOptions};
use log::{debug, info, warn};
use rusqlite::params;
use std::marker::PhantomData;
use std::time::Instant;

/// Consumer-facing repository operations for entity type `T`.
pub trait Repository<T: Identifiable> {
    /// Live query over every entity in store-native order.
    fn query_all(&self) -> LiveQuery<T>;

    /// Live query with a filter and ordering, validated immediately.
    fn query(&self, predicate: &Predicate, ordering: &[SortDescriptor])
        -> QueryResult<LiveQuery<T>>;

    fn save(&self, entity: T) -> Completion;

    /// Saves the whole batch in one transaction.
    fn save_all(&self, entities: Vec<T>) -> Completion;

    fn delete(&self, entity: &T) -> Completion;

    /// Deletes the whole batch in one transaction.
    fn delete_many(&self, entities: &[T]) -> Completion;

    fn delete_all(&self) -> Completion;
}

/// Repository backed by one worker thread and one SQLite handle.
///
/// Clones share the worker, so operations from clones are serialized together.
pub struct SqliteRepository<T> {
    worker: Worker,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Identifiable> SqliteRepository<T> {
    /// Starts a repository over `config` with the default worker options:
    /// a thread named after the collection, and process abort on open failure.
    pub fn open(config: StoreConfig) -> RepoResult<Self> {
        let options = WorkerOptions::new(format!("livestore.{}", T::COLLECTION));
        Self::with_provider(SqliteHandleProvider::new(config), options)
    }

    /// Starts a repository with an injected handle provider and worker options.
    ///
    /// The store is not opened until the first operation runs.
    pub fn with_provider(
        provider: impl HandleProvider,
        options: WorkerOptions,
    ) -> RepoResult<Self> {
        validate_collection::<T>()?;
        let location = provider.describe();
        let worker = Worker::spawn(provider, options).map_err(RepoError::WorkerSpawn)?;
        info!(
            "event=repository_open module=repo status=ok collection={} location={} thread={}",
            T::COLLECTION,
            location,
            worker.name()
        );
        Ok(Self {
            worker,
            _entity: PhantomData,
        })
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    fn write(
        &self,
        operation: &'static str,
        op: impl FnOnce(&mut Handle) -> RepoResult<usize> + Send + 'static,
    ) -> Completion {
        Completion::deferred(self.worker.clone(), move |handle| {
            let started_at = Instant::now();
            match op(handle) {
                Ok(changed) => {
                    debug!(
                        "event={operation} module=repo status=ok collection={} changed={changed} duration_ms={}",
                        T::COLLECTION,
                        started_at.elapsed().as_millis()
                    );
                    Ok(())
                }
                Err(err) => {
                    warn!(
                        "event={operation} module=repo status=error collection={} duration_ms={} error={}",
                        T::COLLECTION,
                        started_at.elapsed().as_millis(),
                        err
                    );
                    Err(err)
                }
            }
        })
    }
}

impl<T> Clone for SqliteRepository<T> {
    fn clone(&self) -> Self {
        Self {
            worker: self.worker.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Identifiable> Repository<T> for SqliteRepository<T> {
    fn query_all(&self) -> LiveQuery<T> {
        LiveQuery {
            worker: self.worker.clone(),
            query: unfiltered_query::<T>(),
            _entity: PhantomData,
        }
    }

    fn query(
        &self,
        predicate: &Predicate,
        ordering: &[SortDescriptor],
    ) -> QueryResult<LiveQuery<T>> {
        let query = compile::<T>(predicate, ordering)?;
        Ok(LiveQuery {
            worker: self.worker.clone(),
            query,
            _entity: PhantomData,
        })
    }

    fn save(&self, entity: T) -> Completion {
        self.write("entity_save", move |handle| upsert(handle, std::slice::from_ref(&entity)))
    }

    fn save_all(&self, entities: Vec<T>) -> Completion {
        self.write("entity_save_all", move |handle| upsert(handle, &entities))
    }

    fn delete(&self, entity: &T) -> Completion {
        let ids = vec![entity.identity()];
        self.write("entity_delete", move |handle| delete_ids::<T>(handle, &ids))
    }

    fn delete_many(&self, entities: &[T]) -> Completion {
        let ids: Vec<String> = entities.iter().map(Identifiable::identity).collect();
        self.write("entity_delete_many", move |handle| delete_ids::<T>(handle, &ids))
    }

    fn delete_all(&self) -> Completion {
        self.write("entity_delete_all", move |handle| {
            handle.ensure_collection(T::COLLECTION)?;
            // The WHERE clause disables the truncate optimization, which
            // would bypass the update hook.
            let sql = format!(
                "DELETE FROM \"{}\" WHERE 1;",
                entity_table_name(T::COLLECTION)
            );
            handle.transaction(|tx| Ok(tx.execute(&sql, [])?))
        })
    }
}

/// Deferred query description. Each `subscribe` gets an independent live
/// collection created on the worker at subscription time.
pub struct LiveQuery<T> {
    worker: Worker,
    query: CompiledQuery,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Identifiable> LiveQuery<T> {
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription::start(&self.worker, self.query.clone())
    }

    /// One-shot read of the current snapshot.
    pub fn fetch(&self) -> Completion<Vec<T>> {
        let query = self.query.clone();
        Completion::deferred(self.worker.clone(), move |handle| {
            let collection = LiveCollection::open(handle, query)?;
            decode_rows(&collection.rows(handle)?)
        })
    }

    pub fn compiled(&self) -> &CompiledQuery {
        &self.query
    }
}

impl<T> Clone for LiveQuery<T> {
    fn clone(&self) -> Self {
        Self {
            worker: self.worker.clone(),
            query: self.query.clone(),
            _entity: PhantomData,
        }
    }
}

fn unfiltered_query<T: Identifiable>() -> CompiledQuery {
    match compile::<T>(&Predicate::True, &[]) {
        Ok(query) => query,
        // The collection name was validated when the repository was built and
        // an unfiltered query references no fields.
        Err(err) => unreachable!("unfiltered query must compile: {err}"),
    }
}

fn upsert<T: Identifiable>(handle: &mut Handle, entities: &[T]) -> RepoResult<usize> {
    handle.ensure_collection(T::COLLECTION)?;
    let sql = format!(
        "INSERT INTO \"{}\" (id, body) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET body = excluded.body
         WHERE body IS NOT excluded.body;",
        entity_table_name(T::COLLECTION)
    );
    handle.transaction(|tx| {
        let mut stmt = tx.prepare_cached(&sql)?;
        let mut changed = 0;
        for entity in entities {
            let id = entity.identity();
            let body = serde_json::to_string(entity).map_err(|source| {
                RepoError::Serialization {
                    collection: T::COLLECTION,
                    id: id.clone(),
                    source,
                }
            })?;
            changed += stmt.execute(params![id, body])?;
        }
        Ok(changed)
    })
}

fn delete_ids<T: Identifiable>(handle: &mut Handle, ids: &[String]) -> RepoResult<usize> {
    handle.ensure_collection(T::COLLECTION)?;
    let sql = format!(
        "DELETE FROM \"{}\" WHERE id = ?1;",
        entity_table_name(T::COLLECTION)
    );
    handle.transaction(|tx| {
        let mut stmt = tx.prepare_cached(&sql)?;
        let mut changed = 0;
        for id in ids {
            changed += stmt.execute([id])?;
        }
        Ok(changed)
    })
}
