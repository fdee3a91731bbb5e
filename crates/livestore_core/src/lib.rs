//! Reactive repository over an embedded SQLite store.
//!
//! Every store handle lives on a dedicated worker thread. Callers on any
//! thread get deferred completions for writes and live snapshot streams for
//! queries.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod store;
pub mod stream;
pub mod worker;

pub use config::{EncryptionKey, MigrationPolicy, MigrationStep, StoreConfig, StoreLocation};
pub use db::{DbError, DbResult};
pub use logging::{default_log_level, init_logging, logging_status, LogTarget};
pub use model::entity::Identifiable;
pub use query::compile::{CompiledQuery, QueryError, QueryResult};
pub use query::predicate::{FieldValue, Predicate, SortDescriptor, SortDirection};
pub use repo::completion::Completion;
pub use repo::error::{RepoError, RepoResult};
pub use repo::repository::{LiveQuery, Repository, SqliteRepository};
pub use store::handle::{HandleProvider, SqliteHandleProvider};
pub use stream::Subscription;
pub use worker::{abort_on_fatal, FatalError, FatalHandler, Worker, WorkerOptions};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
