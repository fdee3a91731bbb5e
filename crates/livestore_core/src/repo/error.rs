use crate::db::DbError;
use crate::query::compile::QueryError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Failure delivered through a completion or a subscription stream.
///
/// Deleting an absent key is not an error, so there is no `NotFound`.
#[derive(Debug)]
pub enum RepoError {
    /// Store-level failure; a failed write leaves the store unchanged.
    Db(DbError),
    /// A caller entity could not be encoded. The whole transaction is rolled back.
    Serialization {
        collection: &'static str,
        id: String,
        source: serde_json::Error,
    },
    /// Stored data could not be decoded into the entity type.
    InvalidData(String),
    Query(QueryError),
    WorkerSpawn(std::io::Error),
    /// The worker stopped, usually after a fatal open error.
    WorkerUnavailable,
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization {
                collection,
                id,
                source,
            } => write!(f, "cannot encode `{collection}` entity `{id}`: {source}"),
            Self::InvalidData(message) => write!(f, "invalid persisted entity data: {message}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::WorkerSpawn(err) => write!(f, "cannot start repository worker: {err}"),
            Self::WorkerUnavailable => write!(f, "repository worker is not running"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization { source, .. } => Some(source),
            Self::Query(err) => Some(err),
            Self::WorkerSpawn(err) => Some(err),
            Self::InvalidData(_) | Self::WorkerUnavailable => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<QueryError> for RepoError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}
