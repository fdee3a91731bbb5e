//! Entity contract shared by every repository.
//!
//! # Responsibility
//! - Define the identity-key capability a type needs to be stored.
//! - Validate collection and field names before they reach SQL.
//!
//! # Invariants
//! - `identity()` is stable for the lifetime of the logical record.
//! - Entities are plain owned values; nothing handle-scoped leaks into them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;

static COLLECTION_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{0,62}$").expect("valid collection regex"));
static FIELD_PATH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)*$").expect("valid field regex")
});

/// Capability required from every type stored through a repository.
///
/// Entities are persisted as JSON documents keyed by `identity()`. Only the
/// fields listed in `FIELDS` may be referenced by predicates and orderings;
/// nested values are addressed with dotted paths such as `"deck.id"`.
pub trait Identifiable: Serialize + DeserializeOwned + Clone + Send + 'static {
    /// Collection (table) name. Letters, digits and `_`, starting with a letter.
    const COLLECTION: &'static str;

    /// Queryable field paths.
    const FIELDS: &'static [&'static str];

    /// Stable, unique identity key used for upserts and deletes.
    fn identity(&self) -> String;
}

/// Returns whether `name` can be used as a collection name.
pub fn is_valid_collection_name(name: &str) -> bool {
    COLLECTION_NAME_RE.is_match(name)
}

/// Returns whether `path` is a well-formed dotted field path.
pub fn is_valid_field_path(path: &str) -> bool {
    FIELD_PATH_RE.is_match(path)
}
