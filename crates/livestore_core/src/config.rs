//! Store configuration handed to the handle provider.
//!
//! # Responsibility
//! - Describe where the store lives and how its schema version is reconciled.
//! - Carry the optional encryption key without ever printing it.
//!
//! # Invariants
//! - The repository layer never interprets these values; only `db::open_store`
//!   does, on the worker thread.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Debug, Formatter};
use std::path::PathBuf;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Physical location of the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "path")]
pub enum StoreLocation {
    /// SQLite database file. Parent directories are created on open.
    File(PathBuf),
    /// Private in-memory database owned by the worker's handle.
    InMemory,
}

/// What to do when the on-disk schema version is older than configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationPolicy {
    /// Run the configured migration steps in one transaction.
    #[default]
    Migrate,
    /// Drop every entity table and start empty at the configured version.
    ResetOnMismatch,
    /// Refuse to open a non-empty store with an older version.
    Reject,
}

/// One schema upgrade step, applied when moving past `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStep {
    pub version: u32,
    /// Raw SQL batch. Entity tables are named `entity_<collection>`.
    pub sql: String,
}

/// Passphrase for SQLCipher-encrypted stores. Redacted in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey(String);

impl EncryptionKey {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self(passphrase.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for EncryptionKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "EncryptionKey(***)")
    }
}

impl Serialize for EncryptionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("***")
    }
}

impl<'de> Deserialize<'de> for EncryptionKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// Opaque store configuration passed through to the handle provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub location: StoreLocation,
    /// Application schema version mirrored to `PRAGMA user_version`.
    #[serde(default)]
    pub schema_version: u32,
    #[serde(default)]
    pub migration: MigrationPolicy,
    #[serde(default)]
    pub migrations: Vec<MigrationStep>,
    #[serde(default)]
    pub encryption_key: Option<EncryptionKey>,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl StoreConfig {
    /// File-backed store at schema version 0 with default policy.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::with_location(StoreLocation::File(path.into()))
    }

    /// Private in-memory store, mostly useful for tests.
    pub fn in_memory() -> Self {
        Self::with_location(StoreLocation::InMemory)
    }

    fn with_location(location: StoreLocation) -> Self {
        Self {
            location,
            schema_version: 0,
            migration: MigrationPolicy::default(),
            migrations: Vec::new(),
            encryption_key: None,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    pub fn schema_version(mut self, version: u32) -> Self {
        self.schema_version = version;
        self
    }

    pub fn migration_policy(mut self, policy: MigrationPolicy) -> Self {
        self.migration = policy;
        self
    }

    pub fn migration_step(mut self, version: u32, sql: impl Into<String>) -> Self {
        self.migrations.push(MigrationStep {
            version,
            sql: sql.into(),
        });
        self
    }

    pub fn encryption_key(mut self, key: EncryptionKey) -> Self {
        self.encryption_key = Some(key);
        self
    }

    /// Parses a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Human-readable location used in log lines.
    pub fn describe_location(&self) -> String {
        match &self.location {
            StoreLocation::File(path) => path.display().to_string(),
            StoreLocation::InMemory => ":memory:".to_string(),
        }
    }
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
