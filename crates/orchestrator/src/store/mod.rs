//! Hierarchical key-value persistence.
//!
//! Keys are `/`-delimited paths such as `/ns/default/cluster/c1`. Every entry
//! carries a version that increases on each write, which lets callers persist
//! read-modify-write results with compare-and-swap.

mod file;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors returned by store implementations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored envelope could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The entry's version did not match the expected one.
    #[error("Version conflict on {key}: expected {expected:?}, found {found:?}")]
    Conflict {
        key: String,
        expected: Option<u64>,
        found: Option<u64>,
    },

    /// Key is not a well-formed absolute path.
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),
}

/// A stored value with its key and version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEntry {
    pub key: String,
    pub value: String,
    pub version: u64,
}

/// Durable key-value store.
///
/// Versions come from one counter per store and only grow, so a key that is
/// deleted and written again never repeats a version it had before.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Write unconditionally. Returns the new version.
    async fn put(&self, key: &str, value: &str) -> Result<u64, StoreError>;

    /// Write only if the current version is `expected` (`None` = key absent).
    /// Returns the new version.
    async fn put_if_version(
        &self,
        key: &str,
        value: &str,
        expected: Option<u64>,
    ) -> Result<u64, StoreError>;

    /// Read one entry.
    async fn get(&self, key: &str) -> Result<Option<StoreEntry>, StoreError>;

    /// Entries under `prefix`, ordered by key. Without `recursive` only direct
    /// children are returned.
    async fn get_list(&self, prefix: &str, recursive: bool) -> Result<Vec<StoreEntry>, StoreError>;

    /// Remove an entry. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Split a key into its path segments.
pub(crate) fn key_segments(key: &str) -> Result<Vec<&str>, StoreError> {
    let trimmed = key
        .strip_prefix('/')
        .ok_or_else(|| StoreError::InvalidKey(key.to_string()))?
        .trim_end_matches('/');
    let segments: Vec<&str> = trimmed.split('/').collect();
    if segments
        .iter()
        .any(|s| s.is_empty() || *s == "." || *s == "..")
    {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(segments)
}

/// Whether `key` lives under `prefix`.
pub(crate) fn is_under(prefix: &str, key: &str, recursive: bool) -> bool {
    let base = prefix.trim_end_matches('/');
    key.strip_prefix(base)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.is_empty() && (recursive || !rest.contains('/')))
}

/// Version check shared by the implementations.
pub(crate) fn check_version(
    key: &str,
    expected: Option<u64>,
    found: Option<u64>,
) -> Result<(), StoreError> {
    if expected == found {
        Ok(())
    } else {
        Err(StoreError::Conflict {
            key: key.to_string(),
            expected,
            found,
        })
    }
}
