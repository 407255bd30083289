//! Durable key-value storage
//!
//! The unlock table and the cached entitlement flag live in a flat
//! string-to-string store, mirroring the mobile platform's async storage:
//! - `FileKeyValueStore`: one file per key under the app data directory
//! - `MemoryKeyValueStore`: in-process map with fault injection, for tests
//!
//! Both calls may fail; callers treat failures as transient I/O errors.

use async_trait::async_trait;

pub mod file;
pub mod memory;

pub use file::{default_data_dir, FileKeyValueStore};
pub use memory::MemoryKeyValueStore;

/// Unified trait for durable key-value backends
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, `None` if nothing was ever written
    async fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Overwrite the value stored under `key`
    async fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key`; removing a missing key is not an error
    async fn remove_item(&self, key: &str) -> Result<(), StoreError>;
}

/// Storage operation errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Keys become file names, so only a conservative alphabet is accepted.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        && !key.starts_with('.');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
