//! Key-value store abstraction shared by the lookup, metadata, and cutout layers.
//!
//! Provides the handful of primitives the core needs from its backing store:
//! - Plain get/set/delete with delete reporting whether an entry existed
//! - An atomic conditional write (`set_if_absent`) for create-once semantics
//! - Prefix scans for listing everything under a namespace
//!
//! # Example
//!
//! ```rust
//! use bosscore::kv::{KvStore, MemoryKvStore};
//!
//! # async fn example() -> bosscore::Result<()> {
//! let store = MemoryKvStore::new();
//!
//! assert!(store.set_if_absent("key", b"value".to_vec()).await?);
//! assert!(!store.set_if_absent("key", b"other".to_vec()).await?);
//! assert_eq!(store.get("key").await?, Some(b"value".to_vec()));
//!
//! assert!(store.delete("key").await?);
//! assert!(!store.exists("key").await?);
//! # Ok(())
//! # }
//! ```

mod memory;

pub use memory::MemoryKvStore;

use crate::Result;
use std::future::Future;
use std::sync::Arc;

/// Key-value store trait backing metadata, lookup mappings, and cutout blocks.
///
/// Implementations map their I/O failures to
/// [`Error::BackendUnavailable`](crate::Error::BackendUnavailable).
pub trait KvStore: Send + Sync {
    /// Get a value by key.
    ///
    /// Returns `None` if the key doesn't exist.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Set a value for a key.
    ///
    /// Overwrites any existing value.
    fn set(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Set a value only if the key is vacant.
    ///
    /// Returns `true` if this call wrote the value. Must be atomic: of two
    /// racing callers on the same key exactly one observes `true`.
    fn set_if_absent(&self, key: &str, value: Vec<u8>)
        -> impl Future<Output = Result<bool>> + Send;

    /// Delete a key.
    ///
    /// Returns `true` if an entry was removed, `false` if the key was absent.
    fn delete(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// Check if a key exists.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send;

    /// All entries whose key starts with `prefix`, sorted by key.
    fn scan_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<(String, Vec<u8>)>>> + Send;
}

impl<S: KvStore> KvStore for Arc<S> {
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>) -> impl Future<Output = Result<()>> + Send {
        (**self).set(key, value)
    }

    fn set_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
    ) -> impl Future<Output = Result<bool>> + Send {
        (**self).set_if_absent(key, value)
    }

    fn delete(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        (**self).delete(key)
    }

    fn exists(&self, key: &str) -> impl Future<Output = Result<bool>> + Send {
        (**self).exists(key)
    }

    fn scan_prefix(
        &self,
        prefix: &str,
    ) -> impl Future<Output = Result<Vec<(String, Vec<u8>)>>> + Send {
        (**self).scan_prefix(prefix)
    }
}
