//! Metadata store adapter
//!
//! Free-form string key/value pairs attached to a collection, experiment, or
//! channel/layer. Entries are namespaced by lookup key so renames never move
//! them:
//!
//! ```text
//! meta/{lookup_key}#{meta_key} -> value
//! ```

use tracing::{debug, info};

use crate::kv::KvStore;
use crate::lookup::LookupKey;
use crate::{Error, Result};

const META_PREFIX: &str = "meta/";
const META_SEPARATOR: char = '#';

fn scope(lookup_key: &LookupKey) -> String {
    format!("{META_PREFIX}{lookup_key}{META_SEPARATOR}")
}

fn entry(lookup_key: &LookupKey, meta_key: &str) -> String {
    format!("{}{meta_key}", scope(lookup_key))
}

fn decode(raw: Vec<u8>) -> Result<String> {
    String::from_utf8(raw)
        .map_err(|e| Error::BackendUnavailable(format!("metadata value is not UTF-8: {e}")))
}

/// Metadata CRUD scoped by lookup key.
///
/// # Example
///
/// ```rust
/// use bosscore::kv::MemoryKvStore;
/// use bosscore::lookup::LookupKey;
/// use bosscore::metadb::MetaDb;
///
/// # async fn example() -> bosscore::Result<()> {
/// let db = MetaDb::new(MemoryKvStore::new());
/// let key = LookupKey::collection(1);
///
/// db.create(&key, "species", "mouse").await?;
/// assert_eq!(db.get(&key, "species").await?, "mouse");
/// assert_eq!(db.list(&key).await?, vec!["species".to_string()]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MetaDb<S: KvStore> {
    store: S,
}

impl<S: KvStore> MetaDb<S> {
    /// Create an adapter over the given store.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Value of `meta_key` under `lookup_key`.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the key is absent.
    pub async fn get(&self, lookup_key: &LookupKey, meta_key: &str) -> Result<String> {
        match self.store.get(&entry(lookup_key, meta_key)).await? {
            Some(raw) => decode(raw),
            None => Err(Error::NotFound(format!(
                "metadata key '{meta_key}' under {lookup_key}"
            ))),
        }
    }

    /// All metadata keys under `lookup_key`, sorted.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the scope holds no keys.
    pub async fn list(&self, lookup_key: &LookupKey) -> Result<Vec<String>> {
        let scope = scope(lookup_key);
        let keys: Vec<String> = self
            .store
            .scan_prefix(&scope)
            .await?
            .into_iter()
            .filter_map(|(key, _)| key.strip_prefix(&scope).map(str::to_string))
            .collect();
        if keys.is_empty() {
            return Err(Error::NotFound(format!("no metadata under {lookup_key}")));
        }
        Ok(keys)
    }

    /// Create `meta_key`; exactly one of several racing creators succeeds.
    ///
    /// # Errors
    /// [`Error::AlreadyExists`] if the key is present.
    pub async fn create(&self, lookup_key: &LookupKey, meta_key: &str, value: &str) -> Result<()> {
        let written = self
            .store
            .set_if_absent(&entry(lookup_key, meta_key), value.as_bytes().to_vec())
            .await?;
        if !written {
            debug!(lookup_key = %lookup_key, meta_key, "metadata create collided");
            return Err(Error::AlreadyExists(format!(
                "metadata key '{meta_key}' under {lookup_key}"
            )));
        }
        info!(lookup_key = %lookup_key, meta_key, "metadata created");
        Ok(())
    }

    /// Upsert `meta_key`. No existence precondition.
    ///
    /// # Errors
    /// [`Error::BackendUnavailable`] on store failure.
    pub async fn update(&self, lookup_key: &LookupKey, meta_key: &str, value: &str) -> Result<()> {
        self.store
            .set(&entry(lookup_key, meta_key), value.as_bytes().to_vec())
            .await?;
        info!(lookup_key = %lookup_key, meta_key, "metadata updated");
        Ok(())
    }

    /// Delete `meta_key`.
    ///
    /// # Errors
    /// [`Error::NotFound`] if nothing was deleted.
    pub async fn delete(&self, lookup_key: &LookupKey, meta_key: &str) -> Result<()> {
        if !self.store.delete(&entry(lookup_key, meta_key)).await? {
            return Err(Error::NotFound(format!(
                "metadata key '{meta_key}' under {lookup_key}"
            )));
        }
        info!(lookup_key = %lookup_key, meta_key, "metadata deleted");
        Ok(())
    }

    /// Delete every entry under `lookup_key`; returns how many were removed.
    ///
    /// # Errors
    /// [`Error::BackendUnavailable`] on store failure.
    pub async fn purge(&self, lookup_key: &LookupKey) -> Result<usize> {
        let mut removed = 0;
        for (key, _) in self.store.scan_prefix(&scope(lookup_key)).await? {
            if self.store.delete(&key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
