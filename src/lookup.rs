//! Lookup keys: rename-resistant identities for collections, experiments, and channels
//!
//! A lookup key is the sequence of ancestor ids ending in the entity's own id,
//! e.g. `[3, 7, 12]` for channel 12 of experiment 7 of collection 3. On the
//! wire (and in store keys) it is written `3&7&12`. The human counterpart,
//! the boss key, joins names the same way: `col1&exp1&channel1`.
//!
//! ## Store layout
//!
//! ```text
//! lookup/{lookup_key}  -> LookupRecord (JSON)
//! bosskey/{boss_key}   -> lookup_key
//! ```
//!
//! Metadata and cutout storage is keyed on the lookup key only, so a rename
//! rewrites the `bosskey/` index and nothing else.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::kv::KvStore;
use crate::{Error, Result};

/// Separator between components of lookup and boss keys.
pub const KEY_SEPARATOR: char = '&';

const LOOKUP_PREFIX: &str = "lookup/";
const BOSS_KEY_PREFIX: &str = "bosskey/";

/// Maximum depth: collection, experiment, channel/layer.
pub const MAX_DEPTH: usize = 3;

/// Ordered ancestor ids identifying one entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LookupKey(Vec<u64>);

impl LookupKey {
    /// Key of a top-level collection.
    #[must_use]
    pub fn collection(id: u64) -> Self {
        Self(vec![id])
    }

    /// Key of a child entity under `self`.
    ///
    /// # Errors
    /// [`Error::InvalidName`] if `self` is already at channel depth.
    pub fn child(&self, id: u64) -> Result<Self> {
        if self.0.len() >= MAX_DEPTH {
            return Err(Error::InvalidName(format!(
                "lookup key {self} cannot have children"
            )));
        }
        let mut ids = self.0.clone();
        ids.push(id);
        Ok(Self(ids))
    }

    /// Parent key, `None` for a collection.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        match self.0.split_last() {
            Some((_, rest)) if !rest.is_empty() => Some(Self(rest.to_vec())),
            _ => None,
        }
    }

    /// Ancestor ids, root first.
    #[must_use]
    pub fn ids(&self) -> &[u64] {
        &self.0
    }

    /// Number of components (1 = collection, 3 = channel/layer).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// `true` if `self` is a strict descendant of `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, ancestor: &Self) -> bool {
        self.0.len() > ancestor.0.len() && self.0.starts_with(&ancestor.0)
    }
}

impl fmt::Display for LookupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{KEY_SEPARATOR}")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

impl FromStr for LookupKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let ids = s
            .split(KEY_SEPARATOR)
            .map(str::parse::<u64>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::BackendUnavailable(format!("corrupt lookup key '{s}': {e}")))?;
        if ids.len() > MAX_DEPTH {
            return Err(Error::BackendUnavailable(format!(
                "corrupt lookup key '{s}': too many components"
            )));
        }
        Ok(Self(ids))
    }
}

impl TryFrom<String> for LookupKey {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<LookupKey> for String {
    fn from(key: LookupKey) -> Self {
        key.to_string()
    }
}

/// Human names addressing one entity, root first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceNames {
    /// Collection name
    pub collection: String,
    /// Experiment name
    pub experiment: Option<String>,
    /// Channel or layer name
    pub channel: Option<String>,
}

impl ResourceNames {
    /// Names from path segments; at most three, at least one.
    ///
    /// # Errors
    /// [`Error::NotFound`] for an empty path, [`Error::InvalidName`] for more
    /// than three segments.
    pub fn from_segments<S: AsRef<str>>(segments: &[S]) -> Result<Self> {
        match segments {
            [] => Err(Error::NotFound("empty resource path".to_string())),
            [c] => Ok(Self::collection(c.as_ref())),
            [c, e] => Ok(Self::experiment(c.as_ref(), e.as_ref())),
            [c, e, ch] => Ok(Self::channel(c.as_ref(), e.as_ref(), ch.as_ref())),
            _ => Err(Error::InvalidName(format!(
                "resource path has {} segments, at most {MAX_DEPTH} allowed",
                segments.len()
            ))),
        }
    }

    /// A collection.
    #[must_use]
    pub fn collection(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            experiment: None,
            channel: None,
        }
    }

    /// An experiment.
    #[must_use]
    pub fn experiment(collection: impl Into<String>, experiment: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            experiment: Some(experiment.into()),
            channel: None,
        }
    }

    /// A channel or layer.
    #[must_use]
    pub fn channel(
        collection: impl Into<String>,
        experiment: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            collection: collection.into(),
            experiment: Some(experiment.into()),
            channel: Some(channel.into()),
        }
    }

    /// Non-empty name segments, root first. A channel without an experiment
    /// is truncated at the collection.
    #[must_use]
    pub fn segments(&self) -> Vec<&str> {
        let mut segments = vec![self.collection.as_str()];
        if let Some(experiment) = &self.experiment {
            segments.push(experiment);
            if let Some(channel) = &self.channel {
                segments.push(channel);
            }
        }
        segments
    }

    /// Boss key: names joined by [`KEY_SEPARATOR`].
    #[must_use]
    pub fn boss_key(&self) -> String {
        self.segments().join(&KEY_SEPARATOR.to_string())
    }
}

/// Persisted mapping between a lookup key and its human names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupRecord {
    lookup_key: LookupKey,
    names: ResourceNames,
    max_time_sample: Option<u64>,
    created_at: DateTime<Utc>,
}

impl LookupRecord {
    /// The lookup key.
    #[must_use]
    pub const fn lookup_key(&self) -> &LookupKey {
        &self.lookup_key
    }

    /// Current human names.
    #[must_use]
    pub const fn names(&self) -> &ResourceNames {
        &self.names
    }

    /// Current boss key.
    #[must_use]
    pub fn boss_key(&self) -> String {
        self.names.boss_key()
    }

    /// Time bound recorded for channels and layers.
    #[must_use]
    pub const fn max_time_sample(&self) -> Option<u64> {
        self.max_time_sample
    }

    /// When the mapping was first registered.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// One entity to register: its own id and name under an optional parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    /// Parent lookup key; `None` for a collection
    pub parent: Option<LookupKey>,
    /// Entity id allocated by the relational store
    pub id: u64,
    /// Entity name
    pub name: String,
    /// Time bound carried on channel/layer records
    pub max_time_sample: Option<u64>,
}

impl Registration {
    /// Register a collection.
    #[must_use]
    pub fn collection(id: u64, name: impl Into<String>) -> Self {
        Self {
            parent: None,
            id,
            name: name.into(),
            max_time_sample: None,
        }
    }

    /// Register a child of `parent`.
    #[must_use]
    pub fn child(parent: LookupKey, id: u64, name: impl Into<String>) -> Self {
        Self {
            parent: Some(parent),
            id,
            name: name.into(),
            max_time_sample: None,
        }
    }

    /// Attach a time bound.
    #[must_use]
    pub const fn max_time_sample(mut self, max_time_sample: u64) -> Self {
        self.max_time_sample = Some(max_time_sample);
        self
    }
}

/// Reject names that cannot appear in a boss key.
///
/// # Errors
/// [`Error::InvalidName`] for empty names or names containing `&` or `/`.
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidName("entity name must not be empty".to_string()));
    }
    if name.contains(KEY_SEPARATOR) || name.contains('/') {
        return Err(Error::InvalidName(format!(
            "entity name '{name}' must not contain '{KEY_SEPARATOR}' or '/'"
        )));
    }
    Ok(())
}

fn lookup_entry(key: &LookupKey) -> String {
    format!("{LOOKUP_PREFIX}{key}")
}

fn boss_key_entry(boss_key: &str) -> String {
    format!("{BOSS_KEY_PREFIX}{boss_key}")
}

/// Single writer and reader of the lookup key mapping.
#[derive(Debug)]
pub struct LookupKeyResolver<S: KvStore> {
    store: S,
}

impl<S: KvStore + Clone> Clone for LookupKeyResolver<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: KvStore> LookupKeyResolver<S> {
    /// Create a resolver over the given store.
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    /// Register an entity, returning its lookup key.
    ///
    /// Idempotent: registering an id that already has a mapping returns the
    /// existing key, leaves its record untouched and restores its boss key
    /// index entry.
    ///
    /// # Errors
    /// - [`Error::InvalidName`] for names that cannot be encoded
    /// - [`Error::NotFound`] if the parent is not registered
    /// - [`Error::BackendUnavailable`] on store failure
    pub async fn register(&self, registration: Registration) -> Result<LookupKey> {
        validate_name(&registration.name)?;

        let (lookup_key, names) = match &registration.parent {
            None => (
                LookupKey::collection(registration.id),
                ResourceNames::collection(&registration.name),
            ),
            Some(parent) => {
                let parent_record = self.reverse(parent).await?;
                let mut names = parent_record.names.clone();
                if names.experiment.is_none() {
                    names.experiment = Some(registration.name.clone());
                } else {
                    names.channel = Some(registration.name.clone());
                }
                (parent.child(registration.id)?, names)
            }
        };

        let record = LookupRecord {
            lookup_key: lookup_key.clone(),
            names,
            max_time_sample: registration.max_time_sample,
            created_at: Utc::now(),
        };
        let written = self
            .store
            .set_if_absent(&lookup_entry(&lookup_key), serde_json::to_vec(&record)?)
            .await?;
        let record = if written {
            record
        } else {
            debug!(lookup_key = %lookup_key, "lookup key already registered");
            self.reverse(&lookup_key).await?
        };

        // Rewritten on every call so a registration cut short between the two
        // writes is completed by a retry. Racing registrants write the same value.
        self.store
            .set(&boss_key_entry(&record.boss_key()), lookup_key.to_string().into_bytes())
            .await?;
        if written {
            info!(lookup_key = %lookup_key, boss_key = %record.boss_key(), "registered lookup key");
        }
        Ok(lookup_key)
    }

    /// Resolve human names to a lookup key by walking the parent chain.
    ///
    /// # Errors
    /// [`Error::NotFound`] naming the first segment that does not exist.
    pub async fn resolve(&self, names: &ResourceNames) -> Result<LookupKey> {
        let segments = names.segments();
        let mut resolved: Option<LookupKey> = None;

        for depth in 1..=segments.len() {
            let boss_key = segments[..depth].join(&KEY_SEPARATOR.to_string());
            let Some(raw) = self.store.get(&boss_key_entry(&boss_key)).await? else {
                debug!(boss_key = %boss_key, "boss key not registered");
                return Err(Error::NotFound(format!(
                    "'{}' does not exist under '{}'",
                    segments[depth - 1],
                    segments[..depth - 1].join("/")
                )));
            };
            let key: LookupKey = String::from_utf8(raw)
                .map_err(|e| Error::BackendUnavailable(format!("corrupt boss key index: {e}")))?
                .parse()?;
            if key.depth() != depth || key.parent() != resolved {
                return Err(Error::BackendUnavailable(format!(
                    "boss key '{boss_key}' maps to {key}, which is not a child of its parent"
                )));
            }
            resolved = Some(key);
        }

        resolved.ok_or_else(|| Error::NotFound("empty resource path".to_string()))
    }

    /// Inverse mapping: the record registered for `lookup_key`.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the key was never registered.
    pub async fn reverse(&self, lookup_key: &LookupKey) -> Result<LookupRecord> {
        let raw = self
            .store
            .get(&lookup_entry(lookup_key))
            .await?
            .ok_or_else(|| Error::NotFound(format!("lookup key {lookup_key} is not registered")))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Rename an entity. Descendant boss keys follow; lookup keys never change.
    ///
    /// # Errors
    /// - [`Error::InvalidName`] for names that cannot be encoded
    /// - [`Error::AlreadyExists`] if a sibling already uses `new_name`
    /// - [`Error::NotFound`] if `lookup_key` is not registered
    pub async fn rename(&self, lookup_key: &LookupKey, new_name: &str) -> Result<()> {
        validate_name(new_name)?;
        let depth = lookup_key.depth();

        let mut affected = vec![self.reverse(lookup_key).await?];
        affected.extend(self.descendants(lookup_key).await?);

        let mut renamed_names = affected[0].names.clone();
        set_segment(&mut renamed_names, depth, new_name);
        let renamed_boss_key = renamed_names.boss_key();
        if renamed_boss_key == affected[0].boss_key() {
            return Ok(());
        }
        if self.store.exists(&boss_key_entry(&renamed_boss_key)).await? {
            return Err(Error::AlreadyExists(format!(
                "'{renamed_boss_key}' is already registered"
            )));
        }

        for mut record in affected {
            let old_boss_key = record.boss_key();
            set_segment(&mut record.names, depth, new_name);
            self.store.delete(&boss_key_entry(&old_boss_key)).await?;
            self.store
                .set(
                    &boss_key_entry(&record.boss_key()),
                    record.lookup_key.to_string().into_bytes(),
                )
                .await?;
            self.store
                .set(&lookup_entry(&record.lookup_key), serde_json::to_vec(&record)?)
                .await?;
        }
        info!(lookup_key = %lookup_key, boss_key = %renamed_boss_key, "renamed entity");
        Ok(())
    }

    /// Remove the mapping of an entity and all of its descendants.
    ///
    /// Returns the removed lookup keys.
    ///
    /// # Errors
    /// [`Error::NotFound`] if `lookup_key` is not registered.
    pub async fn unregister(&self, lookup_key: &LookupKey) -> Result<Vec<LookupKey>> {
        let mut affected = vec![self.reverse(lookup_key).await?];
        affected.extend(self.descendants(lookup_key).await?);

        let mut removed = Vec::with_capacity(affected.len());
        for record in affected {
            self.store.delete(&boss_key_entry(&record.boss_key())).await?;
            self.store.delete(&lookup_entry(&record.lookup_key)).await?;
            removed.push(record.lookup_key);
        }
        info!(lookup_key = %lookup_key, removed = removed.len(), "unregistered lookup keys");
        Ok(removed)
    }

    async fn descendants(&self, lookup_key: &LookupKey) -> Result<Vec<LookupRecord>> {
        let prefix = format!("{LOOKUP_PREFIX}{lookup_key}{KEY_SEPARATOR}");
        self.store
            .scan_prefix(&prefix)
            .await?
            .into_iter()
            .map(|(_, raw)| serde_json::from_slice(&raw).map_err(Error::from))
            .collect()
    }
}

fn set_segment(names: &mut ResourceNames, depth: usize, name: &str) {
    match depth {
        1 => names.collection = name.to_string(),
        2 => names.experiment = Some(name.to_string()),
        _ => names.channel = Some(name.to_string()),
    }
}
