//! Relational data model: collections, experiments, channels/layers, frames
//!
//! Entity rows and their numeric ids belong to the relational store. The core
//! only reads them through the [`Catalog`] trait; [`MemoryCatalog`] is an
//! in-process implementation that also plays the id allocator.
//!
//! ## Schema Overview
//!
//! ```text
//! Collection (1) ──< Experiment (N) ──< ChannelLayer (N)
//!                        │
//!                        └──> CoordinateFrame (shared)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::frame::CoordinateFrame;
use crate::{Error, Result};

/// Default number of resolution levels of a new experiment.
pub const DEFAULT_HIERARCHY_LEVELS: u8 = 8;

/// Top-level namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    /// Primary key
    pub id: u64,
    /// Unique name
    pub name: String,
    /// Free-form description
    pub description: String,
}

/// Dataset within a collection, bound to one coordinate frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    /// Primary key
    pub id: u64,
    /// Owning collection id
    pub collection_id: u64,
    /// Name, unique within the collection
    pub name: String,
    /// Name of the referenced coordinate frame
    pub coord_frame: String,
    /// Number of resolution levels; valid resolutions are `0..num_hierarchy_levels`
    pub num_hierarchy_levels: u8,
    /// Bound on the time axis
    pub max_time_sample: u64,
}

/// Sample type of a channel or layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    /// 8-bit unsigned
    #[default]
    #[serde(rename = "uint8")]
    U8,
    /// 16-bit unsigned
    #[serde(rename = "uint16")]
    U16,
    /// 32-bit unsigned
    #[serde(rename = "uint32")]
    U32,
    /// 64-bit unsigned
    #[serde(rename = "uint64")]
    U64,
}

impl DataType {
    /// Bytes per sample.
    #[must_use]
    pub const fn width(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }
}

/// Raster data within an experiment: a channel (primary) or a layer (derived).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelLayer {
    /// Primary key
    pub id: u64,
    /// Owning experiment id
    pub experiment_id: u64,
    /// Name, unique within the experiment for its kind
    pub name: String,
    /// `true` for a channel, `false` for a layer
    pub is_channel: bool,
    /// Default time step for reads
    pub default_time_step: u64,
    /// Sample type
    pub datatype: DataType,
}

/// Parameters for a new experiment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExperiment {
    /// Experiment name
    pub name: String,
    /// Coordinate frame name
    pub coord_frame: String,
    /// Resolution levels; `None` takes the store's default
    pub num_hierarchy_levels: Option<u8>,
    /// Time bound
    pub max_time_sample: u64,
}

impl NewExperiment {
    /// Experiment over `coord_frame` with default hierarchy and one time sample.
    #[must_use]
    pub fn new(name: impl Into<String>, coord_frame: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            coord_frame: coord_frame.into(),
            num_hierarchy_levels: None,
            max_time_sample: 0,
        }
    }

    /// Set the number of resolution levels.
    #[must_use]
    pub const fn num_hierarchy_levels(mut self, levels: u8) -> Self {
        self.num_hierarchy_levels = Some(levels);
        self
    }

    /// Set the time bound.
    #[must_use]
    pub const fn max_time_sample(mut self, max_time_sample: u64) -> Self {
        self.max_time_sample = max_time_sample;
        self
    }
}

/// Parameters for a new channel or layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannelLayer {
    /// Name
    pub name: String,
    /// Channel vs layer
    pub is_channel: bool,
    /// Default time step
    pub default_time_step: u64,
    /// Sample type
    pub datatype: DataType,
}

impl NewChannelLayer {
    /// A `uint8` channel.
    #[must_use]
    pub fn channel(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_channel: true,
            default_time_step: 1,
            datatype: DataType::default(),
        }
    }

    /// A `uint8` layer.
    #[must_use]
    pub fn layer(name: impl Into<String>) -> Self {
        Self {
            is_channel: false,
            ..Self::channel(name)
        }
    }

    /// Set the sample type.
    #[must_use]
    pub const fn datatype(mut self, datatype: DataType) -> Self {
        self.datatype = datatype;
        self
    }
}

/// Read access to the relational store.
///
/// Lookups are by name within the parent scope, or by id for rows reached
/// through a lookup key. `Ok(None)` means the row does not exist; `Err` is
/// reserved for store failures.
pub trait Catalog: Send + Sync {
    /// Collection by name.
    ///
    /// # Errors
    /// Store failure.
    fn collection(&self, name: &str) -> Result<Option<Collection>>;

    /// Experiment by name within a collection.
    ///
    /// # Errors
    /// Store failure.
    fn experiment(&self, collection: &str, experiment: &str) -> Result<Option<Experiment>>;

    /// Channel or layer by name within an experiment.
    ///
    /// # Errors
    /// Store failure.
    fn channel_layer(
        &self,
        collection: &str,
        experiment: &str,
        name: &str,
    ) -> Result<Option<ChannelLayer>>;

    /// Experiment by id. Unaffected by renames.
    ///
    /// # Errors
    /// Store failure.
    fn experiment_by_id(&self, id: u64) -> Result<Option<Experiment>>;

    /// Channel or layer by id. Unaffected by renames.
    ///
    /// # Errors
    /// Store failure.
    fn channel_layer_by_id(&self, id: u64) -> Result<Option<ChannelLayer>>;

    /// Coordinate frame by name.
    ///
    /// # Errors
    /// Store failure.
    fn coordinate_frame(&self, name: &str) -> Result<Option<CoordinateFrame>>;
}

/// Write access to the relational store, used when entities are created or
/// deleted.
///
/// Implementations allocate the numeric ids that lookup keys are built from;
/// ids must never be reused.
pub trait CatalogWriter: Catalog {
    /// Store a coordinate frame.
    ///
    /// # Errors
    /// [`Error::AlreadyExists`] if the name is taken.
    fn create_coordinate_frame(&self, frame: CoordinateFrame) -> Result<()>;

    /// Insert a collection.
    ///
    /// # Errors
    /// [`Error::AlreadyExists`] if the name is taken.
    fn create_collection(&self, name: &str, description: &str) -> Result<Collection>;

    /// Insert an experiment.
    ///
    /// # Errors
    /// [`Error::NotFound`] for an unknown collection or frame,
    /// [`Error::AlreadyExists`] for a duplicate name.
    fn create_experiment(&self, collection: &str, new: NewExperiment) -> Result<Experiment>;

    /// Insert a channel or layer.
    ///
    /// # Errors
    /// [`Error::NotFound`] for an unknown parent,
    /// [`Error::AlreadyExists`] for a duplicate name.
    fn create_channel_layer(
        &self,
        collection: &str,
        experiment: &str,
        new: NewChannelLayer,
    ) -> Result<ChannelLayer>;

    /// Delete a collection by id with its experiments and channels/layers.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the collection does not exist.
    fn delete_collection(&self, id: u64) -> Result<Collection>;

    /// Delete an experiment by id with its channels/layers.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the experiment does not exist.
    fn delete_experiment(&self, id: u64) -> Result<Experiment>;

    /// Delete a channel or layer by id.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the channel/layer does not exist.
    fn delete_channel_layer(&self, id: u64) -> Result<ChannelLayer>;
}

impl<C: Catalog + ?Sized> Catalog for Arc<C> {
    fn collection(&self, name: &str) -> Result<Option<Collection>> {
        (**self).collection(name)
    }

    fn experiment(&self, collection: &str, experiment: &str) -> Result<Option<Experiment>> {
        (**self).experiment(collection, experiment)
    }

    fn channel_layer(
        &self,
        collection: &str,
        experiment: &str,
        name: &str,
    ) -> Result<Option<ChannelLayer>> {
        (**self).channel_layer(collection, experiment, name)
    }

    fn experiment_by_id(&self, id: u64) -> Result<Option<Experiment>> {
        (**self).experiment_by_id(id)
    }

    fn channel_layer_by_id(&self, id: u64) -> Result<Option<ChannelLayer>> {
        (**self).channel_layer_by_id(id)
    }

    fn coordinate_frame(&self, name: &str) -> Result<Option<CoordinateFrame>> {
        (**self).coordinate_frame(name)
    }
}

impl<C: CatalogWriter + ?Sized> CatalogWriter for Arc<C> {
    fn create_coordinate_frame(&self, frame: CoordinateFrame) -> Result<()> {
        (**self).create_coordinate_frame(frame)
    }

    fn create_collection(&self, name: &str, description: &str) -> Result<Collection> {
        (**self).create_collection(name, description)
    }

    fn create_experiment(&self, collection: &str, new: NewExperiment) -> Result<Experiment> {
        (**self).create_experiment(collection, new)
    }

    fn create_channel_layer(
        &self,
        collection: &str,
        experiment: &str,
        new: NewChannelLayer,
    ) -> Result<ChannelLayer> {
        (**self).create_channel_layer(collection, experiment, new)
    }

    fn delete_collection(&self, id: u64) -> Result<Collection> {
        (**self).delete_collection(id)
    }

    fn delete_experiment(&self, id: u64) -> Result<Experiment> {
        (**self).delete_experiment(id)
    }

    fn delete_channel_layer(&self, id: u64) -> Result<ChannelLayer> {
        (**self).delete_channel_layer(id)
    }
}

/// Rows keyed by `(parent id, name)`; the `*_keys` maps index them by id.
#[derive(Debug, Default)]
struct Tables {
    frames: FxHashMap<String, CoordinateFrame>,
    collections: FxHashMap<String, Collection>,
    experiments: FxHashMap<(u64, String), Experiment>,
    channels: FxHashMap<(u64, String), ChannelLayer>,
    collection_keys: FxHashMap<u64, String>,
    experiment_keys: FxHashMap<u64, (u64, String)>,
    channel_keys: FxHashMap<u64, (u64, String)>,
}

impl Tables {
    fn experiment_id(&self, collection: &str, experiment: &str) -> Option<u64> {
        let collection_id = self.collections.get(collection)?.id;
        self.experiments
            .get(&(collection_id, experiment.to_string()))
            .map(|e| e.id)
    }

    fn remove_channel(&mut self, id: u64) -> Option<ChannelLayer> {
        let key = self.channel_keys.remove(&id)?;
        self.channels.remove(&key)
    }

    fn remove_experiment(&mut self, id: u64) -> Option<Experiment> {
        let key = self.experiment_keys.remove(&id)?;
        let children: Vec<u64> = self
            .channels
            .values()
            .filter(|c| c.experiment_id == id)
            .map(|c| c.id)
            .collect();
        for child in children {
            self.remove_channel(child);
        }
        self.experiments.remove(&key)
    }
}

/// In-memory relational store with monotonic id allocation.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
}

impl MemoryCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Tables>> {
        self.tables
            .read()
            .map_err(|_| Error::BackendUnavailable("catalog lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Tables>> {
        self.tables
            .write()
            .map_err(|_| Error::BackendUnavailable("catalog lock poisoned".to_string()))
    }
}

impl CatalogWriter for MemoryCatalog {
    fn create_coordinate_frame(&self, frame: CoordinateFrame) -> Result<()> {
        let mut tables = self.write()?;
        if tables.frames.contains_key(frame.name()) {
            return Err(Error::AlreadyExists(format!(
                "coordinate frame '{}'",
                frame.name()
            )));
        }
        tables.frames.insert(frame.name().to_string(), frame);
        Ok(())
    }

    fn create_collection(&self, name: &str, description: &str) -> Result<Collection> {
        let mut tables = self.write()?;
        if tables.collections.contains_key(name) {
            return Err(Error::AlreadyExists(format!("collection '{name}'")));
        }
        let collection = Collection {
            id: self.allocate_id(),
            name: name.to_string(),
            description: description.to_string(),
        };
        tables
            .collection_keys
            .insert(collection.id, name.to_string());
        tables
            .collections
            .insert(name.to_string(), collection.clone());
        Ok(collection)
    }

    fn create_experiment(&self, collection: &str, new: NewExperiment) -> Result<Experiment> {
        let mut tables = self.write()?;
        let collection_id = tables
            .collections
            .get(collection)
            .map(|c| c.id)
            .ok_or_else(|| Error::NotFound(format!("collection '{collection}'")))?;
        if !tables.frames.contains_key(&new.coord_frame) {
            return Err(Error::NotFound(format!(
                "coordinate frame '{}'",
                new.coord_frame
            )));
        }
        let key = (collection_id, new.name.clone());
        if tables.experiments.contains_key(&key) {
            return Err(Error::AlreadyExists(format!(
                "experiment '{}' in '{collection}'",
                new.name
            )));
        }
        let experiment = Experiment {
            id: self.allocate_id(),
            collection_id,
            name: new.name,
            coord_frame: new.coord_frame,
            num_hierarchy_levels: new
                .num_hierarchy_levels
                .unwrap_or(DEFAULT_HIERARCHY_LEVELS),
            max_time_sample: new.max_time_sample,
        };
        tables.experiment_keys.insert(experiment.id, key.clone());
        tables.experiments.insert(key, experiment.clone());
        Ok(experiment)
    }

    fn create_channel_layer(
        &self,
        collection: &str,
        experiment: &str,
        new: NewChannelLayer,
    ) -> Result<ChannelLayer> {
        let mut tables = self.write()?;
        let experiment_id = tables
            .experiment_id(collection, experiment)
            .ok_or_else(|| Error::NotFound(format!("experiment '{collection}/{experiment}'")))?;
        // One namespace for channels and layers: boss keys carry no kind
        let key = (experiment_id, new.name.clone());
        if tables.channels.contains_key(&key) {
            return Err(Error::AlreadyExists(format!(
                "channel/layer '{}' in '{collection}/{experiment}'",
                new.name
            )));
        }
        let channel = ChannelLayer {
            id: self.allocate_id(),
            experiment_id,
            name: new.name,
            is_channel: new.is_channel,
            default_time_step: new.default_time_step,
            datatype: new.datatype,
        };
        tables.channel_keys.insert(channel.id, key.clone());
        tables.channels.insert(key, channel.clone());
        Ok(channel)
    }

    fn delete_collection(&self, id: u64) -> Result<Collection> {
        let mut tables = self.write()?;
        let name = tables
            .collection_keys
            .remove(&id)
            .ok_or_else(|| Error::NotFound(format!("collection {id}")))?;
        let children: Vec<u64> = tables
            .experiments
            .values()
            .filter(|e| e.collection_id == id)
            .map(|e| e.id)
            .collect();
        for child in children {
            tables.remove_experiment(child);
        }
        tables
            .collections
            .remove(&name)
            .ok_or_else(|| Error::NotFound(format!("collection '{name}'")))
    }

    fn delete_experiment(&self, id: u64) -> Result<Experiment> {
        self.write()?
            .remove_experiment(id)
            .ok_or_else(|| Error::NotFound(format!("experiment {id}")))
    }

    fn delete_channel_layer(&self, id: u64) -> Result<ChannelLayer> {
        self.write()?
            .remove_channel(id)
            .ok_or_else(|| Error::NotFound(format!("channel/layer {id}")))
    }
}

impl Catalog for MemoryCatalog {
    fn collection(&self, name: &str) -> Result<Option<Collection>> {
        Ok(self.read()?.collections.get(name).cloned())
    }

    fn experiment(&self, collection: &str, experiment: &str) -> Result<Option<Experiment>> {
        let tables = self.read()?;
        let Some(collection_id) = tables.collections.get(collection).map(|c| c.id) else {
            return Ok(None);
        };
        Ok(tables
            .experiments
            .get(&(collection_id, experiment.to_string()))
            .cloned())
    }

    fn channel_layer(
        &self,
        collection: &str,
        experiment: &str,
        name: &str,
    ) -> Result<Option<ChannelLayer>> {
        let tables = self.read()?;
        let Some(experiment_id) = tables.experiment_id(collection, experiment) else {
            return Ok(None);
        };
        Ok(tables
            .channels
            .get(&(experiment_id, name.to_string()))
            .cloned())
    }

    fn experiment_by_id(&self, id: u64) -> Result<Option<Experiment>> {
        let tables = self.read()?;
        Ok(tables
            .experiment_keys
            .get(&id)
            .and_then(|key| tables.experiments.get(key))
            .cloned())
    }

    fn channel_layer_by_id(&self, id: u64) -> Result<Option<ChannelLayer>> {
        let tables = self.read()?;
        Ok(tables
            .channel_keys
            .get(&id)
            .and_then(|key| tables.channels.get(key))
            .cloned())
    }

    fn coordinate_frame(&self, name: &str) -> Result<Option<CoordinateFrame>> {
        Ok(self.read()?.frames.get(name).cloned())
    }
}
