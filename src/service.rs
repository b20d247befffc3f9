//! Request handling entry point
//!
//! [`BossService`] wires the request parser to the metadata and cutout
//! adapters and maps each [`Operation`] onto one of them. It also exposes the
//! entity lifecycle used by the CRUD layer: insert the row, then register its
//! lookup key; on delete, drop the rows, keys and metadata of the subtree.
//!
//! ```rust
//! use bosscore::catalog::{MemoryCatalog, NewChannelLayer, NewExperiment};
//! use bosscore::frame::CoordinateFrame;
//! use bosscore::kv::MemoryKvStore;
//! use bosscore::request::{Operation, RawRequest};
//! use bosscore::service::{BossService, Response};
//!
//! # async fn example() -> bosscore::Result<()> {
//! let service = BossService::builder(MemoryKvStore::new(), MemoryCatalog::new()).build()?;
//! service.create_coordinate_frame(CoordinateFrame::builder("cf1").x(0, 512).y(0, 512).z(0, 16).build()?)?;
//! service.create_collection("col1", "").await?;
//! service.create_experiment("col1", NewExperiment::new("exp1", "cf1")).await?;
//! service.create_channel_layer("col1", "exp1", NewChannelLayer::channel("em")).await?;
//!
//! let request = RawRequest::metadata(Operation::Create, "col1/exp1/em")
//!     .param("key", "modality")
//!     .param("value", "EM");
//! assert_eq!(service.handle(&request, None).await?, Response::Created);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog::{
    Catalog, CatalogWriter, ChannelLayer, Collection, Experiment, NewChannelLayer, NewExperiment,
};
use crate::config::EngineConfig;
use crate::cutout::{CompressedBlock, Cutout, CutoutCodec, CutoutStore};
use crate::frame::CoordinateFrame;
use crate::kv::KvStore;
use crate::lookup::{validate_name, LookupKey, LookupKeyResolver, Registration, ResourceNames};
use crate::metadb::MetaDb;
use crate::request::{
    MetaArgs, NoViews, Operation, RawRequest, RequestParser, ResolvedRequest, Target, ViewResolver,
};
use crate::{Error, Result};

/// Successful outcome of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Metadata keys under the resource
    Keys(Vec<String>),
    /// One metadata entry
    Meta {
        /// Metadata key
        key: String,
        /// Metadata value
        value: String,
    },
    /// Cutout payload
    Block(CompressedBlock),
    /// Entry or block created
    Created,
    /// Entry updated
    Updated,
    /// Entry deleted
    Deleted,
}

impl Response {
    /// HTTP-style status of this outcome.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Keys(_) | Self::Meta { .. } | Self::Block(_) | Self::Updated => 200,
            Self::Created => 201,
            Self::Deleted => 204,
        }
    }
}

/// Core service: parser plus metadata and cutout adapters over shared stores.
#[derive(Debug)]
pub struct BossService<S: KvStore, C: Catalog, V: ViewResolver = NoViews> {
    parser: RequestParser<Arc<S>, Arc<C>, V>,
    metadb: MetaDb<Arc<S>>,
    cutouts: CutoutStore<Arc<S>>,
    config: EngineConfig,
}

/// Builder for [`BossService`].
#[derive(Debug)]
pub struct BossServiceBuilder<S: KvStore, C: Catalog, V: ViewResolver> {
    store: Arc<S>,
    catalog: Arc<C>,
    views: V,
    config: EngineConfig,
}

impl<S: KvStore, C: Catalog> BossService<S, C, NoViews> {
    /// Start building a service over a key/value store and a catalog.
    #[must_use]
    pub fn builder(store: S, catalog: C) -> BossServiceBuilder<S, C, NoViews> {
        BossServiceBuilder {
            store: Arc::new(store),
            catalog: Arc::new(catalog),
            views: NoViews,
            config: EngineConfig::default(),
        }
    }
}

impl<S: KvStore, C: Catalog, V: ViewResolver> BossServiceBuilder<S, C, V> {
    /// Set the engine configuration.
    #[must_use]
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a view-token resolver.
    #[must_use]
    pub fn views<W: ViewResolver>(self, views: W) -> BossServiceBuilder<S, C, W> {
        BossServiceBuilder {
            store: self.store,
            catalog: self.catalog,
            views,
            config: self.config,
        }
    }

    /// Build the service.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] if the configuration is out of range.
    pub fn build(self) -> Result<BossService<S, C, V>> {
        self.config.validate()?;
        let codec: CutoutCodec = self.config.codec();
        let resolver = LookupKeyResolver::new(Arc::clone(&self.store));
        Ok(BossService {
            parser: RequestParser::new(
                resolver,
                self.catalog,
                self.views,
                self.config.max_cutout_bytes,
            ),
            metadb: MetaDb::new(Arc::clone(&self.store)),
            cutouts: CutoutStore::new(self.store, codec),
            config: self.config,
        })
    }
}

impl<S: KvStore, C: Catalog, V: ViewResolver> BossService<S, C, V> {
    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Lookup key resolver over the shared store.
    #[must_use]
    pub const fn resolver(&self) -> &LookupKeyResolver<Arc<S>> {
        self.parser.resolver()
    }

    /// Metadata adapter over the shared store.
    #[must_use]
    pub const fn metadb(&self) -> &MetaDb<Arc<S>> {
        &self.metadb
    }

    /// Cutout adapter over the shared store.
    #[must_use]
    pub const fn cutouts(&self) -> &CutoutStore<Arc<S>> {
        &self.cutouts
    }

    /// Codec matching the configuration, for callers building payloads.
    #[must_use]
    pub const fn codec(&self) -> CutoutCodec {
        self.cutouts.codec()
    }

    /// Parse a request without executing it.
    ///
    /// # Errors
    /// See [`RequestParser::parse`].
    pub async fn parse(&self, request: &RawRequest) -> Result<ResolvedRequest> {
        self.parser.parse(request).await
    }

    /// Parse and execute a request. `body` is the payload of cutout writes.
    ///
    /// # Errors
    /// Any parse error, plus the adapter errors of the operation.
    pub async fn handle(
        &self,
        request: &RawRequest,
        body: Option<CompressedBlock>,
    ) -> Result<Response> {
        let resolved = match self.parser.parse(request).await {
            Ok(resolved) => resolved,
            Err(e) => {
                debug!(error = %e, code = e.code(), "request rejected");
                return Err(e);
            }
        };
        let result = match resolved.target {
            Target::Metadata(args) => {
                self.handle_metadata(resolved.operation, &resolved.lookup_key, args)
                    .await
            }
            Target::Cutout(cutout) => self.handle_cutout(resolved.operation, &cutout, body).await,
        };
        if let Err(e) = &result {
            if e.status() >= 500 {
                warn!(lookup_key = %resolved.lookup_key, error = %e, "request failed");
            }
        }
        result
    }

    async fn handle_metadata(
        &self,
        operation: Operation,
        lookup_key: &LookupKey,
        args: MetaArgs,
    ) -> Result<Response> {
        let missing = || Error::MissingArgument("query parameter 'key'".to_string());
        match (operation, args.key) {
            (Operation::Get, None) => Ok(Response::Keys(self.metadb.list(lookup_key).await?)),
            (Operation::Get, Some(key)) => {
                let value = self.metadb.get(lookup_key, &key).await?;
                Ok(Response::Meta { key, value })
            }
            (Operation::Create, Some(key)) => {
                let value = args.value.ok_or_else(missing)?;
                self.metadb.create(lookup_key, &key, &value).await?;
                Ok(Response::Created)
            }
            (Operation::Update, Some(key)) => {
                let value = args.value.ok_or_else(missing)?;
                self.metadb.update(lookup_key, &key, &value).await?;
                Ok(Response::Updated)
            }
            (Operation::Delete, Some(key)) => {
                self.metadb.delete(lookup_key, &key).await?;
                Ok(Response::Deleted)
            }
            (_, None) => Err(missing()),
        }
    }

    async fn handle_cutout(
        &self,
        operation: Operation,
        cutout: &Cutout,
        body: Option<CompressedBlock>,
    ) -> Result<Response> {
        match operation {
            Operation::Get => Ok(Response::Block(self.cutouts.read(cutout).await?)),
            Operation::Create | Operation::Update => {
                let block =
                    body.ok_or_else(|| Error::MissingArgument("cutout payload".to_string()))?;
                if self.config.verify_payload {
                    self.verify_payload(cutout, &block)?;
                }
                self.cutouts.write(cutout, block).await?;
                Ok(Response::Created)
            }
            Operation::Delete => Err(Error::MethodNotAllowed(
                "cutouts cannot be deleted".to_string(),
            )),
        }
    }

    fn verify_payload(&self, cutout: &Cutout, block: &CompressedBlock) -> Result<()> {
        let width = cutout.datatype.width();
        let expected = cutout
            .byte_len()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::InvalidPayload(format!("extent {} overflows", cutout.extent)))?;
        let decoded = self.codec().decode_bounded(block, width, expected)?;
        if decoded.len() != expected {
            return Err(Error::InvalidPayload(format!(
                "payload decodes to {} bytes, extent {} of {width}-byte samples needs {expected}",
                decoded.len(),
                cutout.extent,
            )));
        }
        Ok(())
    }
}

impl<S: KvStore, C: CatalogWriter, V: ViewResolver> BossService<S, C, V> {
    fn catalog(&self) -> &Arc<C> {
        self.parser.catalog()
    }

    /// Store a coordinate frame in the catalog.
    ///
    /// # Errors
    /// [`Error::AlreadyExists`] if the name is taken.
    pub fn create_coordinate_frame(&self, frame: CoordinateFrame) -> Result<()> {
        self.catalog().create_coordinate_frame(frame)
    }

    /// Create a collection and register its lookup key.
    ///
    /// # Errors
    /// [`Error::InvalidName`] for unencodable names, checked before the row
    /// is inserted. Catalog errors otherwise.
    pub async fn create_collection(&self, name: &str, description: &str) -> Result<Collection> {
        validate_name(name)?;
        let collection = self.catalog().create_collection(name, description)?;
        self.resolver()
            .register(Registration::collection(collection.id, &collection.name))
            .await?;
        Ok(collection)
    }

    /// Create an experiment and register its lookup key. Experiments without
    /// an explicit hierarchy depth get the configured default.
    ///
    /// # Errors
    /// [`Error::InvalidName`] for unencodable names, catalog errors,
    /// [`Error::NotFound`] if the collection has no lookup key.
    pub async fn create_experiment(
        &self,
        collection: &str,
        mut new: NewExperiment,
    ) -> Result<Experiment> {
        validate_name(&new.name)?;
        let parent = self
            .resolver()
            .resolve(&ResourceNames::collection(collection))
            .await?;
        new.num_hierarchy_levels
            .get_or_insert(self.config.default_hierarchy_levels);
        let experiment = self.catalog().create_experiment(collection, new)?;
        self.resolver()
            .register(Registration::child(parent, experiment.id, &experiment.name))
            .await?;
        Ok(experiment)
    }

    /// Create a channel or layer and register its lookup key, recording the
    /// experiment's time bound on the mapping.
    ///
    /// # Errors
    /// [`Error::InvalidName`] for unencodable names, catalog errors,
    /// [`Error::NotFound`] if the experiment has no lookup key.
    pub async fn create_channel_layer(
        &self,
        collection: &str,
        experiment: &str,
        new: NewChannelLayer,
    ) -> Result<ChannelLayer> {
        validate_name(&new.name)?;
        let parent = self
            .resolver()
            .resolve(&ResourceNames::experiment(collection, experiment))
            .await?;
        let max_time_sample = self
            .catalog()
            .experiment(collection, experiment)?
            .map_or(0, |e| e.max_time_sample);
        let channel = self
            .catalog()
            .create_channel_layer(collection, experiment, new)?;
        self.resolver()
            .register(
                Registration::child(parent, channel.id, &channel.name)
                    .max_time_sample(max_time_sample),
            )
            .await?;
        Ok(channel)
    }

    /// Delete a collection with everything under it: catalog rows, lookup
    /// keys and metadata.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the collection does not exist.
    pub async fn delete_collection(&self, collection: &str) -> Result<()> {
        let key = self
            .resolver()
            .resolve(&ResourceNames::collection(collection))
            .await?;
        self.catalog().delete_collection(key.ids()[0])?;
        self.forget(&key).await
    }

    /// Delete an experiment with its channels/layers.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the experiment does not exist.
    pub async fn delete_experiment(&self, collection: &str, experiment: &str) -> Result<()> {
        let key = self
            .resolver()
            .resolve(&ResourceNames::experiment(collection, experiment))
            .await?;
        self.catalog().delete_experiment(key.ids()[1])?;
        self.forget(&key).await
    }

    /// Delete a channel or layer.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the channel/layer does not exist.
    pub async fn delete_channel_layer(
        &self,
        collection: &str,
        experiment: &str,
        name: &str,
    ) -> Result<()> {
        let key = self
            .resolver()
            .resolve(&ResourceNames::channel(collection, experiment, name))
            .await?;
        self.catalog().delete_channel_layer(key.ids()[2])?;
        self.forget(&key).await
    }

    /// Drop the lookup keys and metadata of a deleted subtree. Cutout blocks
    /// stay behind; ids are never reused so nothing can address them again.
    async fn forget(&self, key: &LookupKey) -> Result<()> {
        let removed = self.resolver().unregister(key).await?;
        let mut purged = 0;
        for lookup_key in &removed {
            purged += self.metadb.purge(lookup_key).await?;
        }
        info!(lookup_key = %key, keys = removed.len(), metadata = purged, "deleted entity");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MemoryCatalog;
    use crate::kv::MemoryKvStore;
    use crate::ErrorKind;

    type Service = BossService<MemoryKvStore, MemoryCatalog>;

    async fn service() -> Service {
        let service = BossService::builder(MemoryKvStore::new(), MemoryCatalog::new())
            .build()
            .unwrap();
        service
            .create_coordinate_frame(
                CoordinateFrame::builder("cf1")
                    .x(0, 1000)
                    .y(0, 1000)
                    .z(0, 1000)
                    .voxel_size(4.0, 4.0, 4.0)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        service.create_collection("col1", "").await.unwrap();
        service
            .create_experiment("col1", NewExperiment::new("exp1", "cf1"))
            .await
            .unwrap();
        service
            .create_channel_layer("col1", "exp1", NewChannelLayer::channel("channel1"))
            .await
            .unwrap();
        service
    }

    #[test]
    fn test_response_status() {
        assert_eq!(Response::Keys(vec![]).status(), 200);
        assert_eq!(Response::Created.status(), 201);
        assert_eq!(Response::Updated.status(), 200);
        assert_eq!(Response::Deleted.status(), 204);
    }

    #[tokio::test]
    async fn test_creation_registers_lookup_keys() {
        let service = service().await;
        let key = service
            .resolver()
            .resolve(&ResourceNames::channel("col1", "exp1", "channel1"))
            .await
            .unwrap();
        assert_eq!(key.to_string(), "1&2&3");
    }

    #[tokio::test]
    async fn test_create_under_unknown_parent() {
        let service = service().await;
        let err = service
            .create_experiment("nope", NewExperiment::new("e", "cf1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_metadata_flow() {
        let service = service().await;
        let create = RawRequest::metadata(Operation::Create, "col1/exp1")
            .param("key", "a")
            .param("value", "1");

        assert_eq!(service.handle(&create, None).await.unwrap(), Response::Created);
        let err = service.handle(&create, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);

        let get = RawRequest::metadata(Operation::Get, "col1/exp1").param("key", "a");
        assert_eq!(
            service.handle(&get, None).await.unwrap(),
            Response::Meta {
                key: "a".to_string(),
                value: "1".to_string()
            }
        );

        let list = RawRequest::metadata(Operation::Get, "col1/exp1");
        assert_eq!(
            service.handle(&list, None).await.unwrap(),
            Response::Keys(vec!["a".to_string()])
        );

        let delete = RawRequest::metadata(Operation::Delete, "col1/exp1").param("key", "a");
        assert_eq!(service.handle(&delete, None).await.unwrap(), Response::Deleted);
        assert_eq!(
            service.handle(&get, None).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[tokio::test]
    async fn test_cutout_write_requires_body() {
        let service = service().await;
        let request =
            RawRequest::cutout(Operation::Create, "col1/exp1/channel1/2/0:5/0:6/0:2").unwrap();
        let err = service.handle(&request, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingArgument);
    }

    #[tokio::test]
    async fn test_cutout_payload_verified() {
        let service = service().await;
        let request =
            RawRequest::cutout(Operation::Create, "col1/exp1/channel1/2/0:5/0:6/0:2").unwrap();

        let short = service.codec().encode(&[1u8; 59], 1).unwrap();
        let err = service.handle(&request, Some(short)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPayload);

        let garbage = CompressedBlock::new(vec![60, 0, 0, 0, 0xff, 0xff, 0xff, 0xff]);
        let err = service.handle(&request, Some(garbage)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPayload);
    }

    #[tokio::test]
    async fn test_invalid_name_leaves_no_catalog_row() {
        let service = service().await;
        for _ in 0..2 {
            let err = service.create_collection("a&b", "").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidName);
        }
        assert!(service.catalog().collection("a&b").unwrap().is_none());

        let err = service
            .create_experiment("col1", NewExperiment::new("e/1", "cf1"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName);
        assert!(service.catalog().experiment("col1", "e/1").unwrap().is_none());

        for _ in 0..2 {
            let err = service
                .create_channel_layer("col1", "exp1", NewChannelLayer::layer(""))
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidName);
        }
        assert!(service.catalog().channel_layer("col1", "exp1", "").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_channel_purges_metadata() {
        let service = service().await;
        let meta = RawRequest::metadata(Operation::Create, "col1/exp1/channel1")
            .param("key", "a")
            .param("value", "1");
        service.handle(&meta, None).await.unwrap();
        let key = service
            .resolver()
            .resolve(&ResourceNames::channel("col1", "exp1", "channel1"))
            .await
            .unwrap();

        service
            .delete_channel_layer("col1", "exp1", "channel1")
            .await
            .unwrap();

        assert_eq!(
            service.metadb().list(&key).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert!(service.catalog().channel_layer_by_id(3).unwrap().is_none());
        let err = service
            .delete_channel_layer("col1", "exp1", "channel1")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Same name again gets a new key
        let channel = service
            .create_channel_layer("col1", "exp1", NewChannelLayer::channel("channel1"))
            .await
            .unwrap();
        assert_ne!(channel.id, 3);
    }

    #[tokio::test]
    async fn test_oversized_payload_rejected_before_decoding() {
        let service = service().await;
        let request =
            RawRequest::cutout(Operation::Create, "col1/exp1/channel1/2/0:5/0:6/0:2").unwrap();
        // LZ4 header claiming 4 GiB for a 60 byte cutout
        let bomb = CompressedBlock::new(vec![0xff, 0xff, 0xff, 0xff, 0x00]);
        let err = service.handle(&request, Some(bomb)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPayload);
    }

    #[tokio::test]
    async fn test_cutout_delete_not_allowed() {
        let service = service().await;
        let request =
            RawRequest::cutout(Operation::Delete, "col1/exp1/channel1/2/0:5/0:6/0:2").unwrap();
        let err = service.handle(&request, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MethodNotAllowed);
        assert_eq!(err.status(), 405);
    }

    #[tokio::test]
    async fn test_default_hierarchy_from_config() {
        let config = EngineConfig {
            default_hierarchy_levels: 3,
            ..EngineConfig::default()
        };
        let service = BossService::builder(MemoryKvStore::new(), MemoryCatalog::new())
            .config(config)
            .build()
            .unwrap();
        service
            .create_coordinate_frame(
                CoordinateFrame::builder("cf1").x(0, 64).y(0, 64).z(0, 4).build().unwrap(),
            )
            .unwrap();
        service.create_collection("c", "").await.unwrap();
        let exp = service
            .create_experiment("c", NewExperiment::new("e", "cf1"))
            .await
            .unwrap();
        assert_eq!(exp.num_hierarchy_levels, 3);
        let exp = service
            .create_experiment("c", NewExperiment::new("f", "cf1").num_hierarchy_levels(5))
            .await
            .unwrap();
        assert_eq!(exp.num_hierarchy_levels, 5);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let config = EngineConfig {
            max_cutout_bytes: 0,
            ..EngineConfig::default()
        };
        let err = BossService::builder(MemoryKvStore::new(), MemoryCatalog::new())
            .config(config)
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }
}
