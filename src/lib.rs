//! # bosscore: Resource-to-Key Resolution and Spatial Cutout Addressing
//!
//! **Version**: 0.1.0
//!
//! bosscore sits between an HTTP front end and the storage layers of a
//! volumetric imaging archive. It resolves human-readable resource names
//! (`collection/experiment/channel`) into stable numeric lookup keys, checks
//! requested 3D/4D regions against the experiment's coordinate frame, and
//! routes metadata and compressed cutout operations to their stores.
//!
//! ## Layers
//!
//! - [`lookup`]: name → lookup key mapping, stable across renames
//! - [`frame`]: coordinate frames, extents, and per-resolution bounds checks
//! - [`request`]: route/parameter parsing into a [`request::ResolvedRequest`]
//! - [`metadb`] and [`cutout`]: storage adapters over a [`kv::KvStore`]
//! - [`service`]: request dispatch and entity registration
//!
//! ## Example Usage
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
//! service.create_coordinate_frame(
//!     CoordinateFrame::builder("cf1").x(0, 1000).y(0, 1000).z(0, 1000).build()?,
//! )?;
//! service.create_collection("col1", "").await?;
//! service.create_experiment("col1", NewExperiment::new("exp1", "cf1")).await?;
//! service.create_channel_layer("col1", "exp1", NewChannelLayer::channel("channel1")).await?;
//!
//! let route = "col1/exp1/channel1/2/0:5/0:6/0:2";
//! let raw = vec![7u8; 5 * 6 * 2];
//! let block = service.codec().encode(&raw, 1)?;
//!
//! let write = RawRequest::cutout(Operation::Create, route)?;
//! assert_eq!(service.handle(&write, Some(block.clone())).await?, Response::Created);
//!
//! let read = RawRequest::cutout(Operation::Get, route)?;
//! assert_eq!(service.handle(&read, None).await?, Response::Block(block));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod catalog;
pub mod config;
pub mod cutout;
pub mod error;
pub mod frame;
pub mod kv;
pub mod lookup;
pub mod metadb;
pub mod request;
pub mod service;
pub mod telemetry;

pub use error::{Error, ErrorKind, Result};
