//! Cutouts: compressed sub-volumes of a channel or layer
//!
//! A [`Cutout`] addresses a rectangular region of one channel/layer at one
//! resolution. [`CutoutStore`] reads and writes [`CompressedBlock`]s under
//! that address; [`CutoutCodec`] converts between raw samples and blocks.
//!
//! ```rust
//! use bosscore::cutout::{Cutout, CutoutCodec, CutoutStore};
//! use bosscore::catalog::DataType;
//! use bosscore::frame::{AxisRange, Extent};
//! use bosscore::kv::MemoryKvStore;
//! use bosscore::lookup::LookupKey;
//!
//! # async fn example() -> bosscore::Result<()> {
//! let store = CutoutStore::new(MemoryKvStore::new(), CutoutCodec::default());
//! let key = LookupKey::collection(1).child(2)?.child(3)?;
//! let extent = Extent::new(AxisRange::new(0, 5), AxisRange::new(0, 6), AxisRange::new(0, 2));
//! let cutout = Cutout::new(key, 2, extent, DataType::U8);
//!
//! let block = CutoutCodec::default().encode(&[1u8; 60], 1)?;
//! store.write(&cutout, block.clone()).await?;
//! assert_eq!(store.read(&cutout).await?, block);
//! # Ok(())
//! # }
//! ```

mod codec;
mod store;

pub use codec::{Compression, CutoutCodec};
pub use store::CutoutStore;

use serde::{Deserialize, Serialize};

use crate::catalog::DataType;
use crate::frame::Extent;
use crate::lookup::LookupKey;

/// Opaque compressed payload exchanged with callers and the block store.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CompressedBlock(Vec<u8>);

impl CompressedBlock {
    /// Wrap compressed bytes.
    #[must_use]
    pub const fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Compressed bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Unwrap into the compressed bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Compressed size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` for a zero-length payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for CompressedBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompressedBlock({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for CompressedBlock {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

/// Validated address of a sub-volume.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cutout {
    /// Channel/layer identity
    pub lookup_key: LookupKey,
    /// Resolution level
    pub resolution: u8,
    /// Ranges at `resolution`
    pub extent: Extent,
    /// Sample type, fixing the element width
    pub datatype: DataType,
}

impl Cutout {
    /// Address a sub-volume. Callers validate the extent first.
    #[must_use]
    pub const fn new(
        lookup_key: LookupKey,
        resolution: u8,
        extent: Extent,
        datatype: DataType,
    ) -> Self {
        Self {
            lookup_key,
            resolution,
            extent,
            datatype,
        }
    }

    /// Number of samples covered, `None` on overflow.
    #[must_use]
    pub fn voxel_count(&self) -> Option<u64> {
        self.extent.voxel_count()
    }

    /// Decompressed size in bytes, `None` on overflow.
    #[must_use]
    pub fn byte_len(&self) -> Option<u64> {
        self.voxel_count()?
            .checked_mul(self.datatype.width() as u64)
    }

    /// Block store key: `cutout/{lookup_key}/{resolution}/{x}/{y}/{z}/{t}`.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!(
            "cutout/{}/{}/{}",
            self.lookup_key, self.resolution, self.extent
        )
    }
}
