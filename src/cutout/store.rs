//! Block store adapter for cutouts.

use tracing::debug;

use super::{CompressedBlock, Cutout, CutoutCodec};
use crate::kv::KvStore;
use crate::{Error, Result};

/// Reads and writes compressed cutouts keyed by [`Cutout::storage_key`].
///
/// The store is content-agnostic: `write` stores the caller's bytes verbatim
/// and `read` returns them verbatim. Ranges are assumed to be validated.
/// Concurrent writes to the same address are last-write-wins.
#[derive(Debug)]
pub struct CutoutStore<S: KvStore> {
    store: S,
    codec: CutoutCodec,
}

impl<S: KvStore> CutoutStore<S> {
    /// Create a cutout store. `codec` is used for blocks of never-written
    /// regions, which read as zeros.
    #[must_use]
    pub const fn new(store: S, codec: CutoutCodec) -> Self {
        Self { store, codec }
    }

    /// Codec used for zero blocks.
    #[must_use]
    pub const fn codec(&self) -> CutoutCodec {
        self.codec
    }

    /// Read the block stored at `cutout`, or a zero-filled block if the
    /// address was never written.
    ///
    /// # Errors
    /// [`Error::BackendUnavailable`] on store failure.
    pub async fn read(&self, cutout: &Cutout) -> Result<CompressedBlock> {
        let key = cutout.storage_key();
        if let Some(bytes) = self.store.get(&key).await? {
            debug!(key = %key, bytes = bytes.len(), "cutout read");
            return Ok(CompressedBlock::new(bytes));
        }

        let samples = cutout
            .voxel_count()
            .and_then(|n| usize::try_from(n).ok())
            .ok_or_else(|| Error::OutOfBounds(format!("cutout {key} is too large")))?;
        debug!(key = %key, samples, "cutout not written, returning zeros");
        self.codec.zeros(samples, cutout.datatype.width())
    }

    /// Store `block` at `cutout`, replacing any previous block.
    ///
    /// # Errors
    /// [`Error::BackendUnavailable`] on store failure.
    pub async fn write(&self, cutout: &Cutout, block: CompressedBlock) -> Result<()> {
        let key = cutout.storage_key();
        debug!(key = %key, bytes = block.len(), "cutout write");
        self.store.set(&key, block.into_bytes()).await
    }

    /// Remove the block at `cutout`; returns whether one existed.
    ///
    /// # Errors
    /// [`Error::BackendUnavailable`] on store failure.
    pub async fn delete(&self, cutout: &Cutout) -> Result<bool> {
        self.store.delete(&cutout.storage_key()).await
    }
}
