//! Cutout block codec
//!
//! Lossless LZ4/ZSTD compression of dense voxel arrays, optionally preceded
//! by a byte shuffle on the sample width (the same transform blosc applies).
//! Shuffling groups the n-th byte of every sample together, which turns the
//! mostly-zero high bytes of `uint16`/`uint64` data into long runs.

use serde::{Deserialize, Serialize};

use super::CompressedBlock;
use crate::{Error, Result};

/// Compression algorithm for cutout blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// LZ4 - Fast compression, good for interactive cutouts (default)
    #[default]
    Lz4,
    /// ZSTD - Better ratio, slower
    Zstd,
}

impl Compression {
    /// Get algorithm name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    /// Compress data using this algorithm
    ///
    /// # Errors
    /// Returns error if compression fails (e.g., ZSTD internal error)
    pub fn compress(&self, data: &[u8], zstd_level: i32) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Self::Zstd => zstd::encode_all(data, zstd_level).map_err(|e| {
                Error::BackendUnavailable(format!("ZSTD compression failed: {e}"))
            }),
        }
    }

    /// Decompress data using this algorithm
    ///
    /// # Errors
    /// Returns [`Error::InvalidPayload`] if the data is corrupted or was
    /// produced by a different algorithm
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Self::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| Error::InvalidPayload(format!("LZ4 decompression failed: {e}"))),
            Self::Zstd => zstd::decode_all(data)
                .map_err(|e| Error::InvalidPayload(format!("ZSTD decompression failed: {e}"))),
        }
    }

    /// Decompress data that must not expand past `max_len` bytes.
    ///
    /// The limit is enforced before the output buffer is allocated, so an
    /// untrusted block cannot claim an arbitrary size.
    ///
    /// # Errors
    /// Returns [`Error::InvalidPayload`] if the data is corrupted or its
    /// decompressed size exceeds `max_len`
    pub fn decompress_bounded(&self, data: &[u8], max_len: usize) -> Result<Vec<u8>> {
        if data.is_empty() {
            return Ok(Vec::new());
        }
        match self {
            Self::Lz4 => {
                let header: [u8; 4] = data
                    .get(..4)
                    .and_then(|h| h.try_into().ok())
                    .ok_or_else(|| Error::InvalidPayload("LZ4 block has no size header".to_string()))?;
                let claimed = u32::from_le_bytes(header);
                if usize::try_from(claimed).map_or(true, |len| len > max_len) {
                    return Err(Error::InvalidPayload(format!(
                        "LZ4 block claims {claimed} bytes, limit is {max_len}"
                    )));
                }
                self.decompress(data)
            }
            Self::Zstd => zstd::bulk::decompress(data, max_len).map_err(|e| {
                Error::InvalidPayload(format!(
                    "ZSTD decompression failed within {max_len} bytes: {e}"
                ))
            }),
        }
    }
}

/// Byte-shuffle `data` viewed as samples of `width` bytes.
fn shuffle(data: &[u8], width: usize) -> Vec<u8> {
    let samples = data.len() / width;
    let mut out = vec![0u8; data.len()];
    for (i, sample) in data.chunks_exact(width).enumerate() {
        for (b, byte) in sample.iter().enumerate() {
            out[b * samples + i] = *byte;
        }
    }
    out
}

/// Inverse of [`shuffle`].
fn unshuffle(data: &[u8], width: usize) -> Vec<u8> {
    let samples = data.len() / width;
    let mut out = vec![0u8; data.len()];
    for (i, sample) in out.chunks_exact_mut(width).enumerate() {
        for (b, byte) in sample.iter_mut().enumerate() {
            *byte = data[b * samples + i];
        }
    }
    out
}

/// Encoder/decoder between raw sample bytes and [`CompressedBlock`]s.
///
/// # Example
///
/// ```rust
/// use bosscore::cutout::{Compression, CutoutCodec};
///
/// # fn main() -> bosscore::Result<()> {
/// let codec = CutoutCodec::new(Compression::Lz4);
/// let raw: Vec<u8> = (0u16..60).flat_map(u16::to_le_bytes).collect();
///
/// let block = codec.encode(&raw, 2)?;
/// assert_eq!(codec.decode(&block, 2)?, raw);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CutoutCodec {
    compression: Compression,
    zstd_level: i32,
    shuffle: bool,
}

impl Default for CutoutCodec {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

impl CutoutCodec {
    /// Codec with shuffling enabled and ZSTD level 3.
    #[must_use]
    pub const fn new(compression: Compression) -> Self {
        Self {
            compression,
            zstd_level: 3,
            shuffle: true,
        }
    }

    /// Set the ZSTD level.
    #[must_use]
    pub const fn with_zstd_level(mut self, level: i32) -> Self {
        self.zstd_level = level;
        self
    }

    /// Enable or disable the byte shuffle.
    #[must_use]
    pub const fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Compression algorithm.
    #[must_use]
    pub const fn compression(&self) -> Compression {
        self.compression
    }

    /// ZSTD level.
    #[must_use]
    pub const fn zstd_level(&self) -> i32 {
        self.zstd_level
    }

    /// Whether samples are shuffled before compression.
    #[must_use]
    pub const fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Compress raw samples of `width` bytes each.
    ///
    /// # Errors
    /// [`Error::InvalidPayload`] if `width` is zero or `raw` is not a whole
    /// number of samples.
    pub fn encode(&self, raw: &[u8], width: usize) -> Result<CompressedBlock> {
        check_width(raw.len(), width)?;
        let compressed = if self.shuffle && width > 1 {
            self.compression
                .compress(&shuffle(raw, width), self.zstd_level)?
        } else {
            self.compression.compress(raw, self.zstd_level)?
        };
        Ok(CompressedBlock::new(compressed))
    }

    /// Decompress a block back into raw samples of `width` bytes each.
    ///
    /// # Errors
    /// [`Error::InvalidPayload`] if the block is corrupt or does not hold a
    /// whole number of samples.
    pub fn decode(&self, block: &CompressedBlock, width: usize) -> Result<Vec<u8>> {
        let data = self.compression.decompress(block.as_bytes())?;
        self.finish_decode(data, width)
    }

    /// [`CutoutCodec::decode`] for untrusted blocks: fails before allocating
    /// when the block would expand past `max_len` bytes.
    ///
    /// # Errors
    /// As [`CutoutCodec::decode`], plus [`Error::InvalidPayload`] when the
    /// decompressed size exceeds `max_len`.
    pub fn decode_bounded(
        &self,
        block: &CompressedBlock,
        width: usize,
        max_len: usize,
    ) -> Result<Vec<u8>> {
        let data = self
            .compression
            .decompress_bounded(block.as_bytes(), max_len)?;
        self.finish_decode(data, width)
    }

    fn finish_decode(&self, data: Vec<u8>, width: usize) -> Result<Vec<u8>> {
        check_width(data.len(), width)?;
        if self.shuffle && width > 1 {
            Ok(unshuffle(&data, width))
        } else {
            Ok(data)
        }
    }

    /// Block holding `samples` zero-valued samples of `width` bytes.
    ///
    /// # Errors
    /// Same as [`CutoutCodec::encode`].
    pub fn zeros(&self, samples: usize, width: usize) -> Result<CompressedBlock> {
        let len = samples
            .checked_mul(width)
            .ok_or_else(|| Error::InvalidPayload("zero block size overflows".to_string()))?;
        self.encode(&vec![0u8; len], width)
    }
}

fn check_width(len: usize, width: usize) -> Result<()> {
    if width == 0 {
        return Err(Error::InvalidPayload("sample width must be positive".to_string()));
    }
    if len % width != 0 {
        return Err(Error::InvalidPayload(format!(
            "{len} bytes is not a whole number of {width}-byte samples"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_compression_as_str() {
        assert_eq!(Compression::Lz4.as_str(), "lz4");
        assert_eq!(Compression::Zstd.as_str(), "zstd");
    }

    #[test]
    fn test_compression_default() {
        assert_eq!(Compression::default(), Compression::Lz4);
    }

    #[test]
    fn test_empty_data_compression() {
        for compression in [Compression::Lz4, Compression::Zstd] {
            let compressed = compression.compress(&[], 3).unwrap();
            assert!(compressed.is_empty());
            assert!(compression.decompress(&compressed).unwrap().is_empty());
        }
    }

    #[test]
    fn test_compresses_repeated_data() {
        let data = vec![0u8; 10000];
        for compression in [Compression::Lz4, Compression::Zstd] {
            let compressed = compression.compress(&data, 3).unwrap();
            // >10x on zeros
            assert!(compressed.len() < data.len() / 10);
        }
    }

    #[test]
    fn test_shuffle_layout() {
        // Two little-endian u16 samples: 0x0201, 0x0403
        let raw = [0x01, 0x02, 0x03, 0x04];
        assert_eq!(shuffle(&raw, 2), vec![0x01, 0x03, 0x02, 0x04]);
        assert_eq!(unshuffle(&shuffle(&raw, 2), 2), raw.to_vec());
    }

    #[test]
    fn test_shuffle_improves_wide_samples() {
        let raw: Vec<u8> = (0u64..4096).flat_map(|v| (v % 200).to_le_bytes()).collect();
        let plain = CutoutCodec::new(Compression::Lz4).with_shuffle(false);
        let shuffled = CutoutCodec::new(Compression::Lz4);

        let a = plain.encode(&raw, 8).unwrap();
        let b = shuffled.encode(&raw, 8).unwrap();
        assert!(b.len() < a.len());
        assert_eq!(shuffled.decode(&b, 8).unwrap(), raw);
    }

    #[test]
    fn test_width_mismatch_rejected() {
        let codec = CutoutCodec::default();
        assert_eq!(
            codec.encode(&[1, 2, 3], 2).unwrap_err().kind(),
            ErrorKind::InvalidPayload
        );
        assert_eq!(
            codec.encode(&[1, 2], 0).unwrap_err().kind(),
            ErrorKind::InvalidPayload
        );
    }

    #[test]
    fn test_corrupt_block_rejected() {
        let codec = CutoutCodec::new(Compression::Zstd);
        let block = CompressedBlock::new(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(
            codec.decode(&block, 1).unwrap_err().kind(),
            ErrorKind::InvalidPayload
        );
    }

    #[test]
    fn test_bounded_decode_rejects_oversized_lz4_header() {
        let codec = CutoutCodec::new(Compression::Lz4);
        // Header claims 4 GiB
        let block = CompressedBlock::new(vec![0xff, 0xff, 0xff, 0xff, 0x00, 0x00]);
        let err = codec.decode_bounded(&block, 1, 64).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPayload);
        assert!(err.to_string().contains("limit is 64"));

        let truncated = CompressedBlock::new(vec![0x01, 0x00]);
        assert_eq!(
            codec.decode_bounded(&truncated, 1, 64).unwrap_err().kind(),
            ErrorKind::InvalidPayload
        );
    }

    #[test]
    fn test_bounded_decode_limits() {
        let raw = vec![7u8; 4096];
        for compression in [Compression::Lz4, Compression::Zstd] {
            let codec = CutoutCodec::new(compression);
            let block = codec.encode(&raw, 1).unwrap();

            assert_eq!(codec.decode_bounded(&block, 1, raw.len()).unwrap(), raw);
            let err = codec.decode_bounded(&block, 1, raw.len() - 1).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidPayload, "{compression:?}");
        }
    }

    #[test]
    fn test_zeros() {
        let codec = CutoutCodec::default();
        let block = codec.zeros(60, 4).unwrap();
        assert_eq!(codec.decode(&block, 4).unwrap(), vec![0u8; 240]);
    }
}
