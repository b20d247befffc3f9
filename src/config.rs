//! Engine configuration
//!
//! Every field has a default, so a partial JSON document (or none at all) is a
//! valid configuration.
//!
//! ```rust
//! use bosscore::config::EngineConfig;
//! use bosscore::cutout::Compression;
//!
//! # fn main() -> bosscore::Result<()> {
//! let config = EngineConfig::from_json(r#"{"compression": "zstd", "zstd_level": 9}"#)?;
//! assert_eq!(config.compression, Compression::Zstd);
//! assert!(config.shuffle);
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::catalog::DEFAULT_HIERARCHY_LEVELS;
use crate::cutout::{Compression, CutoutCodec};
use crate::{telemetry, Error, Result};

/// Largest decompressed cutout accepted by default (512 MiB).
pub const DEFAULT_MAX_CUTOUT_BYTES: u64 = 512 * 1024 * 1024;

/// Runtime configuration of a [`BossService`](crate::service::BossService).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Block compressor for cutouts
    pub compression: Compression,
    /// ZSTD level, ignored for LZ4
    pub zstd_level: i32,
    /// Byte-shuffle samples before compression
    pub shuffle: bool,
    /// Decode incoming cutout payloads and check their size before storing
    pub verify_payload: bool,
    /// Upper bound on `voxels * element width` of a single cutout
    pub max_cutout_bytes: u64,
    /// Hierarchy depth assumed for experiments created through the service
    pub default_hierarchy_levels: u8,
    /// `tracing` filter directive used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            zstd_level: 3,
            shuffle: true,
            verify_payload: true,
            max_cutout_bytes: DEFAULT_MAX_CUTOUT_BYTES,
            default_hierarchy_levels: DEFAULT_HIERARCHY_LEVELS,
            log_filter: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] for malformed JSON or out-of-range values.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges.
    ///
    /// # Errors
    /// [`Error::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if !(1..=22).contains(&self.zstd_level) {
            return Err(Error::InvalidConfig(format!(
                "zstd_level must be within 1..=22, got {}",
                self.zstd_level
            )));
        }
        if self.max_cutout_bytes == 0 {
            return Err(Error::InvalidConfig(
                "max_cutout_bytes must be positive".to_string(),
            ));
        }
        if self.default_hierarchy_levels == 0 {
            return Err(Error::InvalidConfig(
                "default_hierarchy_levels must be positive".to_string(),
            ));
        }
        EnvFilter::try_new(&self.log_filter).map_err(|e| {
            Error::InvalidConfig(format!("log_filter '{}' is invalid: {e}", self.log_filter))
        })?;
        Ok(())
    }

    /// Install the global `tracing` subscriber with [`EngineConfig::log_filter`]
    /// as the fallback filter. See [`telemetry::init_tracing`].
    pub fn init_tracing(&self) -> bool {
        telemetry::init_tracing(&self.log_filter)
    }

    /// Codec described by this configuration.
    #[must_use]
    pub const fn codec(&self) -> CutoutCodec {
        CutoutCodec::new(self.compression)
            .with_zstd_level(self.zstd_level)
            .with_shuffle(self.shuffle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.compression, Compression::Lz4);
        assert_eq!(config.zstd_level, 3);
        assert!(config.verify_payload);
        assert_eq!(config.max_cutout_bytes, DEFAULT_MAX_CUTOUT_BYTES);
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_document() {
        let config =
            EngineConfig::from_json(r#"{"shuffle": false, "max_cutout_bytes": 1024}"#).unwrap();
        assert!(!config.shuffle);
        assert_eq!(config.max_cutout_bytes, 1024);
        assert_eq!(config.compression, Compression::Lz4);
    }

    #[test]
    fn test_invalid_documents() {
        for bad in [
            "not json",
            r#"{"compression": "gzip"}"#,
            r#"{"zstd_level": 0}"#,
            r#"{"max_cutout_bytes": 0}"#,
            r#"{"log_filter": "bosscore=loud"}"#,
        ] {
            let err = EngineConfig::from_json(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfig, "input {bad}");
        }
    }

    #[test]
    fn test_log_filter_drives_tracing() {
        let config = EngineConfig::from_json(r#"{"log_filter": "bosscore=debug"}"#).unwrap();
        assert_eq!(config.log_filter, "bosscore=debug");
        config.init_tracing();
        // Global subscriber is installed at most once per process
        assert!(!config.init_tracing());
    }

    #[test]
    fn test_codec_follows_config() {
        let config = EngineConfig {
            compression: Compression::Zstd,
            zstd_level: 7,
            shuffle: false,
            ..EngineConfig::default()
        };
        let codec = config.codec();
        assert_eq!(codec.compression(), Compression::Zstd);
        assert_eq!(codec.zstd_level(), 7);
        assert!(!codec.shuffle());
    }
}
