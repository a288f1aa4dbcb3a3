//! Archiver configuration.
//!
//! Deserialized from TOML by the command line front end; every field has a
//! default so an empty document is a valid configuration.
//!
//! ```toml
//! strategy = "lzma"
//! level = 9
//! dict_size = 16777216
//!
//! [external]
//! program = "7z"
//! ```

use oxipack_core::error::{ArchiveError, Result};
use oxipack_lzma::LzmaLevel;
use serde::{Deserialize, Serialize};

/// Smallest dictionary accepted as an override.
pub const MIN_DICT_SIZE: u32 = 4 * 1024;

/// Largest dictionary accepted as an override.
pub const MAX_DICT_SIZE: u32 = 1536 * 1024 * 1024;

/// Settings for an [`crate::Archiver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Strategy tag (see [`crate::Strategy`]).
    pub strategy: String,
    /// LZMA level 0-9; larger values are clamped.
    pub level: u8,
    /// Explicit dictionary size for the in-process codec.
    pub dict_size: Option<u32>,
    /// External tool settings.
    pub external: ExternalToolConfig,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            strategy: "lzma".to_string(),
            level: LzmaLevel::DEFAULT.level(),
            dict_size: None,
            external: ExternalToolConfig::default(),
        }
    }
}

impl ArchiveConfig {
    /// Configuration for a given strategy tag, other fields defaulted.
    pub fn with_strategy(strategy: impl Into<String>) -> Self {
        Self {
            strategy: strategy.into(),
            ..Self::default()
        }
    }

    /// The level as an [`LzmaLevel`].
    pub fn lzma_level(&self) -> LzmaLevel {
        LzmaLevel::new(self.level)
    }

    /// Check the numeric settings.
    pub fn validate(&self) -> Result<()> {
        match self.dict_size {
            Some(size) if !(MIN_DICT_SIZE..=MAX_DICT_SIZE).contains(&size) => {
                Err(ArchiveError::configuration(format!(
                    "dict_size {} is outside {}..={}",
                    size, MIN_DICT_SIZE, MAX_DICT_SIZE
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Command line template for an external compressor.
///
/// `{archive}`, `{source}` and `{dest}` are replaced by the artifact path, the
/// directory being packed and the directory being unpacked into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExternalToolConfig {
    /// Program name or path.
    pub program: String,
    /// Arguments for packing; must mention `{archive}` and `{source}`.
    pub compress_args: Vec<String>,
    /// Arguments for unpacking; must mention `{archive}` and `{dest}`.
    pub extract_args: Vec<String>,
}

impl Default for ExternalToolConfig {
    fn default() -> Self {
        Self {
            program: "7z".to_string(),
            compress_args: ["a", "-t7z", "-mx=5", "-ms=on", "-y", "{archive}", "{source}/*"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            extract_args: ["x", "-y", "-o{dest}", "{archive}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ArchiveConfig::default();
        assert_eq!(config.strategy, "lzma");
        assert_eq!(config.level, 6);
        assert_eq!(config.dict_size, None);
        assert_eq!(config.external.program, "7z");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config: ArchiveConfig = toml::from_str("").unwrap();
        assert_eq!(config, ArchiveConfig::default());
    }

    #[test]
    fn test_parse_toml() {
        let config: ArchiveConfig = toml::from_str(
            r#"
            strategy = "external"
            level = 9
            dict_size = 1048576

            [external]
            program = "tar"
            compress_args = ["-cf", "{archive}", "-C", "{source}", "."]
            extract_args = ["-xf", "{archive}", "-C", "{dest}"]
            "#,
        )
        .unwrap();
        assert_eq!(config.strategy, "external");
        assert_eq!(config.lzma_level().level(), 9);
        assert_eq!(config.dict_size, Some(1 << 20));
        assert_eq!(config.external.program, "tar");
        assert_eq!(config.external.extract_args.len(), 4);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        assert!(toml::from_str::<ArchiveConfig>("compression = 3").is_err());
    }

    #[test]
    fn test_level_is_clamped() {
        let config = ArchiveConfig {
            level: 42,
            ..ArchiveConfig::default()
        };
        assert_eq!(config.lzma_level().level(), 9);
    }

    #[test]
    fn test_dict_size_bounds() {
        let mut config = ArchiveConfig::default();
        config.dict_size = Some(MIN_DICT_SIZE - 1);
        assert!(matches!(
            config.validate().unwrap_err(),
            ArchiveError::Configuration { .. }
        ));
        config.dict_size = Some(MAX_DICT_SIZE);
        assert!(config.validate().is_ok());
    }
}
