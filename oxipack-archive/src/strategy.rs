//! Strategy selection.
//!
//! A strategy tag is resolved once, when the archiver is built. Unknown tags
//! are rejected there so a pack or unpack never starts with a codec it cannot
//! use.

use crate::codec::{Codec, ExternalTool, LzmaCompressor};
use crate::config::ArchiveConfig;
use oxipack_core::error::{ArchiveError, Result};
use std::fmt;
use std::str::FromStr;

/// Available block compressor implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// In-process LZMA over the entry stream.
    InProcess,
    /// External tool over the whole directory.
    External,
}

impl Strategy {
    /// All strategies, in order of preference.
    pub const ALL: [Strategy; 2] = [Strategy::InProcess, Strategy::External];

    /// Canonical tag.
    pub fn tag(self) -> &'static str {
        match self {
            Strategy::InProcess => "lzma",
            Strategy::External => "external",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for Strategy {
    type Err = ArchiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lzma" | "in-process" | "managed" => Ok(Strategy::InProcess),
            "external" | "7z" => Ok(Strategy::External),
            other => Err(ArchiveError::configuration(format!(
                "unknown strategy '{}' (expected one of: lzma, in-process, managed, external, 7z)",
                other
            ))),
        }
    }
}

/// Resolve a configuration into a strategy and a ready codec.
pub fn select(config: &ArchiveConfig) -> Result<(Strategy, Codec)> {
    let strategy: Strategy = config.strategy.parse()?;
    config.validate()?;

    let codec = match strategy {
        Strategy::InProcess => Codec::Stream(Box::new(LzmaCompressor::new(
            config.lzma_level(),
            config.dict_size,
        ))),
        Strategy::External => Codec::Directory(Box::new(ExternalTool::new(&config.external)?)),
    };

    tracing::debug!(%strategy, codec = codec.name(), "strategy selected");
    Ok((strategy, codec))
}
