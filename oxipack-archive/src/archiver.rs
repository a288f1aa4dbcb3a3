//! The archiver facade.
//!
//! An [`Archiver`] is bound to one codec when it is built. Callers use the
//! same four operations whichever capability the codec has; the stream and
//! directory paths only diverge inside [`crate::writer`] and
//! [`crate::reader`].

use crate::codec::{Codec, DirectoryCompressor, StreamCompressor};
use crate::config::ArchiveConfig;
use crate::reader::{self, UnpackError, UnpackOptions};
use crate::strategy::{self, Strategy};
use crate::writer;
use oxipack_core::error::{ArchiveError, Result};
use oxipack_core::progress::ProgressSink;
use serde::Serialize;
use std::path::Path;

/// Error returned by [`Archiver::pack`].
pub type PackError = ArchiveError;

/// Counters for one pack or unpack.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArchiveStats {
    /// Regular files packed or extracted.
    pub files: u64,
    /// Sum of their sizes.
    pub content_bytes: u64,
    /// Length of the entry stream (0 with an external tool).
    pub stream_bytes: u64,
    /// Size of the artifact.
    pub artifact_bytes: u64,
}

impl ArchiveStats {
    /// Artifact size relative to the content size.
    pub fn ratio(&self) -> f64 {
        if self.content_bytes == 0 {
            1.0
        } else {
            self.artifact_bytes as f64 / self.content_bytes as f64
        }
    }
}

/// Result of [`measure`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectorySize {
    /// Regular files.
    pub files: u64,
    /// Total bytes.
    pub bytes: u64,
}

/// One record of an artifact as reported by [`Archiver::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntrySummary {
    /// Canonical relative path; directory markers end in `/`.
    pub path: String,
    /// Content size.
    pub size: u64,
}

/// Size of the tree that [`Archiver::pack`] would record for `source`.
pub fn measure(source: &Path) -> Result<DirectorySize> {
    writer::measure(source)
}

/// Packs directories into artifacts and back.
#[derive(Debug)]
pub struct Archiver {
    codec: Codec,
    strategy: Strategy,
}

impl Archiver {
    /// Build an archiver from a configuration.
    ///
    /// An unknown strategy tag or an out-of-range setting is rejected here
    /// with [`ArchiveError::Configuration`].
    pub fn new(config: &ArchiveConfig) -> Result<Self> {
        let (strategy, codec) = strategy::select(config)?;
        Ok(Self { codec, strategy })
    }

    /// Build an archiver around a custom stream compressor.
    pub fn with_stream_compressor(compressor: Box<dyn StreamCompressor>) -> Self {
        Self {
            codec: Codec::Stream(compressor),
            strategy: Strategy::InProcess,
        }
    }

    /// Build an archiver around a custom directory compressor.
    pub fn with_directory_compressor(compressor: Box<dyn DirectoryCompressor>) -> Self {
        Self {
            codec: Codec::Directory(compressor),
            strategy: Strategy::External,
        }
    }

    /// Selected strategy.
    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Bound codec.
    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Pack the tree under `source` into the artifact `dest`.
    ///
    /// The artifact appears at `dest` only if every step succeeds; on failure
    /// nothing is left there.
    pub fn pack(
        &self,
        source: &Path,
        dest: &Path,
        progress: &mut dyn ProgressSink,
    ) -> std::result::Result<ArchiveStats, PackError> {
        tracing::debug!(source = %source.display(), dest = %dest.display(), codec = self.codec.name(), "pack");
        match &self.codec {
            Codec::Stream(compressor) => writer::pack_stream(source, dest, compressor.as_ref(), progress),
            Codec::Directory(tool) => writer::pack_directory(source, dest, tool.as_ref(), progress),
        }
    }

    /// Unpack `artifact` into `dest`, replacing whatever `dest` held.
    pub fn unpack(
        &self,
        artifact: &Path,
        dest: &Path,
        progress: &mut dyn ProgressSink,
    ) -> std::result::Result<ArchiveStats, UnpackError> {
        self.unpack_with(artifact, dest, progress, &UnpackOptions::default())
    }

    /// [`Archiver::unpack`] with extra options.
    pub fn unpack_with(
        &self,
        artifact: &Path,
        dest: &Path,
        progress: &mut dyn ProgressSink,
        options: &UnpackOptions,
    ) -> std::result::Result<ArchiveStats, UnpackError> {
        tracing::debug!(artifact = %artifact.display(), dest = %dest.display(), codec = self.codec.name(), "unpack");
        match &self.codec {
            Codec::Stream(compressor) => {
                reader::unpack_stream(artifact, dest, compressor.as_ref(), progress, options)
            }
            Codec::Directory(tool) => {
                reader::unpack_directory(artifact, dest, tool.as_ref(), progress, options)
            }
        }
    }

    /// List the records of an artifact in stream order.
    ///
    /// Needs the entry stream, so it fails with
    /// [`ArchiveError::Configuration`] for an external tool.
    pub fn list(&self, artifact: &Path) -> Result<Vec<EntrySummary>> {
        match &self.codec {
            Codec::Stream(compressor) => reader::list_stream(artifact, compressor.as_ref()),
            Codec::Directory(tool) => Err(ArchiveError::configuration(format!(
                "listing requires the in-process codec, not '{}'",
                tool.name()
            ))),
        }
    }
}
