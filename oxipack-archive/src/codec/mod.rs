//! Block compressor capabilities.
//!
//! Two shapes exist and they are not interchangeable at the byte level:
//!
//! - [`StreamCompressor`]: turns the entry stream into a payload and back. The
//!   writer and reader own the container and the entry stream; the codec only
//!   sees bytes.
//! - [`DirectoryCompressor`]: an external tool that packs a directory into a
//!   file and unpacks it again. It never sees the entry stream, so the writer
//!   and reader hand it paths and report progress at directory granularity.
//!
//! A [`Codec`] holds exactly one of them, chosen once when the archiver is
//! built.

pub mod external;
pub mod lzma;

pub use external::ExternalTool;
pub use lzma::LzmaCompressor;

use crate::container::{ArtifactHeader, PropertyBytes};
use oxipack_core::error::Result;
use std::io::{Read, Write};
use std::path::Path;

/// Progress hook used by codecs: called with a cumulative byte count.
pub type CodecProgress<'a> = &'a mut dyn FnMut(u64) -> Result<()>;

/// Byte-stream compressor.
pub trait StreamCompressor {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    /// Compress `input` into `out` and return the properties the decoder
    /// will need. `progress` receives input bytes consumed.
    fn encode(
        &self,
        input: &[u8],
        out: &mut dyn Write,
        progress: CodecProgress<'_>,
    ) -> Result<PropertyBytes>;

    /// Decompress exactly `header.length` bytes from `input` into `out`.
    /// `progress` receives output bytes produced.
    fn decode(
        &self,
        header: &ArtifactHeader,
        input: &mut dyn Read,
        out: &mut dyn Write,
        progress: CodecProgress<'_>,
    ) -> Result<()>;
}

/// Whole-directory compressor.
pub trait DirectoryCompressor {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    /// Pack the tree under `source` into a new file at `artifact`.
    fn compress_dir(&self, source: &Path, artifact: &Path) -> Result<()>;

    /// Unpack `artifact` into the existing directory `dest`.
    fn decompress_dir(&self, artifact: &Path, dest: &Path) -> Result<()>;
}

/// The capability an archiver was built with.
pub enum Codec {
    /// In-process byte-stream codec.
    Stream(Box<dyn StreamCompressor>),
    /// External whole-directory tool.
    Directory(Box<dyn DirectoryCompressor>),
}

impl Codec {
    /// Name of the underlying codec.
    pub fn name(&self) -> &str {
        match self {
            Codec::Stream(c) => c.name(),
            Codec::Directory(c) => c.name(),
        }
    }

    /// Whether the codec exposes the entry stream.
    pub fn is_stream(&self) -> bool {
        matches!(self, Codec::Stream(_))
    }
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Codec::Stream(c) => f.debug_tuple("Stream").field(&c.name()).finish(),
            Codec::Directory(c) => f.debug_tuple("Directory").field(&c.name()).finish(),
        }
    }
}
