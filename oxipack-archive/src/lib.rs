//! # OxiPack Archive
//!
//! Directory-tree archives for OxiPack.
//!
//! An artifact is a 13-byte header followed by a compressed payload. The
//! payload decodes to the entry stream, a flat list of length-prefixed
//! `(path, size, content)` records describing every file of the packed tree.
//!
//! - [`stream`]: the entry stream codec
//! - [`container`]: the artifact header
//! - [`codec`]: block compressors, in-process LZMA and external tools
//! - [`strategy`]: choosing a codec from a tag
//! - [`Archiver`]: pack, unpack, list
//!
//! ## Example
//!
//! ```rust,no_run
//! use oxipack_archive::{ArchiveConfig, Archiver};
//! use oxipack_core::NoProgress;
//! use std::path::Path;
//!
//! let archiver = Archiver::new(&ArchiveConfig::default()).unwrap();
//! let stats = archiver
//!     .pack(Path::new("dist"), Path::new("dist.pack"), &mut NoProgress)
//!     .unwrap();
//! println!("{} files, {} bytes", stats.files, stats.artifact_bytes);
//!
//! archiver
//!     .unpack(Path::new("dist.pack"), Path::new("restored"), &mut NoProgress)
//!     .unwrap();
//! ```
//!
//! ## Progress
//!
//! Pack reports bytes read from source files against their total size.
//! Unpack reports decoded bytes against the declared stream length. Any
//! report can return [`oxipack_core::Progress::Abort`] to cancel.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod archiver;
pub mod codec;
pub mod config;
pub mod container;
pub mod reader;
pub mod strategy;
pub mod stream;
mod writer;

// Re-exports
pub use archiver::{ArchiveStats, Archiver, DirectorySize, EntrySummary, PackError, measure};
pub use codec::{Codec, DirectoryCompressor, ExternalTool, LzmaCompressor, StreamCompressor};
pub use config::{ArchiveConfig, ExternalToolConfig};
pub use container::{ArtifactHeader, HEADER_LEN, PropertyBytes};
pub use reader::{UnpackError, UnpackOptions, UnpackState};
pub use strategy::Strategy;
pub use stream::{EntryHeader, EntryStreamReader, EntryStreamWriter, deserialize, serialize};
