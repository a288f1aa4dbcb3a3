//! # OxiPack Core
//!
//! Core components for the OxiPack directory packer.
//!
//! - [`error`]: the error taxonomy shared by every layer
//! - [`entry`]: archive entries and canonical relative paths
//! - [`progress`]: synchronous progress reporting and cooperative cancellation
//!
//! ## Architecture
//!
//! OxiPack is layered the same way as an archiver protocol stack:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ L4: CLI                                                 │
//! │     oxipack pack / unpack / list / size                 │
//! ├─────────────────────────────────────────────────────────┤
//! │ L3: Archive                                             │
//! │     entry stream, artifact header, writer, reader      │
//! ├─────────────────────────────────────────────────────────┤
//! │ L2: Codec                                               │
//! │     in-process LZMA, external compressor tool          │
//! ├─────────────────────────────────────────────────────────┤
//! │ L1: Core (this crate)                                   │
//! │     errors, entries, paths, progress                   │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxipack_core::entry::{canonicalize, validate_relative_path};
//! use std::path::Path;
//!
//! let canonical = canonicalize(Path::new("sub").join("b.bin").as_path()).unwrap();
//! assert_eq!(canonical, "sub/b.bin");
//! assert!(validate_relative_path("../escape").is_err());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod entry;
pub mod error;
pub mod progress;

// Re-exports for convenience
pub use entry::ArchiveEntry;
pub use error::{ArchiveError, Result};
pub use progress::{NoProgress, Progress, ProgressSink, ProgressState};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::entry::ArchiveEntry;
    pub use crate::error::{ArchiveError, Result};
    pub use crate::progress::{NoProgress, Progress, ProgressSink, ProgressState};
}
