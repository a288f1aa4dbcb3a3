//! Error types for OxiPack operations.
//!
//! One enum covers the whole pipeline: locating the source tree, reading and
//! writing files, the entry stream container, the compressed payload and the
//! strategy configuration. Every failure is surfaced to the caller; nothing
//! in the library swallows an error.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for OxiPack operations.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The directory to pack or the artifact to unpack does not exist.
    #[error("Source not found: {}", .path.display())]
    SourceNotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// I/O error from the file system or an external tool.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// An entry cannot be represented in the entry stream.
    #[error("Encoding error: {message}")]
    Encoding {
        /// Description of the encoding error.
        message: String,
    },

    /// A record in the entry stream is structurally invalid.
    #[error("Malformed record at offset {offset}: {message}")]
    MalformedRecord {
        /// Byte offset of the offending record in the entry stream.
        offset: u64,
        /// Description of the problem.
        message: String,
    },

    /// The entry stream ended in the middle of a record.
    #[error("Truncated entry stream at offset {offset}: {expected} more bytes expected")]
    TruncatedStream {
        /// Byte offset at which the stream ended.
        offset: u64,
        /// Number of bytes the current record still needed.
        expected: u64,
    },

    /// The compressed payload is inconsistent with its header.
    #[error("Corrupt archive at offset {offset}: {message}")]
    CorruptArchive {
        /// Byte offset (compressed or decoded, see message) of the failure.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// Invalid strategy selection or codec settings.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// The progress sink asked the operation to stop.
    #[error("Operation cancelled after {processed} bytes")]
    Cancelled {
        /// Bytes processed when the abort was observed.
        processed: u64,
    },
}

/// Result type alias for OxiPack operations.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create a source-not-found error.
    pub fn source_not_found(path: impl Into<PathBuf>) -> Self {
        Self::SourceNotFound { path: path.into() }
    }

    /// Create an encoding error.
    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding {
            message: message.into(),
        }
    }

    /// Create a malformed record error.
    pub fn malformed(offset: u64, message: impl Into<String>) -> Self {
        Self::MalformedRecord {
            offset,
            message: message.into(),
        }
    }

    /// Create a truncated stream error.
    pub fn truncated(offset: u64, expected: u64) -> Self {
        Self::TruncatedStream { offset, expected }
    }

    /// Create a corrupt archive error.
    pub fn corrupt(offset: u64, message: impl Into<String>) -> Self {
        Self::CorruptArchive {
            offset,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(processed: u64) -> Self {
        Self::Cancelled { processed }
    }

    /// Whether this error describes a damaged entry stream or payload.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedRecord { .. } | Self::TruncatedStream { .. } | Self::CorruptArchive { .. }
        )
    }
}
