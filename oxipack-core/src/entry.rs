//! Archive entries and canonical relative paths.
//!
//! Every path stored in an archive is relative to the packaged root, uses `/`
//! as its only separator and is valid UTF-8, whatever the host conventions
//! are. A path ending in a single `/` is a directory marker: it carries no
//! content and stands for an otherwise empty directory.

use crate::error::{ArchiveError, Result};
use std::path::{Component, Path, PathBuf};

/// Separator used for every path in an archive.
pub const SEPARATOR: char = '/';

/// Longest path, in bytes, an entry record can carry.
pub const MAX_PATH_LEN: usize = u16::MAX as usize;

/// One file (or empty directory) as recorded in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Canonical relative path (see [`validate_relative_path`]).
    pub relative_path: String,
    /// File contents; empty for directory markers.
    pub content: Vec<u8>,
}

impl ArchiveEntry {
    /// Create a file entry.
    pub fn file(relative_path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            relative_path: relative_path.into(),
            content: content.into(),
        }
    }

    /// Create a directory marker; a trailing separator is added if missing.
    pub fn directory(relative_path: impl Into<String>) -> Self {
        let mut relative_path = relative_path.into();
        if !relative_path.ends_with(SEPARATOR) {
            relative_path.push(SEPARATOR);
        }
        Self {
            relative_path,
            content: Vec::new(),
        }
    }

    /// Size of the content in bytes.
    pub fn size(&self) -> u64 {
        self.content.len() as u64
    }

    /// Check if this entry is a directory marker.
    pub fn is_dir(&self) -> bool {
        is_directory_marker(&self.relative_path)
    }
}

/// Check if a canonical path denotes a directory marker.
pub fn is_directory_marker(path: &str) -> bool {
    path.ends_with(SEPARATOR)
}

/// Validate a canonical relative path.
///
/// Returns a short description of the first violation found. A single
/// trailing separator is accepted (directory marker).
pub fn validate_relative_path(path: &str) -> std::result::Result<(), &'static str> {
    if path.is_empty() {
        return Err("path is empty");
    }
    if path.len() > MAX_PATH_LEN {
        return Err("path is longer than 65535 bytes");
    }
    if path.starts_with(SEPARATOR) {
        return Err("path is absolute");
    }
    if path.contains('\\') {
        return Err("path contains a backslash");
    }
    if path.contains('\0') {
        return Err("path contains a NUL byte");
    }
    if has_drive_prefix(path) {
        return Err("path starts with a drive prefix");
    }

    let body = path.strip_suffix(SEPARATOR).unwrap_or(path);
    for component in body.split(SEPARATOR) {
        match component {
            "" => return Err("path contains an empty component"),
            "." | ".." => return Err("path contains a '.' or '..' component"),
            _ => {}
        }
    }

    Ok(())
}

/// `c:name` is a legal POSIX file name, but Windows reads it as drive-relative.
fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Convert a host path, relative to the packaged root, into canonical form.
///
/// Fails with [`ArchiveError::Encoding`] if a component is not valid UTF-8 or
/// the result cannot be represented in an entry record.
pub fn canonicalize(relative: &Path) -> Result<String> {
    let mut parts = Vec::new();

    for component in relative.components() {
        match component {
            Component::Normal(name) => {
                let name = name.to_str().ok_or_else(|| {
                    ArchiveError::encoding(format!(
                        "path is not valid UTF-8: {}",
                        relative.display()
                    ))
                })?;
                parts.push(name);
            }
            _ => {
                return Err(ArchiveError::encoding(format!(
                    "path is not relative to the packaged root: {}",
                    relative.display()
                )));
            }
        }
    }

    let canonical = parts.join("/");
    validate_relative_path(&canonical)
        .map_err(|reason| ArchiveError::encoding(format!("{}: {:?}", reason, canonical)))?;
    Ok(canonical)
}

/// Resolve a canonical path below `root` using host separators.
///
/// The path must already have passed [`validate_relative_path`].
pub fn resolve(root: &Path, canonical: &str) -> PathBuf {
    let body = canonical.strip_suffix(SEPARATOR).unwrap_or(canonical);
    let mut resolved = root.to_path_buf();
    for component in body.split(SEPARATOR) {
        resolved.push(component);
    }
    resolved
}
