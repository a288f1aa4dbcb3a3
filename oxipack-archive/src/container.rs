//! Artifact header.
//!
//! ```text
//! offset  size  field
//!      0     5  coder properties (opaque to the container)
//!      5     8  uncompressed length, i64 little-endian
//!     13     -  compressed payload
//! ```
//!
//! Both fields sit at fixed offsets and are read before any payload byte.

use oxipack_core::error::{ArchiveError, Result};
use oxipack_lzma::PROPERTIES_SIZE;
use std::io::{self, Read, Write};

/// Serialized coder properties.
pub type PropertyBytes = [u8; PROPERTIES_SIZE];

/// Size of the artifact header.
pub const HEADER_LEN: usize = PROPERTIES_SIZE + 8;

/// Fixed-size header at the start of every stream-capability artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactHeader {
    /// Coder properties produced by the encoder.
    pub properties: PropertyBytes,
    /// Exact length of the decoded entry stream.
    pub length: u64,
}

impl ArtifactHeader {
    /// Serialize the header.
    ///
    /// Fails with [`ArchiveError::Encoding`] if the length does not fit the
    /// signed on-disk field.
    pub fn to_bytes(&self) -> Result<[u8; HEADER_LEN]> {
        let length = i64::try_from(self.length).map_err(|_| {
            ArchiveError::encoding(format!("entry stream of {} bytes is too large", self.length))
        })?;
        let mut bytes = [0u8; HEADER_LEN];
        bytes[..PROPERTIES_SIZE].copy_from_slice(&self.properties);
        bytes[PROPERTIES_SIZE..].copy_from_slice(&length.to_le_bytes());
        Ok(bytes)
    }

    /// Write the header.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    /// Read and validate the header.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut bytes = [0u8; HEADER_LEN];
        reader.read_exact(&mut bytes).map_err(|e| match e.kind() {
            io::ErrorKind::UnexpectedEof => ArchiveError::corrupt(
                0,
                format!("artifact is shorter than its {}-byte header", HEADER_LEN),
            ),
            _ => e.into(),
        })?;

        let mut properties = [0u8; PROPERTIES_SIZE];
        properties.copy_from_slice(&bytes[..PROPERTIES_SIZE]);
        let mut length = [0u8; 8];
        length.copy_from_slice(&bytes[PROPERTIES_SIZE..]);
        let length = i64::from_le_bytes(length);
        if length < 0 {
            return Err(ArchiveError::corrupt(
                PROPERTIES_SIZE as u64,
                format!("negative uncompressed length {}", length),
            ));
        }

        Ok(Self {
            properties,
            length: length as u64,
        })
    }
}
