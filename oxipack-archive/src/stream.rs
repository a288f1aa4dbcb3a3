//! Entry stream: the uncompressed container inside an artifact.
//!
//! The stream is a plain sequence of records with no global header and no
//! terminator:
//!
//! ```text
//! ┌──────────────┬────────────────┬──────────────┬──────────────┐
//! │ path_len u32 │ path (UTF-8)   │ size i64     │ content      │
//! │ LE, 1..65535 │ path_len bytes │ LE, >= 0     │ size bytes   │
//! └──────────────┴────────────────┴──────────────┴──────────────┘
//! ```
//!
//! Every field is length-prefixed, so no byte value in a path or in file
//! content can be mistaken for framing. The stream must end exactly on a
//! record boundary.

use oxipack_core::entry::{ArchiveEntry, MAX_PATH_LEN, is_directory_marker, validate_relative_path};
use oxipack_core::error::{ArchiveError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Bytes in a record before the path.
const PATH_LEN_SIZE: u64 = 4;

/// Bytes between the path and the content.
const SIZE_FIELD_SIZE: u64 = 8;

/// Copy buffer size for file content.
pub(crate) const COPY_CHUNK: usize = 64 * 1024;

/// Location of one record's content inside an entry stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryHeader {
    /// Canonical relative path.
    pub path: String,
    /// Content size in bytes.
    pub size: u64,
    /// Stream offset of the first content byte.
    #[serde(skip)]
    pub offset: u64,
}

impl EntryHeader {
    /// Check if this record is a directory marker.
    pub fn is_dir(&self) -> bool {
        is_directory_marker(&self.path)
    }
}

/// Entry stream writer.
pub struct EntryStreamWriter<W: Write> {
    writer: W,
    written: u64,
    seen: HashSet<String>,
}

impl<W: Write> EntryStreamWriter<W> {
    /// Create a new writer.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            written: 0,
            seen: HashSet::new(),
        }
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    /// Number of records written so far.
    pub fn entry_count(&self) -> usize {
        self.seen.len()
    }

    fn write_header(&mut self, path: &str, size: u64) -> Result<()> {
        validate_relative_path(path)
            .map_err(|reason| ArchiveError::encoding(format!("{}: {:?}", reason, path)))?;
        if is_directory_marker(path) && size != 0 {
            return Err(ArchiveError::encoding(format!(
                "directory marker {:?} cannot carry content",
                path
            )));
        }
        let size_field = i64::try_from(size).map_err(|_| {
            ArchiveError::encoding(format!("{:?} is too large ({} bytes)", path, size))
        })?;
        if !self.seen.insert(path.to_string()) {
            return Err(ArchiveError::encoding(format!("duplicate path {:?}", path)));
        }

        // validate_relative_path bounds the length to MAX_PATH_LEN
        let path_len = path.len() as u32;
        self.writer.write_all(&path_len.to_le_bytes())?;
        self.writer.write_all(path.as_bytes())?;
        self.writer.write_all(&size_field.to_le_bytes())?;
        self.written += PATH_LEN_SIZE + path.len() as u64 + SIZE_FIELD_SIZE;
        Ok(())
    }

    /// Write an in-memory entry.
    pub fn add_entry(&mut self, entry: &ArchiveEntry) -> Result<()> {
        self.write_header(&entry.relative_path, entry.size())?;
        self.writer.write_all(&entry.content)?;
        self.written += entry.size();
        Ok(())
    }

    /// Write a directory marker.
    pub fn add_directory(&mut self, path: &str) -> Result<()> {
        self.write_header(path, 0)
    }

    /// Write a record whose content is streamed from `reader`.
    ///
    /// Exactly `size` bytes are copied; `on_chunk` is called with the length
    /// of every chunk once it has been written. A reader that ends early is
    /// an I/O error: the header already promised `size` bytes.
    pub fn add_file_from<R, F>(&mut self, path: &str, size: u64, reader: R, mut on_chunk: F) -> Result<()>
    where
        R: Read,
        F: FnMut(u64) -> Result<()>,
    {
        self.write_header(path, size)?;

        let mut reader = reader.take(size);
        let mut buffer = vec![0u8; COPY_CHUNK.min(size as usize).max(1)];
        let mut copied = 0u64;

        loop {
            let n = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.writer.write_all(&buffer[..n])?;
            copied += n as u64;
            self.written += n as u64;
            on_chunk(n as u64)?;
        }

        if copied != size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{:?} shrank while being packed: expected {} bytes, read {}",
                    path, size, copied
                ),
            )
            .into());
        }
        Ok(())
    }

    /// Flush and return the underlying writer.
    pub fn into_inner(mut self) -> Result<W> {
        self.writer.flush()?;
        Ok(self.writer)
    }
}

/// Read exactly `buf.len()` bytes or report how many were missing.
fn read_field<R: Read>(reader: &mut R, buf: &mut [u8], offset: u64) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => {
                return Err(ArchiveError::truncated(
                    offset + filled as u64,
                    (buf.len() - filled) as u64,
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Index every record of a stream without reading content.
///
/// The whole stream is validated before anything is returned: truncation,
/// bad paths, negative sizes, markers with content and duplicate paths are
/// all detected here.
pub fn scan<R: Read + Seek>(reader: &mut R) -> Result<Vec<EntryHeader>> {
    let end = reader.seek(SeekFrom::End(0))?;
    reader.seek(SeekFrom::Start(0))?;

    let mut headers = Vec::new();
    let mut seen = HashSet::new();
    let mut offset = 0u64;

    while offset < end {
        let record = offset;

        let mut len_bytes = [0u8; 4];
        read_field(reader, &mut len_bytes, offset)?;
        offset += PATH_LEN_SIZE;
        let path_len = u32::from_le_bytes(len_bytes) as usize;
        if path_len == 0 || path_len > MAX_PATH_LEN {
            return Err(ArchiveError::malformed(
                record,
                format!("path length {} out of range", path_len),
            ));
        }

        let remaining = end - offset;
        let needed = path_len as u64 + SIZE_FIELD_SIZE;
        if remaining < needed {
            return Err(ArchiveError::truncated(end, needed - remaining));
        }

        let mut path_bytes = vec![0u8; path_len];
        read_field(reader, &mut path_bytes, offset)?;
        offset += path_len as u64;
        let path = String::from_utf8(path_bytes)
            .map_err(|_| ArchiveError::malformed(record, "path is not valid UTF-8"))?;
        validate_relative_path(&path)
            .map_err(|reason| ArchiveError::malformed(record, format!("{}: {:?}", reason, path)))?;

        let mut size_bytes = [0u8; 8];
        read_field(reader, &mut size_bytes, offset)?;
        offset += SIZE_FIELD_SIZE;
        let size = i64::from_le_bytes(size_bytes);
        if size < 0 {
            return Err(ArchiveError::malformed(
                record,
                format!("negative size {} for {:?}", size, path),
            ));
        }
        let size = size as u64;

        if is_directory_marker(&path) && size != 0 {
            return Err(ArchiveError::malformed(
                record,
                format!("directory marker {:?} carries {} bytes", path, size),
            ));
        }

        let remaining = end - offset;
        if size > remaining {
            return Err(ArchiveError::truncated(end, size - remaining));
        }

        if !seen.insert(path.clone()) {
            return Err(ArchiveError::malformed(record, format!("duplicate path {:?}", path)));
        }

        headers.push(EntryHeader {
            path,
            size,
            offset,
        });

        offset += size;
        reader.seek(SeekFrom::Start(offset))?;
    }

    Ok(headers)
}

/// Entry stream reader with random access to content.
pub struct EntryStreamReader<R: Read + Seek> {
    reader: R,
    entries: Vec<EntryHeader>,
}

impl<R: Read + Seek> EntryStreamReader<R> {
    /// Create a reader, indexing and validating the whole stream.
    pub fn new(mut reader: R) -> Result<Self> {
        let entries = scan(&mut reader)?;
        Ok(Self { reader, entries })
    }

    /// Get entries in stream order.
    pub fn entries(&self) -> &[EntryHeader] {
        &self.entries
    }

    /// Copy an entry's content to a writer.
    pub fn extract<W: Write>(&mut self, entry: &EntryHeader, writer: &mut W) -> Result<u64> {
        self.reader.seek(SeekFrom::Start(entry.offset))?;
        let copied = io::copy(&mut (&mut self.reader).take(entry.size), writer)?;
        if copied != entry.size {
            return Err(ArchiveError::truncated(entry.offset + copied, entry.size - copied));
        }
        Ok(copied)
    }

    /// Read an entry's content into memory.
    pub fn extract_to_vec(&mut self, entry: &EntryHeader) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(entry.size as usize);
        self.extract(entry, &mut data)?;
        Ok(data)
    }
}

/// Serialize entries into a byte stream.
pub fn serialize(entries: &[ArchiveEntry]) -> Result<Vec<u8>> {
    let mut writer = EntryStreamWriter::new(Vec::new());
    for entry in entries {
        writer.add_entry(entry)?;
    }
    writer.into_inner()
}

/// Deserialize a byte stream into entries.
pub fn deserialize(bytes: &[u8]) -> Result<Vec<ArchiveEntry>> {
    let mut reader = EntryStreamReader::new(Cursor::new(bytes))?;
    let headers = reader.entries().to_vec();
    headers
        .into_iter()
        .map(|header| {
            let content = reader.extract_to_vec(&header)?;
            Ok(ArchiveEntry {
                relative_path: header.path,
                content,
            })
        })
        .collect()
}
