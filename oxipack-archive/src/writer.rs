//! Archive writer: directory tree to artifact.
//!
//! Packing runs in three steps, all on the calling thread:
//!
//! 1. Enumerate the source tree and fix the progress total.
//! 2. Write the entry stream to an anonymous temporary file.
//! 3. Compress that file into a named temporary next to the destination,
//!    then rename it over the destination.
//!
//! Both temporaries are deleted when dropped. If anything fails the
//! destination is removed as well, so a failed pack never leaves an artifact
//! behind, old or new.

use crate::archiver::{ArchiveStats, DirectorySize};
use crate::codec::{DirectoryCompressor, StreamCompressor};
use crate::container::{ArtifactHeader, HEADER_LEN};
use crate::stream::EntryStreamWriter;
use memmap2::Mmap;
use oxipack_core::entry::canonicalize;
use oxipack_core::error::{ArchiveError, Result};
use oxipack_core::progress::{ProgressSink, ProgressState};
use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

/// Something the writer will record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SourceItem {
    /// A regular file and its size when enumerated.
    File {
        path: PathBuf,
        canonical: String,
        size: u64,
    },
    /// A directory with nothing packable below it, recorded as a marker.
    EmptyDir { canonical: String },
}

impl SourceItem {
    fn canonical(&self) -> &str {
        match self {
            SourceItem::File { canonical, .. } | SourceItem::EmptyDir { canonical } => canonical,
        }
    }

    fn size(&self) -> u64 {
        match self {
            SourceItem::File { size, .. } => *size,
            SourceItem::EmptyDir { .. } => 0,
        }
    }
}

fn check_source(source: &Path) -> Result<()> {
    if !source.is_dir() {
        return Err(ArchiveError::source_not_found(source));
    }
    Ok(())
}

/// Walk `source` depth-first with siblings sorted by name.
///
/// Symlinks are never followed and, like sockets and device files, are
/// skipped. So is `exclude`, the artifact being written when it lives in the
/// tree. Directories are visited after their contents, which makes an empty
/// one easy to spot: nothing below it was recorded just before it.
pub(crate) fn enumerate(source: &Path, exclude: Option<&Path>) -> Result<Vec<SourceItem>> {
    check_source(source)?;

    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .contents_first(true);

    let mut items: Vec<SourceItem> = Vec::new();
    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry.path().strip_prefix(source).map_err(|_| {
            ArchiveError::encoding(format!(
                "{} is outside {}",
                entry.path().display(),
                source.display()
            ))
        })?;
        let file_type = entry.file_type();

        if exclude == Some(entry.path()) {
            tracing::debug!(path = %entry.path().display(), "skipping the artifact being written");
            continue;
        }

        if file_type.is_dir() {
            let marker = format!("{}/", canonicalize(relative)?);
            let has_children = items
                .last()
                .is_some_and(|item| item.canonical().starts_with(&marker));
            if !has_children {
                items.push(SourceItem::EmptyDir { canonical: marker });
            }
        } else if file_type.is_file() {
            let size = entry.metadata().map_err(io::Error::from)?.len();
            items.push(SourceItem::File {
                path: entry.path().to_path_buf(),
                canonical: canonicalize(relative)?,
                size,
            });
        } else {
            tracing::debug!(path = %entry.path().display(), "skipping symlink or special file");
        }
    }

    Ok(items)
}

/// Count regular files and their bytes the way [`enumerate`] sees them.
pub(crate) fn measure(source: &Path) -> Result<DirectorySize> {
    let items = enumerate(source, None)?;
    let mut size = DirectorySize::default();
    for item in &items {
        if let SourceItem::File { size: bytes, .. } = item {
            size.files += 1;
            size.bytes += bytes;
        }
    }
    Ok(size)
}

/// Where `dest` appears while walking `source`, if it lies inside the tree.
fn artifact_in_source(source: &Path, dest: &Path) -> Result<Option<PathBuf>> {
    let Some(name) = dest.file_name() else {
        return Ok(None);
    };
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let parent = match fs::canonicalize(parent) {
        Ok(parent) => parent,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let root = fs::canonicalize(source)?;
    Ok(parent
        .join(name)
        .strip_prefix(&root)
        .ok()
        .map(|relative| source.join(relative)))
}

/// Directory that holds temporaries for `dest`, created if missing.
pub(crate) fn staging_dir(dest: &Path) -> Result<PathBuf> {
    let parent = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    Ok(parent)
}

/// Run `pack` and delete whatever is at `dest` if it fails.
fn with_cleanup<F>(dest: &Path, pack: F) -> Result<ArchiveStats>
where
    F: FnOnce() -> Result<ArchiveStats>,
{
    let result = pack();
    if let Err(err) = &result {
        tracing::debug!(dest = %dest.display(), error = %err, "pack failed, removing artifact");
        match fs::remove_file(dest) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(dest = %dest.display(), error = %e, "could not remove stale artifact");
            }
        }
    }
    result
}

/// Pack `source` into `dest` with an in-process stream compressor.
pub(crate) fn pack_stream(
    source: &Path,
    dest: &Path,
    compressor: &dyn StreamCompressor,
    sink: &mut dyn ProgressSink,
) -> Result<ArchiveStats> {
    check_source(source)?;
    let exclude = artifact_in_source(source, dest)?;
    with_cleanup(dest, || {
        let items = enumerate(source, exclude.as_deref())?;
        let total = items.iter().map(SourceItem::size).sum();
        let mut progress = ProgressState::new(total, sink);
        progress.poll()?;

        let staging = staging_dir(dest)?;
        let (stream_file, stream_len) = write_stream(&items, &staging, &mut progress)?;
        tracing::debug!(entries = items.len(), stream_len, "entry stream written");

        let mut artifact = NamedTempFile::new_in(&staging)?;
        let artifact_len = compress_stream(
            &stream_file,
            stream_len,
            compressor,
            artifact.as_file_mut(),
            &mut progress,
        )?;
        drop(stream_file);

        progress.finish()?;
        artifact.persist(dest).map_err(|e| ArchiveError::Io(e.error))?;

        let stats = ArchiveStats {
            files: items
                .iter()
                .filter(|item| matches!(item, SourceItem::File { .. }))
                .count() as u64,
            content_bytes: total,
            stream_bytes: stream_len,
            artifact_bytes: artifact_len,
        };
        tracing::info!(
            source = %source.display(),
            dest = %dest.display(),
            codec = compressor.name(),
            files = stats.files,
            artifact_bytes = stats.artifact_bytes,
            "packed"
        );
        Ok(stats)
    })
}

/// Serialize every item into an anonymous temporary file.
fn write_stream(
    items: &[SourceItem],
    staging: &Path,
    progress: &mut ProgressState<'_>,
) -> Result<(File, u64)> {
    let file = tempfile::tempfile_in(staging)?;
    let mut writer = EntryStreamWriter::new(BufWriter::new(file));

    for item in items {
        progress.poll()?;
        match item {
            SourceItem::File {
                path,
                canonical,
                size,
            } => {
                tracing::debug!(path = %canonical, size, "adding file");
                let input = File::open(path)?;
                writer.add_file_from(canonical, *size, input, |n| progress.advance(n))?;
            }
            SourceItem::EmptyDir { canonical } => {
                tracing::debug!(path = %canonical, "adding empty directory");
                writer.add_directory(canonical)?;
            }
        }
    }

    let stream_len = writer.bytes_written();
    let file = writer
        .into_inner()?
        .into_inner()
        .map_err(|e| e.into_error())?;
    Ok((file, stream_len))
}

/// Compress the entry stream into `artifact` and return the artifact size.
///
/// The payload is written first, after a gap the size of the header; the
/// header goes in last because the properties come out of the encoder.
fn compress_stream(
    stream_file: &File,
    stream_len: u64,
    compressor: &dyn StreamCompressor,
    artifact: &mut File,
    progress: &mut ProgressState<'_>,
) -> Result<u64> {
    let mapped = if stream_len == 0 {
        None
    } else {
        // SAFETY: the file is an unlinked temporary owned by this call; no
        // other process can reach it to modify it while it is mapped.
        Some(unsafe { Mmap::map(stream_file)? })
    };
    let input: &[u8] = mapped.as_deref().unwrap_or(&[]);

    artifact.seek(SeekFrom::Start(HEADER_LEN as u64))?;
    let properties = {
        let mut out = BufWriter::new(&mut *artifact);
        let properties = compressor.encode(input, &mut out, &mut |_| progress.poll())?;
        out.flush()?;
        properties
    };

    let artifact_len = artifact.stream_position()?;
    artifact.seek(SeekFrom::Start(0))?;
    ArtifactHeader {
        properties,
        length: stream_len,
    }
    .write_to(artifact)?;
    artifact.sync_all()?;
    Ok(artifact_len)
}

/// Pack `source` into `dest` with an external whole-directory tool.
///
/// The tool gives no progress of its own, so the sink sees the start and the
/// end of the operation only. It also walks the tree by itself, so `dest` may
/// not lie inside `source`.
pub(crate) fn pack_directory(
    source: &Path,
    dest: &Path,
    tool: &dyn DirectoryCompressor,
    sink: &mut dyn ProgressSink,
) -> Result<ArchiveStats> {
    check_source(source)?;
    if artifact_in_source(source, dest)?.is_some() {
        return Err(ArchiveError::configuration(format!(
            "artifact {} is inside source {}",
            dest.display(),
            source.display()
        )));
    }
    with_cleanup(dest, || {
        let size = measure(source)?;
        let mut progress = ProgressState::new(size.bytes, sink);
        progress.poll()?;

        let staging = tempfile::Builder::new()
            .prefix(".oxipack")
            .tempdir_in(staging_dir(dest)?)?;
        let staged = staging
            .path()
            .join(dest.file_name().unwrap_or_else(|| "artifact".as_ref()));
        tool.compress_dir(source, &staged)?;

        progress.finish()?;
        fs::rename(&staged, dest)?;
        let artifact_bytes = fs::metadata(dest)?.len();

        tracing::info!(
            source = %source.display(),
            dest = %dest.display(),
            codec = tool.name(),
            files = size.files,
            artifact_bytes,
            "packed"
        );
        Ok(ArchiveStats {
            files: size.files,
            content_bytes: size.bytes,
            stream_bytes: 0,
            artifact_bytes,
        })
    })
}
