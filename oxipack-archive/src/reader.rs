//! Archive reader: artifact to directory tree.
//!
//! The destination is emptied first so extraction never merges with a
//! previous run. Unlike the writer, the reader does not clean up after a
//! failure: whatever was materialized stays in place for inspection and the
//! returned [`UnpackError`] says so.

use crate::archiver::{ArchiveStats, EntrySummary};
use crate::codec::{CodecProgress, DirectoryCompressor, StreamCompressor};
use crate::container::ArtifactHeader;
use crate::stream::EntryStreamReader;
use crate::writer::{measure, staging_dir};
use oxipack_core::entry::resolve;
use oxipack_core::error::{ArchiveError, Result};
use oxipack_core::progress::{ProgressSink, ProgressState};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Stage of an unpack operation.
///
/// `NotStarted -> Decompressing -> Deserializing -> Materializing -> Done`,
/// with `Failed` reachable from every stage before `Done`. Nothing is retried;
/// call unpack again to start over. An [`UnpackError`] records the stage that
/// was running when the unpack moved to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpackState {
    /// Checking the artifact and preparing the destination.
    NotStarted,
    /// Decoding the payload into the intermediate entry stream.
    Decompressing,
    /// Indexing and validating the entry stream.
    Deserializing,
    /// Writing files under the destination.
    Materializing,
    /// Finished.
    Done,
    /// Stopped by an error.
    Failed,
}

impl UnpackState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, UnpackState::Done | UnpackState::Failed)
    }
}

impl fmt::Display for UnpackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UnpackState::NotStarted => "preparing",
            UnpackState::Decompressing => "decompressing",
            UnpackState::Deserializing => "reading entries",
            UnpackState::Materializing => "writing files",
            UnpackState::Done => "done",
            UnpackState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A failed unpack.
#[derive(Debug, Error)]
#[error(
    "unpack failed while {state}: {source}; {} may be partially populated",
    .destination.display()
)]
pub struct UnpackError {
    /// Stage that was running when the error occurred, never `Failed`.
    pub state: UnpackState,
    /// Destination directory, possibly holding some extracted files.
    pub destination: PathBuf,
    /// The underlying error.
    pub source: ArchiveError,
}

impl UnpackError {
    /// The underlying error.
    pub fn error(&self) -> &ArchiveError {
        &self.source
    }

    /// Unwrap the underlying error.
    pub fn into_error(self) -> ArchiveError {
        self.source
    }
}

/// Extra unpack behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnpackOptions {
    /// Delete the artifact once every entry has been written.
    pub remove_artifact: bool,
}

/// Tracks the current stage of one unpack call.
struct Stages<'a> {
    state: UnpackState,
    destination: &'a Path,
}

impl<'a> Stages<'a> {
    fn new(destination: &'a Path) -> Self {
        Self {
            state: UnpackState::NotStarted,
            destination,
        }
    }

    fn enter(&mut self, state: UnpackState) {
        tracing::debug!(from = %self.state, to = %state, "unpack stage");
        self.state = state;
    }

    fn finish(
        &mut self,
        result: Result<ArchiveStats>,
        artifact: &Path,
        options: &UnpackOptions,
    ) -> std::result::Result<ArchiveStats, UnpackError> {
        match result {
            Ok(stats) => {
                tracing::info!(
                    artifact = %artifact.display(),
                    dest = %self.destination.display(),
                    files = stats.files,
                    "unpacked"
                );
                if options.remove_artifact {
                    if let Err(e) = fs::remove_file(artifact) {
                        tracing::warn!(artifact = %artifact.display(), error = %e, "could not remove artifact");
                    }
                }
                Ok(stats)
            }
            Err(source) => {
                let failed_in = self.state;
                tracing::debug!(state = %failed_in, error = %source, "unpack failed");
                self.enter(UnpackState::Failed);
                Err(UnpackError {
                    state: failed_in,
                    destination: self.destination.to_path_buf(),
                    source,
                })
            }
        }
    }
}

/// Check the artifact, then replace `dest` with an empty directory.
///
/// Nothing is removed if the artifact lives inside `dest`.
fn prepare(artifact: &Path, dest: &Path) -> Result<()> {
    if !artifact.is_file() {
        return Err(ArchiveError::source_not_found(artifact));
    }
    check_disjoint(artifact, dest)?;

    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(dest)?,
        Ok(_) => fs::remove_file(dest)?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    fs::create_dir_all(dest)?;
    Ok(())
}

/// Fail if clearing `dest` would delete `artifact`.
fn check_disjoint(artifact: &Path, dest: &Path) -> Result<()> {
    let dest = match fs::canonicalize(dest) {
        Ok(dest) => dest,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    if fs::canonicalize(artifact)?.starts_with(&dest) {
        return Err(ArchiveError::configuration(format!(
            "artifact {} is inside destination {}",
            artifact.display(),
            dest.display()
        )));
    }
    Ok(())
}

/// Read the header of an artifact and leave the reader at the payload.
fn open_artifact(artifact: &Path) -> Result<(ArtifactHeader, BufReader<File>)> {
    let mut input = BufReader::new(File::open(artifact)?);
    let header = ArtifactHeader::read_from(&mut input)?;
    tracing::debug!(artifact = %artifact.display(), length = header.length, "artifact header read");
    Ok((header, input))
}

/// Decode the payload into an anonymous temporary file, rewound to the start.
fn decode_to_temp(
    header: &ArtifactHeader,
    input: &mut dyn Read,
    compressor: &dyn StreamCompressor,
    staging: &Path,
    progress: CodecProgress<'_>,
) -> Result<File> {
    let mut intermediate = tempfile::tempfile_in(staging)?;
    {
        let mut out = BufWriter::new(&mut intermediate);
        compressor.decode(header, input, &mut out, progress)?;
        out.flush()?;
    }
    intermediate.seek(SeekFrom::Start(0))?;
    Ok(intermediate)
}

/// Unpack a stream-capability artifact.
pub(crate) fn unpack_stream(
    artifact: &Path,
    dest: &Path,
    compressor: &dyn StreamCompressor,
    sink: &mut dyn ProgressSink,
    options: &UnpackOptions,
) -> std::result::Result<ArchiveStats, UnpackError> {
    let mut stages = Stages::new(dest);
    let result = run_stream(artifact, dest, compressor, sink, &mut stages);
    stages.finish(result, artifact, options)
}

fn run_stream(
    artifact: &Path,
    dest: &Path,
    compressor: &dyn StreamCompressor,
    sink: &mut dyn ProgressSink,
    stages: &mut Stages<'_>,
) -> Result<ArchiveStats> {
    prepare(artifact, dest)?;

    stages.enter(UnpackState::Decompressing);
    let (header, mut input) = open_artifact(artifact)?;
    let mut progress = ProgressState::new(header.length, sink);
    progress.poll()?;

    let mut reported = 0u64;
    let intermediate = decode_to_temp(
        &header,
        &mut input,
        compressor,
        &staging_dir(dest)?,
        &mut |done| {
            progress.advance(done.saturating_sub(reported))?;
            reported = done;
            Ok(())
        },
    )?;
    drop(input);

    stages.enter(UnpackState::Deserializing);
    let mut entries = EntryStreamReader::new(BufReader::new(intermediate))?;
    let headers = entries.entries().to_vec();

    stages.enter(UnpackState::Materializing);
    let mut stats = ArchiveStats {
        stream_bytes: header.length,
        artifact_bytes: fs::metadata(artifact)?.len(),
        ..ArchiveStats::default()
    };
    for entry in &headers {
        progress.poll()?;
        let target = resolve(dest, &entry.path);
        if entry.is_dir() {
            tracing::debug!(path = %entry.path, "creating directory");
            fs::create_dir_all(&target)?;
            continue;
        }

        tracing::debug!(path = %entry.path, size = entry.size, "extracting file");
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(&target)?);
        entries.extract(entry, &mut out)?;
        out.flush()?;

        stats.files += 1;
        stats.content_bytes += entry.size;
    }

    progress.finish()?;
    stages.enter(UnpackState::Done);
    Ok(stats)
}

/// Unpack a directory-capability artifact.
///
/// The tool decodes and writes in one go, so the whole call is reported as
/// decompression and the sink sees only the start and the end.
pub(crate) fn unpack_directory(
    artifact: &Path,
    dest: &Path,
    tool: &dyn DirectoryCompressor,
    sink: &mut dyn ProgressSink,
    options: &UnpackOptions,
) -> std::result::Result<ArchiveStats, UnpackError> {
    let mut stages = Stages::new(dest);
    let result = run_directory(artifact, dest, tool, sink, &mut stages);
    stages.finish(result, artifact, options)
}

fn run_directory(
    artifact: &Path,
    dest: &Path,
    tool: &dyn DirectoryCompressor,
    sink: &mut dyn ProgressSink,
    stages: &mut Stages<'_>,
) -> Result<ArchiveStats> {
    prepare(artifact, dest)?;

    stages.enter(UnpackState::Decompressing);
    let artifact_bytes = fs::metadata(artifact)?.len();
    let mut progress = ProgressState::new(artifact_bytes, sink);
    progress.poll()?;
    tool.decompress_dir(artifact, dest)?;

    stages.enter(UnpackState::Materializing);
    let size = measure(dest)?;
    progress.finish()?;
    stages.enter(UnpackState::Done);

    Ok(ArchiveStats {
        files: size.files,
        content_bytes: size.bytes,
        stream_bytes: 0,
        artifact_bytes,
    })
}

/// Decode an artifact and index its entries without writing any file.
pub(crate) fn list_stream(
    artifact: &Path,
    compressor: &dyn StreamCompressor,
) -> Result<Vec<EntrySummary>> {
    if !artifact.is_file() {
        return Err(ArchiveError::source_not_found(artifact));
    }
    let (header, mut input) = open_artifact(artifact)?;
    let intermediate = decode_to_temp(
        &header,
        &mut input,
        compressor,
        &staging_dir(artifact)?,
        &mut |_| Ok(()),
    )?;
    let entries = EntryStreamReader::new(BufReader::new(intermediate))?;
    Ok(entries
        .entries()
        .iter()
        .map(|entry| EntrySummary {
            path: entry.path.clone(),
            size: entry.size,
        })
        .collect())
}
