use oxipack_archive::codec::CodecProgress;
use oxipack_archive::{
    ArchiveConfig, ArtifactHeader, Archiver, LzmaCompressor, PropertyBytes, StreamCompressor,
    UnpackState, serialize,
};
use oxipack_core::{ArchiveEntry, ArchiveError, NoProgress, Progress};
use oxipack_lzma::LzmaLevel;
use std::fs::{self, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

fn write(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn default_archiver() -> Archiver {
    Archiver::new(&ArchiveConfig::default()).unwrap()
}

fn sample_tree(root: &Path) {
    write(root, "a.txt", b"alpha alpha alpha");
    write(root, "b/c.txt", b"charlie");
    write(root, "b/d.bin", &[0xFF; 300]);
    write(root, "e.txt", b"echo");
    write(root, "f/g/h.txt", b"hotel");
}

fn names_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Stream compressor that wraps LZMA and fails at a chosen point.
struct Failing {
    inner: LzmaCompressor,
    fail_encode: bool,
}

impl StreamCompressor for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    fn encode(
        &self,
        input: &[u8],
        out: &mut dyn Write,
        progress: CodecProgress<'_>,
    ) -> oxipack_core::Result<PropertyBytes> {
        if self.fail_encode {
            out.write_all(b"partial payload")?;
            return Err(io::Error::other("disk full").into());
        }
        self.inner.encode(input, out, progress)
    }

    fn decode(
        &self,
        _header: &ArtifactHeader,
        _input: &mut dyn Read,
        _out: &mut dyn Write,
        _progress: CodecProgress<'_>,
    ) -> oxipack_core::Result<()> {
        Err(ArchiveError::corrupt(0, "refusing to decode"))
    }
}

#[test]
fn test_trailing_garbage_is_ignored() {
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("src");
    sample_tree(&source);

    let archiver = default_archiver();
    let artifact = work.path().join("garbage.pack");
    archiver.pack(&source, &artifact, &mut NoProgress).unwrap();

    let clean = work.path().join("clean");
    archiver.unpack(&artifact, &clean, &mut NoProgress).unwrap();

    let mut file = OpenOptions::new().append(true).open(&artifact).unwrap();
    file.write_all(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x01, 0x02]).unwrap();
    drop(file);

    let dirty = work.path().join("dirty");
    archiver.unpack(&artifact, &dirty, &mut NoProgress).unwrap();
    for name in ["a.txt", "b/c.txt", "b/d.bin", "e.txt", "f/g/h.txt"] {
        assert_eq!(
            fs::read(clean.join(name)).unwrap(),
            fs::read(dirty.join(name)).unwrap()
        );
    }
}

#[test]
fn test_truncation_at_every_offset_fails() {
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("src");
    write(&source, "a.txt", b"foo");
    write(&source, "sub/b.bin", b"");
    write(&source, "z.txt", b"a little more text so the payload spans some bytes");

    let archiver = default_archiver();
    let artifact = work.path().join("full.pack");
    archiver.pack(&source, &artifact, &mut NoProgress).unwrap();
    let bytes = fs::read(&artifact).unwrap();

    let truncated = work.path().join("cut.pack");
    for cut in 0..bytes.len() {
        fs::write(&truncated, &bytes[..cut]).unwrap();
        let err = archiver
            .unpack(&truncated, &work.path().join("out"), &mut NoProgress)
            .unwrap_err();
        assert!(
            err.error().is_format_error(),
            "cut at {} gave {}",
            cut,
            err
        );
        assert_eq!(err.state, UnpackState::Decompressing, "cut at {}", cut);
    }
}

#[test]
fn test_pack_progress_is_monotonic() {
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("src");
    sample_tree(&source);
    write(&source, "big.bin", &vec![7u8; 300_000]);
    let expected_total = 17 + 7 + 300 + 4 + 5 + 300_000;

    let mut reports = Vec::new();
    let mut sink = |processed: u64, total: u64| {
        reports.push((processed, total));
        Progress::Continue
    };
    default_archiver()
        .pack(&source, &work.path().join("p.pack"), &mut sink)
        .unwrap();

    assert!(!reports.is_empty());
    assert!(reports.iter().all(|&(_, total)| total == expected_total));
    assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(reports.last().unwrap().0, expected_total);
    // The large file is reported in several steps, not in one jump.
    let distinct: std::collections::BTreeSet<u64> = reports.iter().map(|r| r.0).collect();
    assert!(distinct.len() > 6);
}

#[test]
fn test_unpack_progress_is_monotonic() {
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("src");
    sample_tree(&source);

    let archiver = default_archiver();
    let artifact = work.path().join("u.pack");
    let stats = archiver.pack(&source, &artifact, &mut NoProgress).unwrap();

    let mut reports = Vec::new();
    let mut sink = |processed: u64, total: u64| {
        reports.push((processed, total));
        Progress::Continue
    };
    archiver
        .unpack(&artifact, &work.path().join("out"), &mut sink)
        .unwrap();

    assert!(reports.iter().all(|&(_, total)| total == stats.stream_bytes));
    assert!(reports.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(reports.last().unwrap().0, stats.stream_bytes);
}

#[test]
fn test_failed_encode_leaves_no_artifact() {
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("src");
    sample_tree(&source);
    let out_dir = work.path().join("artifacts");
    fs::create_dir(&out_dir).unwrap();
    let artifact = out_dir.join("app.pack");
    fs::write(&artifact, b"an older artifact").unwrap();

    let archiver = Archiver::with_stream_compressor(Box::new(Failing {
        inner: LzmaCompressor::default(),
        fail_encode: true,
    }));
    let err = archiver.pack(&source, &artifact, &mut NoProgress).unwrap_err();
    assert!(matches!(err, ArchiveError::Io(_)));
    assert!(!artifact.exists());
    assert!(names_in(&out_dir).is_empty(), "temporaries left behind");
}

#[test]
fn test_cancelled_pack_leaves_no_artifact() {
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("src");
    sample_tree(&source);
    let artifact = work.path().join("cancel.pack");

    // Abort once part of the third file has been read.
    let mut sink = |processed: u64, _total: u64| {
        if processed > 17 + 7 {
            Progress::Abort
        } else {
            Progress::Continue
        }
    };
    let err = default_archiver()
        .pack(&source, &artifact, &mut sink)
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Cancelled { processed } if processed > 24));
    assert!(!artifact.exists());
    assert_eq!(names_in(work.path()), vec!["src"]);
}

#[test]
fn test_missing_source_is_reported() {
    let work = tempfile::tempdir().unwrap();
    let artifact = work.path().join("none.pack");
    let err = default_archiver()
        .pack(&work.path().join("absent"), &artifact, &mut NoProgress)
        .unwrap_err();
    assert!(matches!(err, ArchiveError::SourceNotFound { .. }));
    assert!(!artifact.exists());
}

#[test]
fn test_missing_artifact_keeps_destination() {
    let work = tempfile::tempdir().unwrap();
    let dest = work.path().join("installed");
    write(&dest, "keep.txt", b"keep");

    let err = default_archiver()
        .unpack(&work.path().join("absent.pack"), &dest, &mut NoProgress)
        .unwrap_err();
    assert_eq!(err.state, UnpackState::NotStarted);
    assert!(matches!(err.error(), ArchiveError::SourceNotFound { .. }));
    assert_eq!(fs::read(dest.join("keep.txt")).unwrap(), b"keep");
}

#[test]
fn test_cancelled_unpack_leaves_partial_destination() {
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("src");
    sample_tree(&source);

    let archiver = default_archiver();
    let artifact = work.path().join("partial.pack");
    let stats = archiver.pack(&source, &artifact, &mut NoProgress).unwrap();

    // Let decoding finish, then stop before the last entries are written.
    let mut at_total = 0;
    let mut sink = |processed: u64, total: u64| {
        if processed == total {
            at_total += 1;
        }
        if at_total >= 3 {
            Progress::Abort
        } else {
            Progress::Continue
        }
    };
    let dest = work.path().join("out");
    let err = archiver.unpack(&artifact, &dest, &mut sink).unwrap_err();

    assert_eq!(err.state, UnpackState::Materializing);
    assert!(matches!(err.error(), ArchiveError::Cancelled { processed } if *processed == stats.stream_bytes));
    assert!(err.to_string().contains("partially populated"));
    assert!(dest.is_dir());
    assert!(!dest.join("f/g/h.txt").exists());
    if dest.join("a.txt").exists() {
        assert_eq!(fs::read(dest.join("a.txt")).unwrap(), b"alpha alpha alpha");
    }
}

#[test]
fn test_decode_failure_reports_stage() {
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("src");
    sample_tree(&source);
    let artifact = work.path().join("d.pack");
    default_archiver()
        .pack(&source, &artifact, &mut NoProgress)
        .unwrap();

    let archiver = Archiver::with_stream_compressor(Box::new(Failing {
        inner: LzmaCompressor::default(),
        fail_encode: false,
    }));
    let err = archiver
        .unpack(&artifact, &work.path().join("out"), &mut NoProgress)
        .unwrap_err();
    assert_eq!(err.state, UnpackState::Decompressing);
    assert!(matches!(err.into_error(), ArchiveError::CorruptArchive { .. }));
}

#[test]
fn test_damaged_entry_stream_reports_stage() {
    let work = tempfile::tempdir().unwrap();
    let mut stream = serialize(&[
        ArchiveEntry::file("one.txt", b"one".to_vec()),
        ArchiveEntry::file("two.txt", b"two".to_vec()),
    ])
    .unwrap();
    stream.pop();

    let mut payload = Vec::new();
    let properties = oxipack_lzma::encode(&stream, LzmaLevel::DEFAULT, &mut payload).unwrap();
    let mut artifact_bytes = Vec::new();
    ArtifactHeader {
        properties: properties.to_bytes(),
        length: stream.len() as u64,
    }
    .write_to(&mut artifact_bytes)
    .unwrap();
    artifact_bytes.extend_from_slice(&payload);
    let artifact = work.path().join("damaged.pack");
    fs::write(&artifact, &artifact_bytes).unwrap();

    let dest = work.path().join("out");
    let err = default_archiver()
        .unpack(&artifact, &dest, &mut NoProgress)
        .unwrap_err();
    assert_eq!(err.state, UnpackState::Deserializing);
    assert!(matches!(err.error(), ArchiveError::TruncatedStream { .. }));
    assert!(names_in(&dest).is_empty());
}

#[test]
fn test_unknown_strategy_fails_at_construction() {
    let err = Archiver::new(&ArchiveConfig::with_strategy("zip")).unwrap_err();
    assert!(matches!(err, ArchiveError::Configuration { .. }));
}

#[test]
fn test_unpack_refuses_artifact_inside_destination() {
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("src");
    sample_tree(&source);

    let archiver = default_archiver();
    let out = work.path().join("out");
    let artifact = out.join("app.pack");
    archiver.pack(&source, &artifact, &mut NoProgress).unwrap();
    let packed = fs::read(&artifact).unwrap();
    write(&out, "notes.txt", b"keep me");

    let err = archiver
        .unpack(&artifact, &out, &mut NoProgress)
        .unwrap_err();
    assert_eq!(err.state, UnpackState::NotStarted);
    assert!(matches!(err.error(), ArchiveError::Configuration { .. }));
    assert_eq!(fs::read(&artifact).unwrap(), packed);
    assert_eq!(fs::read(out.join("notes.txt")).unwrap(), b"keep me");
}

#[test]
fn test_source_file_vanishing_mid_pack_leaves_no_artifact() {
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("src");
    sample_tree(&source);
    let out_dir = work.path().join("artifacts");
    fs::create_dir(&out_dir).unwrap();
    let artifact = out_dir.join("app.pack");
    fs::write(&artifact, b"an older artifact").unwrap();

    // The tree has been enumerated by the first report; the last file is
    // gone by the time the writer opens it.
    let victim = source.join("f/g/h.txt");
    let mut sink = |_processed: u64, _total: u64| {
        let _ = fs::remove_file(&victim);
        Progress::Continue
    };
    let err = default_archiver()
        .pack(&source, &artifact, &mut sink)
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Io(ref e) if e.kind() == io::ErrorKind::NotFound));
    assert!(!artifact.exists());
    assert!(names_in(&out_dir).is_empty(), "temporaries left behind");
}

#[cfg(unix)]
#[test]
fn test_drive_prefixed_name_is_rejected() {
    let work = tempfile::tempdir().unwrap();
    let source = work.path().join("src");
    write(&source, "a.txt", b"fine");
    write(&source, "c:notes.txt", b"looks like a drive on Windows");
    let artifact = work.path().join("drive.pack");

    let err = default_archiver()
        .pack(&source, &artifact, &mut NoProgress)
        .unwrap_err();
    assert!(matches!(err, ArchiveError::Encoding { .. }));
    assert!(err.to_string().contains("drive prefix"));
    assert!(!artifact.exists());
    assert_eq!(names_in(work.path()), vec!["src"]);
}
