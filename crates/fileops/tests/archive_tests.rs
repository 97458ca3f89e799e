use filetime::FileTime;
use fileops::archive::{self, compress_selection, extract_auto, ArchiveFormat};
use fileops::{EngineConfig, FileOpError};
use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const STAMP: i64 = 1_600_000_000;

fn no_progress() -> impl Fn(&Path) + Send + Sync {
    |_: &Path| {}
}

fn mtime(path: &Path) -> i64 {
    FileTime::from_last_modification_time(&fs::metadata(path).unwrap()).unix_seconds()
}

/// parent/top.txt, parent/docs/a.txt, parent/docs/sub/b.bin, all stamped STAMP.
fn build_fixture(root: &Path) -> (PathBuf, Vec<PathBuf>) {
    let parent = root.join("parent");
    fs::create_dir_all(parent.join("docs/sub")).unwrap();
    fs::write(parent.join("top.txt"), b"top level").unwrap();
    fs::write(parent.join("docs/a.txt"), b"alpha").unwrap();
    let binary: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 256) as u8).collect();
    fs::write(parent.join("docs/sub/b.bin"), binary).unwrap();

    for file in ["top.txt", "docs/a.txt", "docs/sub/b.bin"] {
        filetime::set_file_mtime(parent.join(file), FileTime::from_unix_time(STAMP, 0)).unwrap();
    }

    let selection = vec![parent.join("top.txt"), parent.join("docs")];
    (parent, selection)
}

fn assert_fixture_restored(parent: &Path, out: &Path, tolerance: i64) {
    for file in ["top.txt", "docs/a.txt", "docs/sub/b.bin"] {
        let restored = out.join(file);
        assert_eq!(
            fs::read(&restored).unwrap(),
            fs::read(parent.join(file)).unwrap(),
            "content of {file}"
        );
        let delta = (mtime(&restored) - STAMP).abs();
        assert!(delta <= tolerance, "mtime of {file} off by {delta}s");
    }
}

#[test]
fn test_zip_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let (parent, selection) = build_fixture(temp_dir.path());
    let progress = no_progress();

    let stats = compress_selection(
        ArchiveFormat::Zip,
        &temp_dir.path().join("bundle"),
        &parent,
        &selection,
        &EngineConfig::default(),
        &progress,
    )
    .unwrap();
    assert_eq!(stats.archive, temp_dir.path().join("bundle.zip"));

    let names: Vec<&str> = stats.entries.iter().map(|e| e.relative_path.as_str()).collect();
    assert_eq!(
        names,
        vec!["top.txt", "docs/", "docs/a.txt", "docs/sub/", "docs/sub/b.bin"]
    );

    let out = temp_dir.path().join("out");
    let extracted = archive::extract(ArchiveFormat::Zip, &stats.archive, &out, &progress).unwrap();
    assert_eq!(extracted.files_extracted, 3);
    assert_eq!(extracted.directories_created, 2);
    assert_fixture_restored(&parent, &out, 2);
}

#[test]
fn test_tar_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let (parent, selection) = build_fixture(temp_dir.path());
    let progress = no_progress();

    let stats = compress_selection(
        ArchiveFormat::Tar,
        &temp_dir.path().join("bundle.tar"),
        &parent,
        &selection,
        &EngineConfig::default(),
        &progress,
    )
    .unwrap();

    let out = temp_dir.path().join("out");
    let extracted = extract_auto(&stats.archive, &out, &progress).unwrap();
    assert_eq!(extracted.files_extracted, 3);
    assert_eq!(extracted.bytes_written, 9 + 5 + 4096);
    assert_fixture_restored(&parent, &out, 0);
}

#[cfg(unix)]
#[test]
fn test_tar_restores_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let script = temp_dir.path().join("run.sh");
    fs::write(&script, b"#!/bin/sh\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o750)).unwrap();
    let progress = no_progress();

    let stats = archive::compress(
        ArchiveFormat::Tar,
        &temp_dir.path().join("perm.tar"),
        temp_dir.path(),
        &[script],
        &EngineConfig::default(),
        &progress,
    )
    .unwrap();

    let out = temp_dir.path().join("out");
    archive::extract(ArchiveFormat::Tar, &stats.archive, &out, &progress).unwrap();
    let mode = fs::metadata(out.join("run.sh")).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o750);
}

#[test]
fn test_gzip_single_file_round_trip() {
    let temp_dir = TempDir::new().unwrap();
    let (parent, _) = build_fixture(temp_dir.path());
    let progress = no_progress();

    let stats = archive::compress(
        ArchiveFormat::Gzip,
        &temp_dir.path().join("top"),
        &parent,
        &[parent.join("top.txt")],
        &EngineConfig::default(),
        &progress,
    )
    .unwrap();
    assert_eq!(stats.archive, temp_dir.path().join("top.gz"));

    let out = temp_dir.path().join("out");
    let extracted = archive::extract(ArchiveFormat::Gzip, &stats.archive, &out, &progress).unwrap();
    assert_eq!(extracted.files_extracted, 1);
    assert_eq!(fs::read(out.join("top.txt")).unwrap(), b"top level");
    assert_eq!(mtime(&out.join("top.txt")), STAMP);
}

#[test]
fn test_gzip_header_fields() {
    let temp_dir = TempDir::new().unwrap();
    let (parent, _) = build_fixture(temp_dir.path());
    let progress = no_progress();

    let stats = archive::compress(
        ArchiveFormat::Gzip,
        &temp_dir.path().join("top.gz"),
        &parent,
        &[parent.join("top.txt")],
        &EngineConfig::default(),
        &progress,
    )
    .unwrap();

    let decoder = flate2::read::GzDecoder::new(File::open(&stats.archive).unwrap());
    let header = decoder.header().unwrap();
    assert_eq!(header.filename(), Some(&b"top.txt"[..]));
    assert_eq!(i64::from(header.mtime()), STAMP);
    assert_eq!(header.operating_system(), archive::host_os_code());
    let comment = String::from_utf8(header.comment().unwrap().to_vec()).unwrap();
    assert!(comment.ends_with("top.gz"));
    assert!(!comment.contains('\\'));
}

#[test]
fn test_gzip_of_many_files_is_tar_payload() {
    let temp_dir = TempDir::new().unwrap();
    let (parent, selection) = build_fixture(temp_dir.path());
    let progress = no_progress();

    let stats = compress_selection(
        ArchiveFormat::Gzip,
        &temp_dir.path().join("bundle.gz"),
        &parent,
        &selection,
        &EngineConfig::default(),
        &progress,
    )
    .unwrap();

    let decoder = flate2::read::GzDecoder::new(File::open(&stats.archive).unwrap());
    assert_eq!(decoder.header().unwrap().filename(), Some(&b"parent.tar"[..]));

    // Same bytes under three names: .gz, .tgz and no suffix at all
    for name in ["as.gz", "as.tgz", "as-plain"] {
        let copy = temp_dir.path().join(name);
        fs::copy(&stats.archive, &copy).unwrap();

        let out = temp_dir.path().join(format!("out-{name}"));
        let extracted = archive::extract(ArchiveFormat::Gzip, &copy, &out, &progress).unwrap();
        assert_eq!(extracted.files_extracted, 3, "extracting {name}");
        assert_fixture_restored(&parent, &out, 0);
    }
}

#[test]
fn test_tgz_name_wins_over_embedded_name() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("odd.tgz");

    let mut payload = Vec::new();
    {
        let mut builder = tar::Builder::new(&mut payload);
        let mut header = tar::Header::new_gnu();
        header.set_size(4);
        header.set_mode(0o644);
        builder.append_data(&mut header, "one.txt", &b"one!"[..]).unwrap();
        let mut header = tar::Header::new_gnu();
        header.set_size(4);
        header.set_mode(0o644);
        builder.append_data(&mut header, "dir/two.txt", &b"two!"[..]).unwrap();
        builder.finish().unwrap();
    }
    let mut encoder = GzBuilder::new()
        .filename("payload.bin")
        .write(File::create(&archive_path).unwrap(), Compression::default());
    encoder.write_all(&payload).unwrap();
    encoder.finish().unwrap();

    let out = temp_dir.path().join("out");
    let extracted = extract_auto(&archive_path, &out, &no_progress()).unwrap();
    assert_eq!(extracted.files_extracted, 2);
    assert_eq!(fs::read(out.join("dir/two.txt")).unwrap(), b"two!");
}

#[test]
fn test_gzip_without_name_is_tar_payload() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("anon.gz");

    let encoder = GzEncoder::new(File::create(&archive_path).unwrap(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut header = tar::Header::new_gnu();
    header.set_size(5);
    header.set_mode(0o644);
    builder.append_data(&mut header, "hello.txt", &b"hello"[..]).unwrap();
    builder.into_inner().unwrap().finish().unwrap();

    let out = temp_dir.path().join("out");
    let extracted = archive::extract(ArchiveFormat::Gzip, &archive_path, &out, &no_progress()).unwrap();
    assert_eq!(extracted.files_extracted, 1);
    assert_eq!(fs::read(out.join("hello.txt")).unwrap(), b"hello");
}

#[test]
fn test_raw_gzip_named_in_header() {
    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("notes.gz");

    let mut encoder = GzBuilder::new()
        .filename("notes.txt")
        .write(File::create(&archive_path).unwrap(), Compression::default());
    encoder.write_all(b"just some notes").unwrap();
    encoder.finish().unwrap();

    let out = temp_dir.path().join("out");
    let extracted = archive::extract(ArchiveFormat::Gzip, &archive_path, &out, &no_progress()).unwrap();
    assert_eq!(extracted.files_extracted, 1);
    assert_eq!(fs::read(out.join("notes.txt")).unwrap(), b"just some notes");
}

#[test]
fn test_unsafe_zip_entries_are_skipped() {
    use zip::write::{SimpleFileOptions, ZipWriter};

    let temp_dir = TempDir::new().unwrap();
    let archive_path = temp_dir.path().join("evil.zip");
    let mut zip = ZipWriter::new(File::create(&archive_path).unwrap());
    zip.start_file("../escape.txt", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"nope").unwrap();
    zip.start_file("fine.txt", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"yes").unwrap();
    zip.finish().unwrap();

    let out = temp_dir.path().join("out");
    let extracted = archive::extract(ArchiveFormat::Zip, &archive_path, &out, &no_progress()).unwrap();

    assert_eq!(extracted.entries_skipped, 1);
    assert_eq!(extracted.files_extracted, 1);
    assert!(out.join("fine.txt").exists());
    assert!(!temp_dir.path().join("escape.txt").exists());
}

#[test]
fn test_extract_missing_archive() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("missing.zip");
    let result = archive::extract(
        ArchiveFormat::Zip,
        &missing,
        &temp_dir.path().join("out"),
        &no_progress(),
    );
    assert!(matches!(result, Err(FileOpError::NotFound(p)) if p == missing));
}

#[test]
fn test_extract_garbage_is_corrupted() {
    let temp_dir = TempDir::new().unwrap();
    let bogus = temp_dir.path().join("bogus.zip");
    fs::write(&bogus, b"this is not a zip archive at all").unwrap();

    let result = archive::extract(ArchiveFormat::Zip, &bogus, &temp_dir.path().join("out"), &no_progress());
    assert!(matches!(result, Err(FileOpError::Corrupted(_))));
}

#[test]
fn test_compress_missing_source_leaves_no_archive() {
    let temp_dir = TempDir::new().unwrap();
    let output = temp_dir.path().join("broken.zip");

    let result = archive::compress(
        ArchiveFormat::Zip,
        &output,
        temp_dir.path(),
        &[temp_dir.path().join("ghost.txt")],
        &EngineConfig::default(),
        &no_progress(),
    );

    assert!(matches!(result, Err(FileOpError::NotFound(_))));
    assert!(!output.exists());
    assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);
}

#[test]
fn test_compress_selection_respects_cap() {
    let temp_dir = TempDir::new().unwrap();
    let (parent, selection) = build_fixture(temp_dir.path());
    let config = EngineConfig {
        max_tree_entries: 3,
        ..Default::default()
    };

    let result = compress_selection(
        ArchiveFormat::Tar,
        &temp_dir.path().join("capped.tar"),
        &parent,
        &selection,
        &config,
        &no_progress(),
    );
    assert!(matches!(
        result,
        Err(FileOpError::TooManyEntries { limit: 2, .. })
    ));
}

#[test]
fn test_compress_pulses_once_per_entry() {
    let temp_dir = TempDir::new().unwrap();
    let (parent, selection) = build_fixture(temp_dir.path());

    let pulses = std::sync::atomic::AtomicUsize::new(0);
    let progress = |_: &Path| {
        pulses.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    };
    compress_selection(
        ArchiveFormat::Zip,
        &temp_dir.path().join("counted.zip"),
        &parent,
        &selection,
        &EngineConfig::default(),
        &progress,
    )
    .unwrap();

    assert_eq!(pulses.into_inner(), 5);
}

#[cfg(unix)]
#[test]
fn test_archive_gets_regular_file_mode() {
    use std::os::unix::fs::PermissionsExt;

    let temp_dir = TempDir::new().unwrap();
    let (parent, selection) = build_fixture(temp_dir.path());
    let plain = temp_dir.path().join("plain.txt");
    File::create(&plain).unwrap();

    for format in [ArchiveFormat::Zip, ArchiveFormat::Tar, ArchiveFormat::Gzip] {
        let stats = compress_selection(
            format,
            &temp_dir.path().join("shared"),
            &parent,
            &selection,
            &EngineConfig::default(),
            &no_progress(),
        )
        .unwrap();

        let mode = |path: &Path| fs::metadata(path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode(&stats.archive), mode(&plain), "{format}");
    }
}
