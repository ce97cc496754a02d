use std::fs::{self, File};
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use unnest::{Config, Extractor, RunStats};

/// Helper to create a ZIP archive in memory
fn zip_bytes(files: &[(&str, &[u8])]) -> Vec<u8> {
    use zip::write::{SimpleFileOptions, ZipWriter};

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for (name, content) in files {
        zip.start_file(*name, options).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

fn write_zip(path: &Path, files: &[(&str, &[u8])]) {
    fs::write(path, zip_bytes(files)).unwrap();
}

/// Helper to create a TAR.GZ archive; names are written verbatim into the header
fn write_tar_gz(path: &Path, files: &[(&str, &[u8])]) {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let file = File::create(path).unwrap();
    let encoder = GzEncoder::new(file, Compression::default());
    let mut tar = tar::Builder::new(encoder);

    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        let raw_name = name.as_bytes();
        header.as_old_mut().name[..raw_name.len()].copy_from_slice(raw_name);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append(&header, &content[..]).unwrap();
    }

    tar.into_inner().unwrap().finish().unwrap();
}

fn config(max_ratio: f64, max_depth: u32, preserve: bool) -> Config {
    Config {
        max_extraction_ratio: max_ratio,
        max_nested_depth: max_depth,
        preserve_originals: preserve,
        ..Config::default()
    }
}

fn run(root: &Path, config: Config) -> (RunStats, Extractor) {
    let mut extractor = Extractor::new(config);
    let stats = extractor.extract_all(root).unwrap();
    assert_consistent(&stats);
    (stats, extractor)
}

fn assert_consistent(stats: &RunStats) {
    assert_eq!(
        stats.total_processed,
        stats.successful + stats.failed + stats.skipped
    );
    assert_eq!(stats.errors.len() as u64, stats.failed);
}

fn find_file(root: &Path, name: &str) -> Option<PathBuf> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .find(|e| e.file_type().is_file() && e.file_name() == name)
        .map(|e| e.into_path())
}

#[test]
fn test_single_zip_is_extracted_alongside() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("archive.zip");
    write_zip(&archive, &[("readme.txt", b"Hello, World!")]);

    let (stats, _) = run(temp.path(), Config::default());

    assert_eq!(stats.successful, 1);
    assert_eq!(stats.failed, 0);
    assert_eq!(
        fs::read(temp.path().join("readme.txt")).unwrap(),
        b"Hello, World!"
    );
    assert!(archive.exists());
}

#[test]
fn test_nested_zip_is_extracted_recursively() {
    let temp = TempDir::new().unwrap();
    let inner = zip_bytes(&[("data.txt", b"inner data")]);
    write_zip(&temp.path().join("outer.zip"), &[("inner.zip", &inner)]);

    let (stats, extractor) = run(temp.path(), config(100.0, 3, true));

    assert_eq!(stats.successful, 2);
    assert!(temp.path().join("inner.zip").exists());
    assert_eq!(
        fs::read(temp.path().join("data.txt")).unwrap(),
        b"inner data"
    );
    assert_eq!(extractor.processed().len(), 2);
}

#[test]
fn test_zipbomb_ratio_is_rejected_before_extraction() {
    let temp = TempDir::new().unwrap();
    let payload = vec![b'A'; 100_000];
    let archive = temp.path().join("bomb.zip");
    write_zip(&archive, &[("big.txt", &payload)]);
    assert!(fs::metadata(&archive).unwrap().len() < 1_000);

    let (stats, _) = run(temp.path(), config(50.0, 3, true));

    assert_eq!(stats.failed, 1);
    assert_eq!(stats.successful, 0);
    assert!(stats.errors[0].message.contains("ratio"));
    assert!(!temp.path().join("big.txt").exists());
}

#[test]
fn test_corrupted_zip_fails() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("corrupted.zip"),
        b"this is definitely not a zip archive",
    )
    .unwrap();

    let (stats, _) = run(temp.path(), Config::default());

    assert_eq!(stats.failed, 1);
    assert!(stats.errors[0].message.contains("Corrupted"));
}

#[test]
fn test_nested_depth_limit_blocks_deep_chain() {
    let temp = TempDir::new().unwrap();
    let inner = zip_bytes(&[("secret.txt", b"deep")]);
    let middle = zip_bytes(&[("inner.zip", &inner)]);
    write_zip(&temp.path().join("outer.zip"), &[("middle.zip", &middle)]);

    let (stats, _) = run(temp.path(), config(100.0, 1, true));

    assert!(stats.total_processed >= 1);
    assert!(stats.failed >= 1);
    assert!(stats
        .errors
        .iter()
        .any(|e| e.message.contains("nested depth")));
    assert!(!temp.path().join("secret.txt").exists());
}

#[test]
fn test_originals_removed_when_not_preserved() {
    let temp = TempDir::new().unwrap();
    let archive = temp.path().join("archive.zip");
    write_zip(&archive, &[("content.txt", b"keep me")]);

    let (stats, _) = run(temp.path(), config(100.0, 3, false));

    assert_eq!(stats.successful, 1);
    assert!(!archive.exists());
    assert!(temp.path().join("content.txt").exists());
}

#[test]
fn test_split_parts_are_skipped() {
    let temp = TempDir::new().unwrap();
    for name in ["movie.part1.rar", "movie.part2.rar", "movie.part3.rar", "legacy.r00"] {
        fs::write(temp.path().join(name), b"not really a rar volume").unwrap();
    }
    fs::write(temp.path().join("lone.rar"), b"not really a rar either").unwrap();

    let (stats, _) = run(temp.path(), Config::default());

    // part2/part3 are continuations; .r00 is never discovered as an archive
    assert_eq!(stats.skipped, 2);
    assert_eq!(stats.failed, 2);
    let failed: Vec<_> = stats
        .errors
        .iter()
        .map(|e| e.path.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(failed, vec!["lone.rar", "movie.part1.rar"]);
}

#[test]
fn test_terminates_within_iteration_cap() {
    let temp = TempDir::new().unwrap();
    let mut payload = zip_bytes(&[("bottom.txt", b"bottom")]);
    for level in 0..5 {
        payload = zip_bytes(&[(&format!("level{level}.zip"), &payload)]);
    }
    fs::write(temp.path().join("top.zip"), &payload).unwrap();

    let max_depth = 2;
    let (stats, _) = run(temp.path(), config(100.0, max_depth, true));

    assert!(stats.iterations <= max_depth + 1);
    assert!(!temp.path().join("bottom.txt").exists());
}

#[test]
fn test_each_archive_processed_at_most_once() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();
    write_zip(&temp.path().join("a.zip"), &[("a.txt", b"a")]);
    write_zip(&temp.path().join("sub/b.zip"), &[("b.txt", b"b")]);
    fs::write(temp.path().join("broken.zip"), b"garbage").unwrap();

    let (stats, extractor) = run(temp.path(), Config::default());

    assert_eq!(stats.total_processed, 3);
    assert_eq!(extractor.processed().len(), 3);
    assert!(temp.path().join("sub/b.txt").exists());
}

#[test]
fn test_incomplete_downloads_are_ignored() {
    let temp = TempDir::new().unwrap();
    write_zip(&temp.path().join("pending.zip.part"), &[("x.txt", b"x")]);
    write_zip(&temp.path().join("pending.zip.!qB"), &[("y.txt", b"y")]);

    let (stats, _) = run(temp.path(), Config::default());

    assert_eq!(stats.total_processed, 0);
    assert_eq!(stats.iterations, 1);
    assert!(!temp.path().join("x.txt").exists());
}

#[test]
fn test_tar_gz_traversal_member_is_dropped() {
    let temp = TempDir::new().unwrap();
    let work = temp.path().join("work");
    fs::create_dir(&work).unwrap();
    write_tar_gz(
        &work.join("mixed.tar.gz"),
        &[("ok.txt", b"fine"), ("../escaped.txt", b"nope")],
    );

    let (stats, _) = run(&work, Config::default());

    assert_eq!(stats.successful, 1);
    assert_eq!(fs::read(work.join("ok.txt")).unwrap(), b"fine");
    assert!(!temp.path().join("escaped.txt").exists());
}

#[test]
fn test_tar_gz_with_only_traversal_members_fails() {
    let temp = TempDir::new().unwrap();
    let work = temp.path().join("work");
    fs::create_dir(&work).unwrap();
    write_tar_gz(&work.join("evil.tgz"), &[("../escaped.txt", b"nope")]);

    let (stats, _) = run(&work, Config::default());

    assert_eq!(stats.failed, 1);
    assert!(stats.errors[0].message.contains("Path traversal"));
    assert!(!temp.path().join("escaped.txt").exists());
}

#[test]
fn test_seven_zip_is_extracted() {
    let temp = TempDir::new().unwrap();
    let source = TempDir::new().unwrap();
    fs::write(source.path().join("seven.txt"), b"from a 7z archive").unwrap();

    let work = temp.path().join("work");
    fs::create_dir(&work).unwrap();
    sevenz_rust2::compress_to_path(source.path(), work.join("packed.7z")).unwrap();

    let (stats, _) = run(&work, Config::default());

    assert_eq!(stats.successful, 1);
    let extracted = find_file(&work, "seven.txt").expect("seven.txt extracted");
    assert_eq!(fs::read(extracted).unwrap(), b"from a 7z archive");
}

#[test]
fn test_encrypted_seven_zip_fails_without_output() {
    use sevenz_rust2::{AesEncoderOptions, SevenZArchiveEntry, SevenZMethod, SevenZWriter};

    let temp = TempDir::new().unwrap();
    let mut writer = SevenZWriter::create(temp.path().join("locked.7z")).unwrap();
    writer.set_content_methods(vec![
        AesEncoderOptions::new("secret".into()).into(),
        SevenZMethod::LZMA2.into(),
    ]);
    writer.set_encrypt_header(false);
    writer
        .push_archive_entry(
            SevenZArchiveEntry::new_file("hidden.txt"),
            Some(&b"classified"[..]),
        )
        .unwrap();
    writer.finish().unwrap();

    let (stats, _) = run(temp.path(), Config::default());

    assert_eq!(stats.failed, 1);
    assert!(stats.errors[0].message.contains("Password protected"));
    assert!(find_file(temp.path(), "hidden.txt").is_none());
}

#[test]
fn test_zip_inside_tar_gz() {
    let temp = TempDir::new().unwrap();
    let inner = zip_bytes(&[("final.txt", b"done")]);
    write_tar_gz(&temp.path().join("bundle.tar.gz"), &[("inner.zip", &inner)]);

    let (stats, _) = run(temp.path(), Config::default());

    assert_eq!(stats.successful, 2);
    assert!(temp.path().join("final.txt").exists());
}

#[test]
fn test_rerun_processes_again() {
    let temp = TempDir::new().unwrap();
    write_zip(&temp.path().join("a.zip"), &[("a.txt", b"a")]);

    let mut extractor = Extractor::new(Config::default());
    let first = extractor.extract_all(temp.path()).unwrap();
    let second = extractor.extract_all(temp.path()).unwrap();

    assert_eq!(first.successful, 1);
    assert_eq!(second.successful, 1);
    assert_eq!(extractor.processed().len(), 1);
}
