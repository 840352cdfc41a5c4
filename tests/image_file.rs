mod common;

use std::fs;

use minifs::fsck::{run_fsck, RawImage};
use minifs::mkfs::{format, FormatOptions, SeedFile, HELLO_CONTENT};
use minifs::{FsError, InodeKind, Minifs};
use tempfile::tempdir;

fn write_image(opts: &FormatOptions) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("disk.img");
    fs::write(&path, format(opts).unwrap()).unwrap();
    (dir, path)
}

#[test]
fn changes_survive_sync_and_reopen() {
    let opts = FormatOptions {
        seed: vec![SeedFile::hello()],
        ..FormatOptions::default()
    };
    let (_dir, path) = write_image(&opts);

    let mut fs = Minifs::open(&path).unwrap();
    assert_eq!(fs.backing_path(), Some(path.as_path()));
    fs.create("/nuevo", InodeKind::RegularFile, 0o644).unwrap();
    fs.write("/nuevo", 0, b"persistente").unwrap();
    fs.unlink("/hello.txt").unwrap();
    fs.sync().unwrap();
    drop(fs);

    let fs = Minifs::open(&path).unwrap();
    assert_eq!(common::names(&fs), ["nuevo"]);
    assert_eq!(fs.read("/nuevo", 0, 100).unwrap(), b"persistente");

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 128 * 4096);
    assert!(run_fsck(&RawImage::new(&bytes)).is_clean());
}

#[test]
fn nothing_is_written_without_sync() {
    let opts = FormatOptions {
        seed: vec![SeedFile::hello()],
        ..FormatOptions::default()
    };
    let (_dir, path) = write_image(&opts);
    let before = fs::read(&path).unwrap();

    let mut fs = Minifs::open(&path).unwrap();
    fs.write("/hello.txt", 0, b"XXXX").unwrap();
    drop(fs);

    assert_eq!(fs::read(&path).unwrap(), before);
    let fs = Minifs::open(&path).unwrap();
    assert_eq!(fs.read("/hello.txt", 0, 100).unwrap(), HELLO_CONTENT);
}

#[test]
fn in_memory_sync_is_a_no_op() {
    let fs = common::empty_fs();
    assert!(fs.backing_path().is_none());
    fs.sync().unwrap();
}

#[test]
fn open_rejects_bad_images() {
    let dir = tempdir().unwrap();

    let missing = dir.path().join("missing.img");
    assert!(matches!(Minifs::open(&missing), Err(FsError::Io(_))));

    let short = dir.path().join("short.img");
    fs::write(&short, vec![0u8; 100]).unwrap();
    assert!(matches!(Minifs::open(&short), Err(FsError::Corrupt { .. })));

    // total_blocks no coincide con el largo del archivo
    let mut bytes = format(&FormatOptions::default()).unwrap();
    bytes.truncate(64 * 4096);
    let truncated = dir.path().join("truncated.img");
    fs::write(&truncated, bytes).unwrap();
    assert!(matches!(
        Minifs::open(&truncated),
        Err(FsError::Corrupt { .. })
    ));
}

#[test]
fn open_rejects_directory_with_holes() {
    let opts = FormatOptions {
        seed: vec![
            SeedFile::hello(),
            SeedFile {
                name: "b".into(),
                content: Vec::new(),
            },
        ],
        ..FormatOptions::default()
    };
    let mut bytes = format(&opts).unwrap();
    // ranura 0 vaciada sin compactar
    let dir = 4 * 4096;
    bytes[dir..dir + 32].fill(0);
    assert!(matches!(
        Minifs::from_bytes(bytes),
        Err(FsError::Corrupt { .. })
    ));
}
