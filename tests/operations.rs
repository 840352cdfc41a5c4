mod common;

use common::{empty_fs, hello_fs, names, patch_inode};
use minifs::mkfs::{format, FormatOptions, HELLO_CONTENT};
use minifs::{FsError, InodeKind, Minifs, BLOCK_SIZE, ROOT_INODE};

#[test]
fn hello_file_end_to_end() {
    let fs = hello_fs();

    let entries = fs.list_directory("/").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "hello.txt");
    assert_eq!(entries[0].ino, 1);
    assert_eq!(entries[0].kind, InodeKind::RegularFile);

    let attrs = fs.attributes("/hello.txt").unwrap();
    assert_eq!(attrs.size, 13);
    assert_eq!(attrs.perm, 0o644);
    assert_eq!(attrs.link_count, 1);

    assert_eq!(fs.read("/hello.txt", 0, 4096).unwrap(), HELLO_CONTENT);
    assert_eq!(fs.read("/hello.txt", 5, 6).unwrap(), b"MiniFS");
    assert!(fs.read("/hello.txt", 13, 10).unwrap().is_empty());
    assert!(fs.read("/hello.txt", 1000, 10).unwrap().is_empty());
}

#[test]
fn root_attributes() {
    let fs = hello_fs();
    for path in ["/", "", ".", ".."] {
        let attrs = fs.attributes(path).unwrap();
        assert_eq!(attrs.ino, ROOT_INODE);
        assert_eq!(attrs.kind, InodeKind::Directory);
        assert_eq!(attrs.perm, 0o755);
        assert_eq!(attrs.size, 32);
    }
    assert_eq!(fs.label(), "MiniExt2FS");
}

#[test]
fn missing_and_nested_paths() {
    let fs = hello_fs();
    assert!(matches!(fs.attributes("/nope"), Err(FsError::NotFound)));
    assert!(matches!(fs.read("/nope", 0, 1), Err(FsError::NotFound)));
    assert!(matches!(
        fs.attributes("/hello.txt/x"),
        Err(FsError::Unsupported(_))
    ));
}

#[test]
fn create_write_read() {
    let mut fs = hello_fs();
    let ino = fs.create("/notes.txt", InodeKind::RegularFile, 0o600).unwrap();
    assert_eq!(ino, 2);

    let attrs = fs.attributes("/notes.txt").unwrap();
    assert_eq!(attrs.size, 0);
    assert_eq!(attrs.blocks, 0);
    assert_eq!(attrs.perm, 0o600);

    assert_eq!(fs.write("/notes.txt", 0, b"hola").unwrap(), 4);
    assert_eq!(fs.write("/notes.txt", 10, b"mundo").unwrap(), 5);
    let attrs = fs.attributes("/notes.txt").unwrap();
    assert_eq!(attrs.size, 15);
    assert_eq!(attrs.blocks, 1);

    let data = fs.read("/notes.txt", 0, 100).unwrap();
    assert_eq!(&data[..4], b"hola");
    assert_eq!(&data[4..10], &[0; 6]);
    assert_eq!(&data[10..], b"mundo");

    assert_eq!(names(&fs), ["hello.txt", "notes.txt"]);
}

#[test]
fn overwrite_does_not_shrink() {
    let mut fs = hello_fs();
    fs.write("/hello.txt", 0, b"Chao").unwrap();
    assert_eq!(fs.attributes("/hello.txt").unwrap().size, 13);
    assert_eq!(fs.read("/hello.txt", 0, 100).unwrap(), b"Chao MiniFS!\n");
}

#[test]
fn write_past_block_is_rejected_without_changes() {
    let mut fs = hello_fs();
    let free_before = fs.statfs().free_blocks;

    let err = fs.write("/hello.txt", BLOCK_SIZE as u64 - 1, b"xy").unwrap_err();
    assert!(matches!(err, FsError::OutOfRange(_)));
    assert_eq!(fs.read("/hello.txt", 0, 100).unwrap(), HELLO_CONTENT);
    assert_eq!(fs.attributes("/hello.txt").unwrap().size, 13);

    // sin bloque todavía: tampoco se asigna uno
    fs.create("/empty", InodeKind::RegularFile, 0o644).unwrap();
    assert!(fs.write("/empty", BLOCK_SIZE as u64, b"x").is_err());
    assert_eq!(fs.attributes("/empty").unwrap().blocks, 0);
    assert_eq!(fs.statfs().free_blocks, free_before);

    // exactamente hasta el final sí cabe
    fs.write("/empty", BLOCK_SIZE as u64 - 1, b"z").unwrap();
    assert_eq!(fs.attributes("/empty").unwrap().size, BLOCK_SIZE);
}

#[test]
fn empty_write_allocates_nothing() {
    let mut fs = empty_fs();
    fs.create("/a", InodeKind::RegularFile, 0o644).unwrap();
    let before = fs.statfs();
    assert_eq!(fs.write("/a", 0, b"").unwrap(), 0);
    assert_eq!(fs.statfs(), before);
    assert_eq!(fs.attributes("/a").unwrap().blocks, 0);
}

#[test]
fn directories_reject_file_io() {
    let mut fs = hello_fs();
    fs.mkdir("/docs", 0o755).unwrap();
    assert!(matches!(fs.read("/docs", 0, 1), Err(FsError::NotAFile)));
    assert!(matches!(fs.write("/docs", 0, b"x"), Err(FsError::NotAFile)));
    assert!(matches!(fs.read("/", 0, 1), Err(FsError::NotAFile)));
    assert!(fs.list_directory("/docs").unwrap().is_empty());
    assert!(matches!(
        fs.list_directory("/hello.txt"),
        Err(FsError::NotADirectory)
    ));
}

#[test]
fn create_rejects_duplicates_and_bad_names() {
    let mut fs = hello_fs();
    assert!(matches!(
        fs.create("/hello.txt", InodeKind::RegularFile, 0o644),
        Err(FsError::AlreadyExists)
    ));
    assert!(matches!(fs.mkdir("/hello.txt", 0o755), Err(FsError::AlreadyExists)));
    assert!(matches!(fs.mkdir("/", 0o755), Err(FsError::AlreadyExists)));
    assert!(matches!(
        fs.create(&format!("/{}", "n".repeat(28)), InodeKind::RegularFile, 0o644),
        Err(FsError::NameTooLong(28))
    ));
    assert!(matches!(
        fs.create("/a/b", InodeKind::RegularFile, 0o644),
        Err(FsError::Unsupported(_))
    ));

    // nada de lo anterior dejó rastros
    assert_eq!(names(&fs), ["hello.txt"]);
    assert_eq!(fs.statfs().free_inodes, 14);

    let longest = "n".repeat(27);
    fs.create(&longest, InodeKind::RegularFile, 0o644).unwrap();
    assert!(fs.attributes(&longest).is_ok());
}

#[test]
fn inode_exhaustion() {
    let mut fs = empty_fs();
    for i in 0..15 {
        fs.create(&format!("/f{i}"), InodeKind::RegularFile, 0o644)
            .unwrap();
    }
    assert_eq!(fs.statfs().free_inodes, 0);
    assert!(matches!(
        fs.create("/f15", InodeKind::RegularFile, 0o644),
        Err(FsError::NoSpace)
    ));
    assert!(matches!(fs.mkdir("/d", 0o755), Err(FsError::NoSpace)));
    assert_eq!(fs.list_directory("/").unwrap().len(), 15);
    assert_eq!(fs.attributes("/").unwrap().size, 15 * 32);
}

#[test]
fn unlink_frees_inode_and_block() {
    let mut fs = hello_fs();
    let before = fs.statfs();

    fs.unlink("/hello.txt").unwrap();
    assert!(matches!(fs.attributes("/hello.txt"), Err(FsError::NotFound)));
    assert!(names(&fs).is_empty());

    let after = fs.statfs();
    assert_eq!(after.free_inodes, before.free_inodes + 1);
    assert_eq!(after.free_blocks, before.free_blocks + 1);
    assert_eq!(fs.attributes("/").unwrap().size, 0);

    assert!(matches!(fs.unlink("/hello.txt"), Err(FsError::NotFound)));
}

#[test]
fn unlink_then_recreate_starts_empty() {
    let mut fs = hello_fs();
    fs.unlink("/hello.txt").unwrap();
    let ino = fs.create("/hello.txt", InodeKind::RegularFile, 0o644).unwrap();
    assert_eq!(ino, 1);
    assert_eq!(fs.attributes("/hello.txt").unwrap().size, 0);
    assert!(fs.read("/hello.txt", 0, 100).unwrap().is_empty());

    // el bloque reasignado llega en ceros
    fs.write("/hello.txt", 20, b"!").unwrap();
    let data = fs.read("/hello.txt", 0, 100).unwrap();
    assert_eq!(data.len(), 21);
    assert!(data[..20].iter().all(|&b| b == 0));
}

#[test]
fn listing_shrinks_by_one_and_stays_dense() {
    let mut fs = empty_fs();
    for name in ["a", "b", "c", "d"] {
        fs.create(name, InodeKind::RegularFile, 0o644).unwrap();
    }
    assert_eq!(names(&fs).len(), 4);

    fs.unlink("/b").unwrap();
    let mut left = names(&fs);
    assert_eq!(left.len(), 3);
    left.sort();
    assert_eq!(left, ["a", "c", "d"]);
    assert_eq!(fs.attributes("/").unwrap().size, 3 * 32);

    // la siguiente creación ocupa la ranura siguiente al prefijo
    fs.create("/e", InodeKind::RegularFile, 0o644).unwrap();
    assert_eq!(names(&fs).len(), 4);
    assert_eq!(names(&fs).last().map(String::as_str), Some("e"));
}

#[test]
fn unlink_rejects_directories() {
    let mut fs = hello_fs();
    fs.mkdir("/d", 0o755).unwrap();
    assert!(matches!(fs.unlink("/d"), Err(FsError::IsADirectory)));
    assert!(matches!(fs.unlink("/"), Err(FsError::IsADirectory)));
    assert!(fs.attributes("/d").is_ok());
}

#[test]
fn rmdir_rules() {
    let mut fs = hello_fs();
    let ino = fs.mkdir("/d", 0o700).unwrap();
    let attrs = fs.attributes("/d").unwrap();
    assert_eq!(attrs.kind, InodeKind::Directory);
    assert_eq!(attrs.perm, 0o700);
    assert_eq!(attrs.blocks, 0);

    assert!(matches!(fs.rmdir("/hello.txt"), Err(FsError::NotADirectory)));
    assert!(matches!(fs.rmdir("/missing"), Err(FsError::NotFound)));

    // un directorio con tamaño distinto de cero se considera no vacío
    let mut fs = patch_inode(fs, ino, |inode| inode.size = 32);
    assert!(matches!(fs.rmdir("/d"), Err(FsError::NotEmpty)));

    let mut fs = patch_inode(fs, ino, |inode| inode.size = 0);
    let free = fs.statfs().free_inodes;
    fs.rmdir("/d").unwrap();
    assert_eq!(fs.statfs().free_inodes, free + 1);
    assert_eq!(names(&fs), ["hello.txt"]);
}

#[test]
fn truncate_shrinks_and_grows() {
    let mut fs = hello_fs();
    fs.truncate("/hello.txt", 4).unwrap();
    assert_eq!(fs.read("/hello.txt", 0, 100).unwrap(), b"Hola");

    // al crecer se ven ceros, no el contenido viejo
    fs.truncate("/hello.txt", 8).unwrap();
    assert_eq!(fs.read("/hello.txt", 0, 100).unwrap(), b"Hola\0\0\0\0");

    fs.create("/new", InodeKind::RegularFile, 0o644).unwrap();
    let free = fs.statfs().free_blocks;
    fs.truncate("/new", 100).unwrap();
    assert_eq!(fs.attributes("/new").unwrap().blocks, 1);
    assert_eq!(fs.statfs().free_blocks, free - 1);

    assert!(matches!(
        fs.truncate("/new", BLOCK_SIZE as u64 + 1),
        Err(FsError::OutOfRange(_))
    ));
    assert!(matches!(fs.truncate("/", 0), Err(FsError::IsADirectory)));
}

#[test]
fn rename_within_root() {
    let mut fs = hello_fs();
    fs.rename("/hello.txt", "/saludo.txt").unwrap();
    assert!(matches!(fs.attributes("/hello.txt"), Err(FsError::NotFound)));
    assert_eq!(fs.read("/saludo.txt", 0, 100).unwrap(), HELLO_CONTENT);

    // reemplaza un archivo existente y libera su inodo
    fs.create("/otro", InodeKind::RegularFile, 0o644).unwrap();
    fs.write("/otro", 0, b"viejo").unwrap();
    let before = fs.statfs();
    fs.rename("/saludo.txt", "/otro").unwrap();
    assert_eq!(fs.read("/otro", 0, 100).unwrap(), HELLO_CONTENT);
    assert_eq!(names(&fs), ["otro"]);
    assert_eq!(fs.statfs().free_inodes, before.free_inodes + 1);
    assert_eq!(fs.statfs().free_blocks, before.free_blocks + 1);

    fs.mkdir("/d", 0o755).unwrap();
    assert!(matches!(fs.rename("/otro", "/d"), Err(FsError::IsADirectory)));
    assert!(matches!(fs.rename("/d", "/otro"), Err(FsError::NotADirectory)));
    assert!(matches!(fs.rename("/nope", "/x"), Err(FsError::NotFound)));

    fs.rename("/otro", "/otro").unwrap();
    assert_eq!(names(&fs).len(), 2);
}

#[test]
fn stale_counters_are_reconciled_on_open() {
    let fs = hello_fs();
    let mut bytes = fs.into_bytes();
    // free_blocks en 124, como lo dejaban algunas imágenes viejas
    bytes[16..20].copy_from_slice(&124u32.to_le_bytes());

    let fs = minifs::Minifs::from_bytes(bytes).unwrap();
    assert_eq!(fs.statfs().free_blocks, 122);
    assert_eq!(fs.statfs().free_inodes, 14);
}

#[test]
fn counters_track_every_mutation() {
    let mut fs = empty_fs();
    let start = fs.statfs();
    assert_eq!(start.free_blocks, 128 - 5);
    assert_eq!(start.free_inodes, 15);

    fs.create("/a", InodeKind::RegularFile, 0o644).unwrap();
    fs.write("/a", 0, b"1").unwrap();
    fs.mkdir("/b", 0o755).unwrap();
    let mid = fs.statfs();
    assert_eq!(mid.free_inodes, 13);
    assert_eq!(mid.free_blocks, start.free_blocks - 1);

    fs.unlink("/a").unwrap();
    fs.rmdir("/b").unwrap();
    assert_eq!(fs.statfs(), start);
}

#[test]
fn hello_scenario_from_scratch() {
    let mut fs = empty_fs();
    fs.create("/hello.txt", InodeKind::RegularFile, 0o644).unwrap();
    assert_eq!(fs.write("/hello.txt", 0, HELLO_CONTENT).unwrap(), 13);
    assert_eq!(fs.read("/hello.txt", 0, 13).unwrap(), HELLO_CONTENT);
    assert_eq!(fs.attributes("/hello.txt").unwrap().size, 13);
    fs.unlink("/hello.txt").unwrap();
    assert!(matches!(fs.attributes("/hello.txt"), Err(FsError::NotFound)));
}

#[test]
fn created_objects_start_empty_with_requested_kind() {
    let mut fs = empty_fs();
    for (name, kind) in [
        ("archivo", InodeKind::RegularFile),
        ("carpeta", InodeKind::Directory),
    ] {
        fs.create(name, kind, 0o755).unwrap();
        let attrs = fs.attributes(name).unwrap();
        assert_eq!(attrs.kind, kind);
        assert_eq!(attrs.size, 0);
    }

    let entries = fs.list_directory("/").unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, InodeKind::RegularFile);
    assert_eq!(entries[1].kind, InodeKind::Directory);
}

#[test]
fn write_read_round_trip_at_various_offsets() {
    let mut fs = empty_fs();
    fs.create("/f", InodeKind::RegularFile, 0o644).unwrap();

    let payload: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
    for offset in [0u64, 1, 511, 2048, BLOCK_SIZE as u64 - 1000] {
        fs.write("/f", offset, &payload).unwrap();
        assert_eq!(fs.read("/f", offset, payload.len()).unwrap(), payload);
    }

    let full = vec![0xAB; BLOCK_SIZE as usize];
    fs.write("/f", 0, &full).unwrap();
    assert_eq!(fs.read("/f", 0, BLOCK_SIZE as usize).unwrap(), full);
}

#[test]
fn full_root_directory_rejects_create_cleanly() {
    let opts = FormatOptions {
        total_inodes: 200,
        ..FormatOptions::default()
    };
    let mut fs = Minifs::from_bytes(format(&opts).unwrap()).unwrap();
    for i in 0..128 {
        fs.create(&format!("f{i}"), InodeKind::RegularFile, 0o644)
            .unwrap();
    }

    let stats = fs.statfs();
    let listing = fs.list_directory("/").unwrap();
    assert_eq!(listing.len(), 128);
    assert_eq!(stats.free_inodes, 200 - 1 - 128);

    assert!(matches!(
        fs.create("/extra", InodeKind::RegularFile, 0o644),
        Err(FsError::NoSpace)
    ));
    assert!(matches!(fs.mkdir("/extra", 0o755), Err(FsError::NoSpace)));

    // ni inodo ni entrada a medio crear
    assert_eq!(fs.statfs(), stats);
    assert_eq!(fs.list_directory("/").unwrap(), listing);
    assert!(matches!(fs.attributes("/extra"), Err(FsError::NotFound)));
}

#[test]
fn write_without_free_blocks_leaves_file_untouched() {
    let opts = FormatOptions {
        total_blocks: 6,
        ..FormatOptions::default()
    };
    let mut fs = Minifs::from_bytes(format(&opts).unwrap()).unwrap();
    fs.create("/a", InodeKind::RegularFile, 0o644).unwrap();
    fs.write("/a", 0, b"ocupa el ultimo bloque").unwrap();
    fs.create("/b", InodeKind::RegularFile, 0o644).unwrap();

    let stats = fs.statfs();
    assert_eq!(stats.free_blocks, 0);

    assert!(matches!(fs.write("/b", 0, b"x"), Err(FsError::NoSpace)));
    let attrs = fs.attributes("/b").unwrap();
    assert_eq!(attrs.size, 0);
    assert_eq!(attrs.blocks, 0);
    assert!(fs.read("/b", 0, 10).unwrap().is_empty());
    assert_eq!(fs.statfs(), stats);

    // truncate tampoco consigue bloque
    assert!(matches!(fs.truncate("/b", 10), Err(FsError::NoSpace)));
    assert_eq!(fs.attributes("/b").unwrap().size, 0);
}

#[test]
fn rename_directory_over_directory() {
    let mut fs = empty_fs();
    let src = fs.mkdir("/d1", 0o755).unwrap();
    fs.mkdir("/d2", 0o755).unwrap();

    let free = fs.statfs().free_inodes;
    fs.rename("/d1", "/d2").unwrap();
    assert_eq!(names(&fs), ["d2"]);
    assert_eq!(fs.attributes("/d2").unwrap().ino, src);
    assert_eq!(fs.statfs().free_inodes, free + 1);

    // un destino con tamaño distinto de cero no se reemplaza
    let full = fs.mkdir("/d3", 0o755).unwrap();
    let mut fs = patch_inode(fs, full, |inode| inode.size = 32);
    assert!(matches!(fs.rename("/d2", "/d3"), Err(FsError::NotEmpty)));
    assert_eq!(names(&fs), ["d2", "d3"]);
    assert_eq!(fs.attributes("/d3").unwrap().ino, full);
}

#[test]
fn rename_last_entry_over_first() {
    let mut fs = hello_fs();
    let ino = fs.create("/x", InodeKind::RegularFile, 0o644).unwrap();
    fs.write("/x", 0, b"XX").unwrap();

    // "x" está en la última ranura y "hello.txt" en la 0
    fs.rename("/x", "/hello.txt").unwrap();
    let entries = fs.list_directory("/").unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "hello.txt");
    assert_eq!(entries[0].ino, ino);
    assert_eq!(fs.read("/hello.txt", 0, 100).unwrap(), b"XX");
    assert!(matches!(fs.attributes("/x"), Err(FsError::NotFound)));
}
