mod common;

use std::io::Read;

use common::*;
use tiny_fs::{Error, FileKind, ROOT_INODE};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

#[test]
fn contents_round_trip() {
    let (_dir, _path, mut fs) = small();

    for (name, len) in [("empty", 0), ("tiny", 5), ("exact", 512), ("spill", 1300), ("max", 5120)] {
        let data = pattern(len);
        let file = fs.file_create(ROOT_INODE, data.as_slice(), name).unwrap();
        assert_eq!(fs.read_to_vec(file).unwrap(), data, "{name}");

        let info = fs.stat(file).unwrap();
        assert_eq!(info.size as usize, len);
        assert_eq!(info.blocks.len(), len.div_ceil(512));
        assert!(info.kind.contains(FileKind::Regular));
    }
}

#[test]
fn reader_streams_in_small_pieces() {
    let (_dir, _path, mut fs) = small();
    let data = pattern(1500);
    let file = fs.file_create(ROOT_INODE, data.as_slice(), "f").unwrap();

    let mut reader = fs.file_read(file).unwrap();
    assert_eq!(reader.len(), 1500);
    let mut out = Vec::new();
    let mut piece = [0; 100];
    loop {
        let n = reader.read(&mut piece).unwrap();
        if n == 0 {
            break;
        }
        assert!(n <= 100);
        out.extend_from_slice(&piece[..n]);
    }
    assert_eq!(out, data);
}

#[test]
fn oversized_source_allocates_nothing() {
    let (_dir, _path, mut fs) = small();
    let before = fs.usage().unwrap();

    let data = pattern(10 * 512 + 1);
    assert!(matches!(
        fs.file_create(ROOT_INODE, data.as_slice(), "big"),
        Err(Error::FileTooLarge)
    ));
    assert_eq!(fs.usage().unwrap(), before);
    assert_eq!(fs.find(ROOT_INODE, "big").unwrap(), None);
    assert_eq!(names(&fs, ROOT_INODE), [".", ".."]);
}

#[test]
fn running_out_of_blocks_mid_stream() {
    let (_dir, _path, mut fs) = small();
    let mut taken = Vec::new();
    while let Ok(block) = fs.alloc_block() {
        taken.push(block);
    }
    for block in taken.drain(..3) {
        fs.free_block(block).unwrap();
    }

    let before = fs.usage().unwrap();
    assert_eq!(before.free_blocks, 3);
    assert!(matches!(
        fs.file_create(ROOT_INODE, pattern(5 * 512).as_slice(), "f"),
        Err(Error::NoSpace)
    ));
    assert_eq!(fs.usage().unwrap(), before);
    assert_eq!(fs.find(ROOT_INODE, "f").unwrap(), None);

    // 归还的块可以再次使用
    let file = fs.file_create(ROOT_INODE, pattern(3 * 512).as_slice(), "g").unwrap();
    assert_eq!(fs.read_to_vec(file).unwrap(), pattern(3 * 512));
}

#[test]
fn names_are_checked_before_lookup() {
    let (_dir, _path, mut fs) = small();
    let before = fs.usage().unwrap();

    for bad in [".", "..", "", "a/b"] {
        assert!(matches!(
            fs.file_create(ROOT_INODE, &b"x"[..], bad),
            Err(Error::InvalidName(_))
        ));
    }
    assert_eq!(fs.usage().unwrap(), before);
    assert_eq!(fs.inode_allocator().peek(), 1);
}

#[test]
fn wrong_kinds_are_rejected() {
    let (_dir, _path, mut fs) = small();
    let home = fs.dir_create(ROOT_INODE, "home").unwrap();
    let file = fs.file_create(ROOT_INODE, &b"x"[..], "f").unwrap();

    assert!(matches!(fs.file_read(home), Err(Error::NotAFile(h)) if h == home));
    assert!(matches!(
        fs.file_delete(ROOT_INODE, home),
        Err(Error::NotAFile(_))
    ));
    assert!(matches!(
        fs.file_create(file, &b"y"[..], "g"),
        Err(Error::NotADirectory(f)) if f == file
    ));
    assert!(matches!(
        fs.file_create(ROOT_INODE, &b"y"[..], "f"),
        Err(Error::AlreadyExists(_))
    ));
}

#[test]
fn delete_releases_everything() {
    let (_dir, _path, mut fs) = small();
    let before = fs.usage().unwrap();
    let file = fs.file_create(ROOT_INODE, pattern(2000).as_slice(), "f").unwrap();
    assert_eq!(fs.usage().unwrap().used_blocks, before.used_blocks + 4);

    let home = fs.dir_create(ROOT_INODE, "home").unwrap();
    let usage = fs.usage().unwrap();
    assert!(matches!(
        fs.file_delete(home, file),
        Err(Error::EntryNotFound { .. })
    ));
    assert_eq!(fs.usage().unwrap(), usage);

    fs.file_delete(ROOT_INODE, file).unwrap();
    assert!(!fs.is_live(file).unwrap());
    assert_eq!(fs.usage().unwrap().used_blocks, before.used_blocks + 1);
}

#[test]
fn copies_are_independent() {
    let (_dir, _path, mut fs) = small();
    let home = fs.dir_create(ROOT_INODE, "home").unwrap();
    let original = fs.file_create(ROOT_INODE, pattern(700).as_slice(), "a").unwrap();
    let copy = fs.file_copy(original, home, "b").unwrap();

    assert_ne!(copy, original);
    assert_eq!(fs.read_to_vec(copy).unwrap(), pattern(700));
    let (a, b) = (fs.stat(original).unwrap(), fs.stat(copy).unwrap());
    assert!(a.blocks.iter().all(|block| !b.blocks.contains(block)));

    fs.file_delete(ROOT_INODE, original).unwrap();
    assert_eq!(fs.read_to_vec(copy).unwrap(), pattern(700));
}

#[test]
fn stat_reports_fragmentation() {
    let (_dir, _path, mut fs) = small();
    let file = fs.file_create(ROOT_INODE, pattern(600).as_slice(), "f").unwrap();

    let info = fs.stat(file).unwrap();
    assert_eq!(info.mode, tiny_fs::FILE_MODE);
    assert_eq!(info.allocated_bytes, 1024);
    assert_eq!(info.internal_fragmentation, 424);
    assert!(info.created_at > 0 && info.modified_at >= info.created_at);

    let root = fs.stat(ROOT_INODE).unwrap();
    assert!(root.kind.contains(FileKind::Directory));
    assert_eq!(root.size, 2 * 32 + 32);
}

#[test]
fn home_scenario() {
    let (dir, path, mut fs) = small();
    let before = fs.usage().unwrap();

    let host = dir.path().join("a.txt");
    std::fs::write(&host, b"0123456789").unwrap();

    let home = fs.dir_create(ROOT_INODE, "home").unwrap();
    let file = fs.file_import(home, &host, "a.txt").unwrap();
    assert_eq!(names(&fs, home), [".", "..", "a.txt"]);
    assert_eq!(fs.find_parent(file).unwrap(), home);
    fs.close().unwrap();

    let mut fs = tiny_fs::FileSystem::open(&path).unwrap();
    assert_eq!(fs.read_to_vec(file).unwrap(), b"0123456789");
    let blocks = fs.stat(file).unwrap().blocks;
    assert_eq!(blocks.len(), 1);

    fs.file_delete(home, file).unwrap();
    for &block in &blocks {
        assert!(!fs.is_block_used(block).unwrap(), "block {block}");
    }
    assert!(!fs.is_live(file).unwrap());
    assert_eq!(names(&fs, home), [".", ".."]);

    fs.dir_delete(ROOT_INODE, home).unwrap();
    let after = fs.usage().unwrap();
    assert_eq!(after.used_blocks, before.used_blocks);
    assert_eq!(after.live_inodes, before.live_inodes);
}
