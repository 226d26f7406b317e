#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;
use tiny_fs::{FileSystem, FormatOptions};

pub const MIB: u64 = 1024 * 1024;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 临时目录下的一块新盘；`TempDir` 要活得比文件系统久
pub fn scratch(disk_size: u64, block_size: u32) -> (TempDir, PathBuf, FileSystem) {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("disk.img");
    let fs = FileSystem::format(&path, &FormatOptions::new(disk_size, block_size)).unwrap();
    (dir, path, fs)
}

/// 1 MiB、512 字节块的最小盘
pub fn small() -> (TempDir, PathBuf, FileSystem) {
    scratch(MIB, 512)
}

pub fn names(fs: &FileSystem, dir: u32) -> Vec<String> {
    fs.list(dir)
        .unwrap()
        .map(|entry| entry.unwrap().name().into_owned())
        .collect()
}
