use std::io;

use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("disk size {0} is outside [1 MiB, 100 MiB]")]
    InvalidSize(u64),
    #[error("block size {0} is not a non-zero multiple of 512")]
    InvalidBlockSize(u32),
    #[error("corrupt or foreign image: {0}")]
    CorruptImage(&'static str),
    #[error("no free block left")]
    NoSpace,
    #[error("inode table is full")]
    NoInodes,
    #[error("directory {0} reached its direct block limit")]
    DirectoryFull(u32),
    #[error("inode {0} is not a directory")]
    NotADirectory(u32),
    #[error("inode {0} is not a regular file")]
    NotAFile(u32),
    #[error("directory {dir} has no entry for inode {inode}")]
    EntryNotFound { dir: u32, inode: u32 },
    #[error("inode {0} is not reachable from root")]
    NotFound(u32),
    #[error("source data exceeds the direct block limit")]
    FileTooLarge,
    /// 访问超出磁盘或 inode 表的物理边界
    #[error("access at byte {offset} (+{len}) is out of range")]
    OutOfRange { offset: u64, len: usize },
    #[error("invalid entry name {0:?}")]
    InvalidName(String),
    #[error("an entry named {0:?} already exists")]
    AlreadyExists(String),
    #[error("directory {0} is not empty")]
    DirectoryNotEmpty(u32),
    #[error("the root directory cannot be removed")]
    RootDirectory,
    #[error("cannot move directory {0} into its own subtree")]
    InvalidMove(u32),
    #[error("I/O failure on the backing store: {0}")]
    Io(#[from] io::Error),
    #[error("malformed on-disk record: {0}")]
    Codec(#[from] binrw::Error),
}
