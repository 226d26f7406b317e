//! # 磁盘数据结构层
//!
//! tiny-fs 的磁盘布局：
//! 超级块 | 块位图 | inode 位图 | inode 表 | 数据块区域
//!
//! 所有记录均以小端序编码。

use crate::Result;

mod super_block;
pub use super_block::{Geometry, SuperBlock};

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{FileKind, Inode};

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::DirEntry;

/// 定长的磁盘记录
pub trait OnDisk: Sized {
    /// 记录在磁盘上的字节数
    const SIZE: usize;

    fn decode(bytes: &[u8]) -> Result<Self>;

    fn encode(&self) -> Result<Vec<u8>>;
}

macro_rules! on_disk {
    ($ty:ty, $size:expr) => {
        impl $crate::layout::OnDisk for $ty {
            const SIZE: usize = $size;

            fn decode(bytes: &[u8]) -> $crate::Result<Self> {
                Ok(<Self as binrw::BinRead>::read(&mut std::io::Cursor::new(bytes))?)
            }

            fn encode(&self) -> $crate::Result<Vec<u8>> {
                let mut cursor = std::io::Cursor::new(Vec::with_capacity(Self::SIZE));
                binrw::BinWrite::write(self, &mut cursor)?;
                let bytes = cursor.into_inner();
                debug_assert_eq!(bytes.len(), Self::SIZE);
                Ok(bytes)
            }
        }
    };
}

on_disk!(SuperBlock, 40);
on_disk!(Inode, crate::INODE_SIZE);
on_disk!(DirEntry, DirEntry::SIZE);
