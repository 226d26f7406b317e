//! 只有直接索引：
//!
//! 12 个直接索引槽中仅前 [`MAX_BLOCKS_PER_INODE`] 个会被使用，
//! 间接索引字段只占位，恒为 0。
//!
//! 目录的空间用于存放子项的元信息；
//! 文件的空间用于存放它的数据。

use std::time::{SystemTime, UNIX_EPOCH};

use binrw::binrw;
use enumflags2::{bitflags, BitFlags};

use crate::{DIRECT_BLOCKS, MAX_BLOCKS_PER_INODE};

#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Inode {
    /// 类型与权限位
    pub mode: u32,
    pub uid: u32,
    /// 字节数；目录则为 `槽位数 × 32`
    pub size: u32,
    /// 秒级 Unix 时间戳
    #[brw(pad_before = 4)]
    pub created_at: i64,
    pub modified_at: i64,
    /// 直接索引块，0 表示未分配
    pub blocks: [u32; DIRECT_BLOCKS],
    /// 保留的一级索引块
    #[brw(pad_after = 44)]
    pub indirect_block: u32,
}

/// mode 中的类型位
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Directory = 0o040000,
    Regular = 0o100000,
}

impl Inode {
    /// 空的 inode，创建与修改时间都是现在
    pub fn new(mode: u32) -> Self {
        let now = now();
        Self {
            mode,
            created_at: now,
            modified_at: now,
            ..Default::default()
        }
    }

    #[inline]
    pub fn kind(&self) -> BitFlags<FileKind> {
        BitFlags::from_bits_truncate(self.mode)
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind().contains(FileKind::Directory)
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind().contains(FileKind::Regular)
    }

    /// 权限位
    #[inline]
    pub fn permissions(&self) -> u32 {
        self.mode & 0o777
    }

    #[inline]
    pub fn touch(&mut self) {
        self.modified_at = now();
    }

    /// 已分配的直接索引块
    pub fn data_blocks(&self) -> impl Iterator<Item = u32> + '_ {
        self.blocks[..MAX_BLOCKS_PER_INODE]
            .iter()
            .copied()
            .filter(|&block| block != 0)
    }

    /// 计算容纳指定数据量需要多少个数据块
    #[inline]
    pub fn count_data_block(size: u32, block_size: u32) -> usize {
        size.div_ceil(block_size) as usize
    }
}

pub(crate) fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::OnDisk;
    use crate::{DIR_MODE, FILE_MODE};

    #[test]
    fn kind_bits() {
        let dir = Inode::new(DIR_MODE);
        assert!(dir.is_dir() && !dir.is_file());
        assert_eq!(dir.permissions(), 0o755);

        let file = Inode::new(FILE_MODE);
        assert!(file.is_file() && !file.is_dir());
        assert_eq!(file.permissions(), 0o644);
    }

    #[test]
    fn record_layout() {
        let mut inode = Inode::new(FILE_MODE);
        inode.uid = 7;
        inode.size = 600;
        inode.blocks[0] = 131;
        inode.blocks[1] = 132;

        let bytes = inode.encode().unwrap();
        assert_eq!(&bytes[0..4], &FILE_MODE.to_le_bytes());
        assert_eq!(&bytes[4..8], &7u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &600u32.to_le_bytes());
        assert_eq!(&bytes[16..24], &inode.created_at.to_le_bytes());
        assert_eq!(&bytes[32..36], &131u32.to_le_bytes());
        assert!(bytes[80..].iter().all(|&b| b == 0));

        assert_eq!(Inode::decode(&bytes).unwrap(), inode);
        assert_eq!(inode.data_blocks().collect::<Vec<_>>(), vec![131, 132]);
    }
}
