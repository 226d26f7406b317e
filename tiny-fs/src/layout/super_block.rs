use binrw::binrw;

use crate::layout::Bitmap;
use crate::{Disk, Error, Result};
use crate::{INODE_SIZE, MAGIC};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域
///
/// 字段顺序即磁盘上的顺序，每个字段 4 字节。
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    /// 魔数：用于校验文件系统合法性
    magic: u32,
    pub disk_size: u32,
    pub block_size: u32,
    /// inode 表的容量
    pub inode_count: u32,
    /// 以下三个计数只在格式化时写入，仅供参考，权威状态在位图里
    pub free_blocks: u32,
    pub free_inodes: u32,
    /// inode 表起始处的字节偏移
    pub inode_start: u32,
    pub bitmap_start_block: u32,
    pub free_blocks_bitmap_start: u32,
    pub free_blocks_count: u32,
}

/// 由磁盘容量、块大小与 inode 数推出的各区域位置，单位均为块
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub disk_size: u32,
    pub block_size: u32,
    pub total_blocks: u32,
    pub inode_count: u32,
    pub bitmap_start_block: u32,
    pub bitmap_blocks: u32,
    pub inode_bitmap_start_block: u32,
    pub inode_bitmap_blocks: u32,
    pub inode_table_start_block: u32,
    pub inode_table_blocks: u32,
}

impl Geometry {
    /// 位图总是从 1 号块开始
    pub const BITMAP_START_BLOCK: u32 = 1;

    pub fn new(disk_size: u32, block_size: u32, inode_count: u32) -> Result<Self> {
        let block_bits = block_size
            .checked_mul(8)
            .filter(|&bits| bits != 0 && block_size <= disk_size)
            .ok_or(Error::InvalidBlockSize(block_size))?;
        let total_blocks = disk_size / block_size;

        let bitmap_blocks = total_blocks.div_ceil(block_bits);
        let inode_bitmap_start_block = Self::BITMAP_START_BLOCK + bitmap_blocks;
        let inode_bitmap_blocks = inode_count.div_ceil(block_bits).max(1);
        let inode_table_start_block = inode_bitmap_start_block + inode_bitmap_blocks;
        let inode_table_blocks = (inode_count as u64 * INODE_SIZE as u64)
            .div_ceil(block_size as u64) as u32;

        let geometry = Self {
            disk_size,
            block_size,
            total_blocks,
            inode_count,
            bitmap_start_block: Self::BITMAP_START_BLOCK,
            bitmap_blocks,
            inode_bitmap_start_block,
            inode_bitmap_blocks,
            inode_table_start_block,
            inode_table_blocks,
        };

        // 元数据之后至少还要放得下根目录的一个数据块
        if inode_count == 0 || geometry.data_start_block() >= total_blocks {
            return Err(Error::NoSpace);
        }

        Ok(geometry)
    }

    /// 第一个数据块，其之前全是元数据
    #[inline]
    pub fn data_start_block(&self) -> u32 {
        self.inode_table_start_block + self.inode_table_blocks
    }

    #[inline]
    pub fn inode_start(&self) -> u32 {
        self.inode_table_start_block * self.block_size
    }

    #[inline]
    pub fn block_bitmap(&self) -> Bitmap {
        Bitmap::new(self.bitmap_start_block, self.bitmap_blocks, self.total_blocks)
    }

    #[inline]
    pub fn inode_bitmap(&self) -> Bitmap {
        Bitmap::new(
            self.inode_bitmap_start_block,
            self.inode_bitmap_blocks,
            self.inode_count,
        )
    }
}

impl SuperBlock {
    /// 写入超级块，并初始化两张位图
    pub fn init(disk: &Disk, geometry: &Geometry) -> Result<Self> {
        geometry
            .block_bitmap()
            .init(disk, geometry.data_start_block())?;
        geometry.inode_bitmap().init(disk, 0)?;

        let free_blocks = geometry.total_blocks - geometry.data_start_block();
        let super_block = Self {
            magic: MAGIC,
            disk_size: geometry.disk_size,
            block_size: geometry.block_size,
            inode_count: geometry.inode_count,
            free_blocks,
            free_inodes: geometry.inode_count,
            inode_start: geometry.inode_start(),
            bitmap_start_block: geometry.bitmap_start_block,
            free_blocks_bitmap_start: geometry.bitmap_start_block,
            free_blocks_count: free_blocks,
        };
        disk.write_record(0, 0, &super_block)?;

        log::debug!("super block written: {super_block:?}");
        Ok(super_block)
    }

    pub fn load(disk: &Disk) -> Result<Self> {
        let super_block: Self = disk.read_record(0, 0)?;
        if !super_block.is_valid() {
            return Err(Error::CorruptImage("bad magic"));
        }
        if super_block.disk_size != disk.size() || super_block.block_size != disk.block_size() {
            return Err(Error::CorruptImage("geometry does not match the disk"));
        }
        super_block.geometry()?;

        Ok(super_block)
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    /// 复原布局，并与记录中的冗余字段互相印证
    pub fn geometry(&self) -> Result<Geometry> {
        let geometry = Geometry::new(self.disk_size, self.block_size, self.inode_count)
            .map_err(|_| Error::CorruptImage("layout does not fit the disk"))?;

        if geometry.inode_start() != self.inode_start
            || geometry.bitmap_start_block != self.bitmap_start_block
        {
            return Err(Error::CorruptImage("inconsistent layout fields"));
        }

        Ok(geometry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_of_smallest_disk() {
        let geometry = Geometry::new(1024 * 1024, 512, 512).unwrap();
        assert_eq!(geometry.total_blocks, 2048);
        assert_eq!(geometry.bitmap_blocks, 1);
        assert_eq!(geometry.inode_bitmap_start_block, 2);
        assert_eq!(geometry.inode_table_start_block, 3);
        assert_eq!(geometry.inode_table_blocks, 128);
        assert_eq!(geometry.data_start_block(), 131);
        assert_eq!(geometry.inode_start(), 3 * 512);
    }

    #[test]
    fn bitmap_spans_blocks_on_large_disks() {
        let geometry = Geometry::new(100 * 1024 * 1024, 512, 1024).unwrap();
        assert_eq!(geometry.total_blocks, 204_800);
        assert_eq!(geometry.bitmap_blocks, 50);
        assert_eq!(geometry.inode_bitmap_start_block, 51);
    }

    #[test]
    fn layout_must_leave_room_for_data() {
        assert!(matches!(
            Geometry::new(1024 * 1024, 1024 * 1024, 16),
            Err(Error::NoSpace)
        ));
        assert!(matches!(
            Geometry::new(1024 * 1024, 512, 0),
            Err(Error::NoSpace)
        ));
    }

    #[test]
    fn oversized_block_size_is_rejected() {
        for block_size in [2 * 1024 * 1024, 1 << 29, 1 << 31] {
            assert!(matches!(
                Geometry::new(1024 * 1024, block_size, 16),
                Err(Error::InvalidBlockSize(b)) if b == block_size
            ));
        }
    }
}
