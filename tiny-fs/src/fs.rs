//! # 磁盘管理器层
//!
//! 构建出磁盘的布局并使用：格式化、挂载，以及块与 inode 的分配回收。

use std::path::Path;

use crate::layout::*;
use crate::{Disk, Error, Result};
use crate::{DEFAULT_BLOCK_SIZE, INODE_SIZE, ROOT_INODE};

/// 格式化参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatOptions {
    /// 磁盘容量(字节)
    pub disk_size: u64,
    pub block_size: u32,
    /// inode 表容量，缺省为总块数的四分之一(至少 16)
    pub inode_count: Option<u32>,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            disk_size: 10 * 1024 * 1024,
            block_size: DEFAULT_BLOCK_SIZE,
            inode_count: None,
        }
    }
}

impl FormatOptions {
    #[inline]
    pub fn new(disk_size: u64, block_size: u32) -> Self {
        Self {
            disk_size,
            block_size,
            inode_count: None,
        }
    }

    #[inline]
    pub fn with_inode_count(mut self, inode_count: u32) -> Self {
        self.inode_count = Some(inode_count);
        self
    }

    fn resolve_inode_count(&self, total_blocks: u32) -> u32 {
        self.inode_count.unwrap_or((total_blocks / 4).max(16))
    }
}

/// inode 编号分配器：单调递增，不回收。
///
/// 只在格式化时归零；挂载已有镜像时从最大的存活编号之后继续。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeAllocator {
    next: u32,
    capacity: u32,
}

impl InodeAllocator {
    #[inline]
    pub fn new(capacity: u32) -> Self {
        Self { next: 0, capacity }
    }

    #[inline]
    pub fn resume(next: u32, capacity: u32) -> Self {
        Self { next, capacity }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// 返回当前编号并前进
    pub fn alloc(&mut self) -> Result<u32> {
        if self.next >= self.capacity {
            return Err(Error::NoInodes);
        }
        let id = self.next;
        self.next += 1;
        Ok(id)
    }

    /// 下一个将被分配的编号
    #[inline]
    pub fn peek(&self) -> u32 {
        self.next
    }
}

/// 由位图统计出的使用情况
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskUsage {
    pub block_size: u32,
    pub total_blocks: u32,
    pub used_blocks: u32,
    pub free_blocks: u32,
    pub inode_count: u32,
    pub live_inodes: u32,
}

impl DiskUsage {
    /// 已用块占比(百分数)
    pub fn usage_percent(&self) -> f64 {
        self.used_blocks as f64 / self.total_blocks as f64 * 100.0
    }
}

#[derive(Debug)]
pub struct FileSystem {
    pub(crate) disk: Disk,
    super_block: SuperBlock,
    geometry: Geometry,
    block_bitmap: Bitmap,
    inode_bitmap: Bitmap,
    inodes: InodeAllocator,
}

impl FileSystem {
    /// 创建虚拟磁盘，写入超级块与位图，并建立根目录(0 号 inode)
    pub fn format(path: impl AsRef<Path>, options: &FormatOptions) -> Result<Self> {
        let disk = Disk::create(path, options.disk_size, options.block_size)?;
        let geometry = Geometry::new(
            disk.size(),
            disk.block_size(),
            options.resolve_inode_count(disk.total_blocks()),
        )?;
        let super_block = SuperBlock::init(&disk, &geometry)?;

        let mut fs = Self {
            disk,
            super_block,
            block_bitmap: geometry.block_bitmap(),
            inode_bitmap: geometry.inode_bitmap(),
            inodes: InodeAllocator::new(geometry.inode_count),
            geometry,
        };
        fs.inodes.reset();
        fs.create_root()?;

        log::info!(
            "formatted: {} blocks of {} bytes, {} inodes, data from block {}",
            geometry.total_blocks,
            geometry.block_size,
            geometry.inode_count,
            geometry.data_start_block()
        );
        Ok(fs)
    }

    /// 挂载已格式化的镜像
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let disk = Disk::open(path)?;
        let super_block = SuperBlock::load(&disk)?;
        let geometry = super_block.geometry()?;
        let block_bitmap = geometry.block_bitmap();
        let inode_bitmap = geometry.inode_bitmap();

        if !block_bitmap.get(&disk, 0)? || !inode_bitmap.get(&disk, ROOT_INODE)? {
            return Err(Error::CorruptImage("root directory is missing"));
        }
        let next = inode_bitmap
            .last_used(&disk)?
            .map_or(0, |last| last + 1);

        let fs = Self {
            disk,
            super_block,
            block_bitmap,
            inode_bitmap,
            inodes: InodeAllocator::resume(next, geometry.inode_count),
            geometry,
        };
        if !fs.load_inode(ROOT_INODE)?.is_dir() {
            return Err(Error::CorruptImage("root is not a directory"));
        }

        log::info!("opened: {:?}, next inode {next}", fs.super_block);
        Ok(fs)
    }

    /// 关闭虚拟磁盘
    pub fn close(self) -> Result<()> {
        self.disk.close()
    }

    #[inline]
    pub fn disk(&self) -> &Disk {
        &self.disk
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.geometry.block_size
    }

    #[inline]
    pub fn block_bitmap(&self) -> Bitmap {
        self.block_bitmap
    }

    #[inline]
    pub fn inode_allocator(&self) -> &InodeAllocator {
        &self.inodes
    }

    /// 在磁盘上分配新的数据块并返回其块号
    pub fn alloc_block(&mut self) -> Result<u32> {
        let block = self.block_bitmap.alloc(&self.disk)?;
        log::debug!("block {block} allocated");
        Ok(block)
    }

    /// 元数据所在的块永远不会被释放
    pub fn free_block(&mut self, block: u32) -> Result<()> {
        if block < self.geometry.data_start_block() {
            return Err(Error::OutOfRange {
                offset: block as u64 * self.block_size() as u64,
                len: self.block_size() as usize,
            });
        }
        self.block_bitmap.set(&self.disk, block, false)?;
        log::debug!("block {block} released");
        Ok(())
    }

    #[inline]
    pub fn is_block_used(&self, block: u32) -> Result<bool> {
        self.block_bitmap.get(&self.disk, block)
    }

    /// 取得新的 inode 编号；编号在写入 inode 之后才算存活
    #[inline]
    pub fn alloc_inode(&mut self) -> Result<u32> {
        self.inodes.alloc()
    }

    /// 读出 inode 记录。
    ///
    /// 编号必须已分配：未分配的编号读出的是该位置上残留的字节。
    pub fn load_inode(&self, inode: u32) -> Result<Inode> {
        let (block, offset) = self.inode_pos(inode)?;
        self.disk.read_record(block, offset)
    }

    /// 写入 inode 记录并标记其存活
    pub fn save_inode(&mut self, inode: u32, record: &Inode) -> Result<()> {
        let (block, offset) = self.inode_pos(inode)?;
        self.disk.write_record(block, offset, record)?;
        self.inode_bitmap.set(&self.disk, inode, true)
    }

    /// 在 inode 位图中清除存活标记，编号不会被再次分配
    pub fn free_inode(&mut self, inode: u32) -> Result<()> {
        self.inode_bitmap.set(&self.disk, inode, false)?;
        log::debug!("inode {inode} freed");
        Ok(())
    }

    #[inline]
    pub fn is_live(&self, inode: u32) -> Result<bool> {
        self.inode_bitmap.get(&self.disk, inode)
    }

    pub fn usage(&self) -> Result<DiskUsage> {
        let used_blocks = self.block_bitmap.count_used(&self.disk)?;
        Ok(DiskUsage {
            block_size: self.geometry.block_size,
            total_blocks: self.geometry.total_blocks,
            used_blocks,
            free_blocks: self.geometry.total_blocks - used_blocks,
            inode_count: self.geometry.inode_count,
            live_inodes: self.inode_bitmap.count_used(&self.disk)?,
        })
    }
}

impl FileSystem {
    /// 通过编号获取 inode 在磁盘上的位置：**块号**以及**块内偏移**
    fn inode_pos(&self, inode: u32) -> Result<(u32, usize)> {
        if inode >= self.geometry.inode_count {
            return Err(Error::OutOfRange {
                offset: self.geometry.inode_start() as u64 + inode as u64 * INODE_SIZE as u64,
                len: INODE_SIZE,
            });
        }

        let pos = self.geometry.inode_start() as usize + inode as usize * INODE_SIZE;
        let block_size = self.geometry.block_size as usize;
        Ok(((pos / block_size) as u32, pos % block_size))
    }
}
