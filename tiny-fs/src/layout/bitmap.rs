use crate::{Disk, Error, Result};

/// 位图区域，记录其指示区域的分配情况。
///
/// 第 `n` 位位于区域内第 `n / 8` 字节，掩码为 `1 << (n % 8)`；置 1 表示已分配。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bitmap {
    /// 位图的起始块
    start_block: u32,
    /// 位图占用块数
    blocks: u32,
    /// 有效位数，其后的位永远不会被分配
    capacity: u32,
}

impl Bitmap {
    #[inline]
    pub fn new(start_block: u32, blocks: u32, capacity: u32) -> Self {
        Self {
            start_block,
            blocks,
            capacity,
        }
    }

    /// 位图所指示区域的总位数
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// 清零整个位图区域，再把前 `reserved` 位标记为已分配
    pub fn init(&self, disk: &Disk, reserved: u32) -> Result<()> {
        let block_size = disk.block_size() as usize;
        let mut area = vec![0u8; self.blocks as usize * block_size];
        for bit in 0..reserved.min(self.capacity) as usize {
            area[bit / 8] |= 1 << (bit % 8);
        }

        for (block_index, chunk) in area.chunks(block_size).enumerate() {
            disk.write_block(self.start_block + block_index as u32, 0, chunk)?;
        }

        log::debug!(
            "bitmap initialized: start={} blocks={} reserved={reserved}",
            self.start_block,
            self.blocks
        );
        Ok(())
    }

    /// 读-改-写该位所在的字节
    pub fn set(&self, disk: &Disk, bit: u32, used: bool) -> Result<()> {
        let (block, offset, mask) = self.locate(disk, bit)?;
        let mut byte = [0];
        disk.read_block(block, offset, &mut byte)?;

        if used {
            byte[0] |= mask;
        } else {
            byte[0] &= !mask;
        }

        disk.write_block(block, offset, &byte)
    }

    pub fn get(&self, disk: &Disk, bit: u32) -> Result<bool> {
        let (block, offset, mask) = self.locate(disk, bit)?;
        let mut byte = [0];
        disk.read_block(block, offset, &mut byte)?;
        Ok(byte[0] & mask != 0)
    }

    /// 自 0 号位起线性查找第一个空闲位。
    /// 若位图的空间用尽，则返回 [`Error::NoSpace`]。
    pub fn find_free(&self, disk: &Disk) -> Result<u32> {
        let block_size = disk.block_size() as usize;
        let mut data = vec![0; block_size];

        for block_index in 0..self.blocks {
            disk.read_block(self.start_block + block_index, 0, &mut data)?;

            let Some(bit) = data.iter().enumerate().find_map(|(byte_index, &bits)| {
                (bits != u8::MAX).then(|| {
                    block_index as usize * block_size * 8
                        + byte_index * 8
                        + bits.trailing_ones() as usize
                })
            }) else {
                continue;
            };

            // 末尾多出来的位不属于指示区域
            return if bit < self.capacity as usize {
                Ok(bit as u32)
            } else {
                Err(Error::NoSpace)
            };
        }

        Err(Error::NoSpace)
    }

    /// 找到空闲位并立即标记为已分配
    pub fn alloc(&self, disk: &Disk) -> Result<u32> {
        let bit = self.find_free(disk)?;
        self.set(disk, bit, true)?;
        Ok(bit)
    }

    /// 已分配的位数
    pub fn count_used(&self, disk: &Disk) -> Result<u32> {
        let block_size = disk.block_size() as usize;
        let mut data = vec![0; block_size];
        let mut used = 0;

        for block_index in 0..self.blocks {
            disk.read_block(self.start_block + block_index, 0, &mut data)?;
            used += data.iter().map(|bits| bits.count_ones()).sum::<u32>();
        }

        Ok(used.min(self.capacity))
    }

    /// 编号最大的已分配位
    pub fn last_used(&self, disk: &Disk) -> Result<Option<u32>> {
        let block_size = disk.block_size() as usize;
        let mut data = vec![0; block_size];

        for block_index in (0..self.blocks).rev() {
            disk.read_block(self.start_block + block_index, 0, &mut data)?;

            if let Some((byte_index, &bits)) =
                data.iter().enumerate().rev().find(|(_, bits)| **bits != 0)
            {
                let bit = block_index as usize * block_size * 8
                    + byte_index * 8
                    + (7 - bits.leading_zeros() as usize);
                return Ok(Some((bit as u32).min(self.capacity.saturating_sub(1))));
            }
        }

        Ok(None)
    }
}

impl Bitmap {
    /// 求出某位所在的块、块内偏移与掩码
    fn locate(&self, disk: &Disk, bit: u32) -> Result<(u32, usize, u8)> {
        if bit >= self.capacity {
            return Err(Error::OutOfRange {
                offset: bit as u64,
                len: 1,
            });
        }

        let block_size = disk.block_size();
        let byte = bit / 8;
        Ok((
            self.start_block + byte / block_size,
            (byte % block_size) as usize,
            1 << (bit % 8),
        ))
    }
}
