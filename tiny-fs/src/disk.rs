//! # 块存储层
//!
//! 虚拟磁盘就是宿主机上的一个普通文件，[`Disk`] 独占它的句柄，
//! 以**块号 + 块内偏移**的方式读写其中的字节。
//!
//! 块大小与磁盘容量在 [`Disk`] 的生命周期内不变；
//! 任何越过磁盘容量的访问都会得到 [`Error::OutOfRange`]。

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::layout::{OnDisk, SuperBlock};
use crate::{Error, Result};
use crate::{DISK_SIZE_MAX, DISK_SIZE_MIN, SECTOR_SIZE};

#[derive(Debug)]
pub struct Disk {
    file: File,
    /// 磁盘容量(字节)
    size: u32,
    block_size: u32,
}

impl Disk {
    /// 创建或打开宿主文件作为虚拟磁盘，并把文件长度调整为 `size`。
    ///
    /// 已存在的文件不会被截断清空，只会被扩展(稀疏)或缩短到 `size`。
    pub fn create(path: impl AsRef<Path>, size: u64, block_size: u32) -> Result<Self> {
        let size = check_size(size)?;
        check_block_size(block_size, size)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;
        file.set_len(size as u64)?;

        log::debug!(
            "disk created: path={:?} size={size} block_size={block_size}",
            path.as_ref()
        );

        Ok(Self {
            file,
            size,
            block_size,
        })
    }

    /// 打开已格式化的镜像，几何参数取自 0 号块上的超级块。
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;

        let mut header = [0; SuperBlock::SIZE];
        file.read_exact(&mut header).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => Error::CorruptImage("image too short"),
            _ => e.into(),
        })?;
        let super_block = SuperBlock::decode(&header)?;
        if !super_block.is_valid() {
            return Err(Error::CorruptImage("bad magic"));
        }

        let size = check_size(super_block.disk_size as u64)
            .map_err(|_| Error::CorruptImage("disk size out of bounds"))?;
        check_block_size(super_block.block_size, size)
            .map_err(|_| Error::CorruptImage("bad block size"))?;
        if file.metadata()?.len() < size as u64 {
            return Err(Error::CorruptImage("image is shorter than its disk size"));
        }

        Ok(Self {
            file,
            size,
            block_size: super_block.block_size,
        })
    }

    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.block_size
    }

    #[inline]
    pub fn total_blocks(&self) -> u32 {
        self.size / self.block_size
    }

    /// 从 `block` 号块的 `offset` 处读满 `buf`
    pub fn read_block(&self, block: u32, offset: usize, buf: &mut [u8]) -> Result<()> {
        let pos = self.position(block, offset, buf.len())?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(pos))?;
        file.read_exact(buf)?;
        Ok(())
    }

    /// 把 `buf` 整个写到 `block` 号块的 `offset` 处
    pub fn write_block(&self, block: u32, offset: usize, buf: &[u8]) -> Result<()> {
        let pos = self.position(block, offset, buf.len())?;
        let mut file = &self.file;
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(buf)?;
        Ok(())
    }

    pub fn zero_block(&self, block: u32) -> Result<()> {
        self.write_block(block, 0, &vec![0; self.block_size as usize])
    }

    #[inline]
    pub fn read_record<T: OnDisk>(&self, block: u32, offset: usize) -> Result<T> {
        let mut buf = [0; 256];
        let buf = &mut buf[..T::SIZE];
        self.read_block(block, offset, buf)?;
        T::decode(buf)
    }

    #[inline]
    pub fn write_record<T: OnDisk>(&self, block: u32, offset: usize, record: &T) -> Result<()> {
        self.write_block(block, offset, &record.encode()?)
    }

    /// 同步到宿主文件后释放句柄。
    ///
    /// 直接丢弃 [`Disk`] 同样会关闭句柄，只是拿不到同步的错误。
    pub fn close(self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

impl Disk {
    /// 换算出字节位置，并确认 `[pos, pos + len)` 落在磁盘之内
    fn position(&self, block: u32, offset: usize, len: usize) -> Result<u64> {
        let pos = block as u64 * self.block_size as u64 + offset as u64;
        if pos + len as u64 > self.size as u64 {
            return Err(Error::OutOfRange { offset: pos, len });
        }
        Ok(pos)
    }
}

fn check_size(size: u64) -> Result<u32> {
    if !(DISK_SIZE_MIN as u64..=DISK_SIZE_MAX as u64).contains(&size) {
        return Err(Error::InvalidSize(size));
    }
    Ok(size as u32)
}

/// 块大小须是扇区大小的非零整数倍，且不超过磁盘容量
fn check_block_size(block_size: u32, size: u32) -> Result<()> {
    if block_size == 0 || block_size % SECTOR_SIZE != 0 || block_size > size {
        return Err(Error::InvalidBlockSize(block_size));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_geometry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");

        assert!(matches!(
            Disk::create(&path, 512 * 1024, 512),
            Err(Error::InvalidSize(_))
        ));
        assert!(matches!(
            Disk::create(&path, DISK_SIZE_MAX as u64 + 1, 512),
            Err(Error::InvalidSize(_))
        ));
        assert!(matches!(
            Disk::create(&path, DISK_SIZE_MIN as u64, 1000),
            Err(Error::InvalidBlockSize(1000))
        ));
        assert!(matches!(
            Disk::create(&path, DISK_SIZE_MIN as u64, 0),
            Err(Error::InvalidBlockSize(0))
        ));
    }

    #[test]
    fn block_size_is_bounded_by_disk_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");

        for block_size in [2 * DISK_SIZE_MIN, 1 << 29, 1 << 31] {
            assert!(matches!(
                Disk::create(&path, DISK_SIZE_MIN as u64, block_size),
                Err(Error::InvalidBlockSize(b)) if b == block_size
            ));
        }
        assert!(Disk::create(&path, DISK_SIZE_MIN as u64, DISK_SIZE_MIN).is_ok());
    }

    #[test]
    fn short_image_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");
        std::fs::write(&path, [0x53, 0x5F, 0x53, 0x46, 0, 0]).unwrap();

        assert!(matches!(
            Disk::open(&path),
            Err(Error::CorruptImage("image too short"))
        ));
    }

    #[test]
    fn sets_file_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("disk.img");

        let disk = Disk::create(&path, 2 * DISK_SIZE_MIN as u64, 1024).unwrap();
        assert_eq!(disk.total_blocks(), 2048);
        disk.close().unwrap();
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            2 * DISK_SIZE_MIN as u64
        );
    }

    #[test]
    fn block_io_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let disk = Disk::create(dir.path().join("disk.img"), DISK_SIZE_MIN as u64, 512).unwrap();

        disk.write_block(7, 100, b"hello").unwrap();
        let mut buf = [0; 5];
        disk.read_block(7, 100, &mut buf).unwrap();
        assert_eq!(&buf, b"hello");

        let last = disk.total_blocks() - 1;
        assert!(disk.write_block(last, 0, &[1; 512]).is_ok());
        assert!(matches!(
            disk.write_block(last, 1, &[1; 512]),
            Err(Error::OutOfRange { .. })
        ));
        assert!(matches!(
            disk.read_block(last + 1, 0, &mut buf),
            Err(Error::OutOfRange { .. })
        ));
    }
}
