//! # 文件操作层
//!
//! 普通文件的数据按块顺序存放在至多 [`MAX_BLOCKS_PER_INODE`] 个直接索引块中，
//! 最后一块可能只用了一部分。

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use enumflags2::BitFlags;

use crate::dir::check_name;
use crate::layout::{FileKind, Inode};
use crate::undo::{self, Undo};
use crate::{Error, FileSystem, Result};
use crate::{FILE_MODE, MAX_BLOCKS_PER_INODE};

/// 文件或目录的元信息汇总
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub inode: u32,
    pub kind: BitFlags<FileKind>,
    pub mode: u32,
    pub size: u32,
    pub created_at: i64,
    pub modified_at: i64,
    /// 已分配的数据块
    pub blocks: Vec<u32>,
    /// 已分配块的总字节数
    pub allocated_bytes: u64,
    /// 已分配但未被数据占用的字节数
    pub internal_fragmentation: u64,
}

/// 按顺序读出文件的全部字节
#[derive(Debug, Clone)]
pub struct FileReader<'a> {
    fs: &'a FileSystem,
    inode: Inode,
    pos: u32,
}

impl FileReader<'_> {
    /// 文件总字节数
    #[inline]
    pub fn len(&self) -> u32 {
        self.inode.size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inode.size == 0
    }
}

impl Read for FileReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.inode.size || buf.is_empty() {
            return Ok(0);
        }

        let block_size = self.fs.block_size();
        let block_index = (self.pos / block_size) as usize;
        let offset = self.pos % block_size;
        let len = (buf.len() as u32)
            .min(block_size - offset)
            .min(self.inode.size - self.pos);

        let block = match self.inode.blocks.get(block_index) {
            Some(&block) if block_index < MAX_BLOCKS_PER_INODE && block != 0 => block,
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("data block {block_index} is not allocated"),
                ))
            }
        };

        self.fs
            .disk
            .read_block(block, offset as usize, &mut buf[..len as usize])
            .map_err(|e| match e {
                Error::Io(e) => e,
                e => io::Error::other(e.to_string()),
            })?;
        self.pos += len;
        Ok(len as usize)
    }
}

impl FileSystem {
    /// 从 `source` 读入数据，在 `parent` 下创建名为 `name` 的文件。
    ///
    /// 失败时已分配的块与 inode 全部归还，只消耗掉一个 inode 编号。
    pub fn file_create(&mut self, parent: u32, mut source: impl Read, name: &str) -> Result<u32> {
        self.open_dir(parent)?;
        let name = check_name(name)?;
        if self.find(parent, name)?.is_some() {
            return Err(Error::AlreadyExists(name.to_owned()));
        }

        let inode = undo::run(self, |fs, compensations| {
            let inode = fs.alloc_inode()?;
            let mut record = Inode::new(FILE_MODE);
            let mut chunk = vec![0; fs.block_size() as usize];

            loop {
                let len = fill(&mut source, &mut chunk)?;
                if len == 0 {
                    break;
                }

                let block_index = Inode::count_data_block(record.size, fs.block_size());
                if block_index >= MAX_BLOCKS_PER_INODE {
                    return Err(Error::FileTooLarge);
                }

                let block = fs.alloc_block()?;
                compensations.push(Undo::ReleaseBlock(block));
                fs.disk.write_block(block, 0, &chunk[..len])?;
                record.blocks[block_index] = block;
                record.size += len as u32;

                if len < chunk.len() {
                    break;
                }
            }

            fs.save_inode(inode, &record)?;
            compensations.push(Undo::FreeInode(inode));
            fs.add_entry(parent, inode, name)?;
            Ok(inode)
        })?;

        log::debug!("file {name:?} created as inode {inode} under {parent}");
        Ok(inode)
    }

    /// 导入宿主机上的文件
    pub fn file_import(
        &mut self,
        parent: u32,
        host_path: impl AsRef<Path>,
        name: &str,
    ) -> Result<u32> {
        let source = File::open(host_path.as_ref())?;
        self.file_create(parent, source, name)
    }

    pub fn file_read(&self, inode: u32) -> Result<FileReader<'_>> {
        let record = self.load_inode(inode)?;
        if !record.is_file() {
            return Err(Error::NotAFile(inode));
        }

        Ok(FileReader {
            fs: self,
            inode: record,
            pos: 0,
        })
    }

    /// 读出文件的全部内容
    pub fn read_to_vec(&self, inode: u32) -> Result<Vec<u8>> {
        let mut reader = self.file_read(inode)?;
        let mut data = Vec::with_capacity(reader.len() as usize);
        reader.read_to_end(&mut data)?;
        Ok(data)
    }

    /// 先从父目录摘除，再回收数据块与 inode
    pub fn file_delete(&mut self, parent: u32, file: u32) -> Result<()> {
        let record = self.load_inode(file)?;
        if !record.is_file() {
            return Err(Error::NotAFile(file));
        }

        self.remove_entry(parent, file)?;
        for block in record.data_blocks() {
            self.free_block(block)?;
        }
        self.free_inode(file)?;

        log::debug!("file {file} deleted from {parent}");
        Ok(())
    }

    /// 把文件复制到 `dst_dir` 下，新文件拥有独立的 inode 与数据块
    pub fn file_copy(&mut self, file: u32, dst_dir: u32, new_name: &str) -> Result<u32> {
        let data = self.read_to_vec(file)?;
        self.file_create(dst_dir, data.as_slice(), new_name)
    }

    pub fn stat(&self, inode: u32) -> Result<FileInfo> {
        let record = self.load_inode(inode)?;
        let blocks: Vec<u32> = record.data_blocks().collect();
        let allocated_bytes = blocks.len() as u64 * self.block_size() as u64;

        Ok(FileInfo {
            inode,
            kind: record.kind(),
            mode: record.mode,
            size: record.size,
            created_at: record.created_at,
            modified_at: record.modified_at,
            internal_fragmentation: allocated_bytes.saturating_sub(record.size as u64),
            allocated_bytes,
            blocks,
        })
    }
}

/// 尽量读满 `buf`，只有遇到数据末尾才会返回较短的长度
fn fill(source: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}
