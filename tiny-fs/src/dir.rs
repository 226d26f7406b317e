//! # 目录层
//!
//! 目录的数据块里顺序存放定长的 [`DirEntry`]，目录 inode 的 `size`
//! 即 `槽位数 × 32`，是唯一判断占用了多少槽位的依据(墓碑也算)。
//!
//! 槽位只追加不回收：删除只把槽位清零成墓碑，不压缩，也不缩小 `size`。
//! 每个目录的前两个槽位是 `.` 与 `..`，常规操作不会动它们。

use std::collections::HashSet;

use crate::layout::{DirEntry, Inode};
use crate::undo::{self, Undo};
use crate::{Error, FileSystem, Result};
use crate::{DIR_MODE, MAX_BLOCKS_PER_INODE, ROOT_INODE};

/// `tree` 最多向下展开的层数
pub const MAX_TREE_DEPTH: usize = 5;

/// 目录下有效(非墓碑)目录项的迭代器。
///
/// 惰性读取，总会结束；克隆一份即可从头再来。
#[derive(Debug, Clone)]
pub struct Entries<'a> {
    fs: &'a FileSystem,
    dir: Inode,
    slot: u32,
    slots: u32,
}

/// 附带目标 inode 元信息的目录项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailedEntry {
    pub entry: DirEntry,
    pub meta: Inode,
}

/// `tree` 的一行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    /// 相对起点的深度，起点的直接子项为 0
    pub depth: usize,
    pub entry: DirEntry,
    pub is_dir: bool,
}

impl Iterator for Entries<'_> {
    type Item = Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.slot < self.slots {
            let slot = self.slot;
            self.slot += 1;

            match self.fs.read_slot(&self.dir, slot) {
                Ok(Some(entry)) if !entry.is_tombstone() => return Some(Ok(entry)),
                Ok(_) => continue,
                Err(e) => {
                    // 出错后不再继续
                    self.slot = self.slots;
                    return Some(Err(e));
                }
            }
        }

        None
    }
}

impl Entries<'_> {
    /// 回到第一个槽位
    #[inline]
    pub fn rewind(&mut self) {
        self.slot = 0;
    }
}

impl FileSystem {
    /// 确认 inode 是目录并读出它
    pub fn open_dir(&self, inode: u32) -> Result<Inode> {
        let dir = self.load_inode(inode)?;
        if !dir.is_dir() {
            return Err(Error::NotADirectory(inode));
        }
        Ok(dir)
    }

    /// 在 `parent` 下创建名为 `name` 的子目录，返回其 inode 编号
    pub fn dir_create(&mut self, parent: u32, name: &str) -> Result<u32> {
        self.open_dir(parent)?;
        let name = check_name(name)?;
        // 重名时不消耗 inode 编号
        if self.find(parent, name)?.is_some() {
            return Err(Error::AlreadyExists(name.to_owned()));
        }

        let child = undo::run(self, |fs, compensations| {
            let child = fs.alloc_inode()?;
            fs.init_dir(child, parent, compensations)?;
            fs.add_entry(parent, child, name)?;
            Ok(child)
        })?;

        log::debug!("directory {name:?} created as inode {child} under {parent}");
        Ok(child)
    }

    /// 在目录 `dir` 末尾追加一项 `name → child`
    pub fn add_entry(&mut self, dir: u32, child: u32, name: &str) -> Result<()> {
        let mut dir_inode = self.open_dir(dir)?;
        let name = check_name(name)?;
        if self.find(dir, name)?.is_some() {
            return Err(Error::AlreadyExists(name.to_owned()));
        }

        let slot = dir_inode.size / DirEntry::SIZE as u32;
        let (block_index, offset) = self.slot_pos(slot);
        if block_index >= MAX_BLOCKS_PER_INODE {
            return Err(Error::DirectoryFull(dir));
        }

        undo::run(self, |fs, compensations| {
            // 目标块尚未分配，现在分配
            if dir_inode.blocks[block_index] == 0 {
                let block = fs.alloc_block()?;
                compensations.push(Undo::ReleaseBlock(block));
                dir_inode.blocks[block_index] = block;
            }

            fs.disk.write_record(
                dir_inode.blocks[block_index],
                offset,
                &DirEntry::new(name, child),
            )?;

            dir_inode.size += DirEntry::SIZE as u32;
            dir_inode.touch();
            fs.save_inode(dir, &dir_inode)
        })
    }

    /// 列出目录下的全部有效项，包括 `.` 与 `..`
    pub fn list(&self, dir: u32) -> Result<Entries<'_>> {
        let dir = self.open_dir(dir)?;
        Ok(Entries {
            fs: self,
            slots: dir.size / DirEntry::SIZE as u32,
            dir,
            slot: 0,
        })
    }

    /// 同 [`FileSystem::list`]，并附上每项的 inode 元信息
    pub fn list_detailed(
        &self,
        dir: u32,
    ) -> Result<impl Iterator<Item = Result<DetailedEntry>> + '_> {
        Ok(self.list(dir)?.map(move |entry| {
            let entry = entry?;
            let meta = self.load_inode(entry.inode())?;
            Ok(DetailedEntry { entry, meta })
        }))
    }

    /// 只列出子目录
    pub fn list_dirs(&self, dir: u32) -> Result<impl Iterator<Item = Result<DirEntry>> + '_> {
        Ok(self.list(dir)?.filter_map(move |entry| {
            let checked = entry.and_then(|entry| {
                let is_dir = self.load_inode(entry.inode())?.is_dir();
                Ok(is_dir.then_some(entry))
            });
            checked.transpose()
        }))
    }

    /// 根据名字获取 inode 编号
    pub fn find(&self, dir: u32, name: &str) -> Result<Option<u32>> {
        let name = DirEntry::truncate(name);
        for entry in self.list(dir)? {
            let entry = entry?;
            if entry.name() == name {
                return Ok(Some(entry.inode()));
            }
        }
        Ok(None)
    }

    /// 就地改写 `parent` 中指向 `child` 的那一项的名字，其余字节不变
    pub fn rename_entry(&mut self, parent: u32, child: u32, new_name: &str) -> Result<()> {
        let dir = self.open_dir(parent)?;
        let new_name = check_name(new_name)?;
        match self.find(parent, new_name)? {
            Some(existing) if existing == child => return Ok(()),
            Some(_) => return Err(Error::AlreadyExists(new_name.to_owned())),
            None => {}
        }

        let (block, offset) = self.find_slot(&dir, child)?.ok_or(Error::EntryNotFound {
            dir: parent,
            inode: child,
        })?;
        let renamed = DirEntry::new(new_name, child);
        self.disk
            .write_block(block, offset + DirEntry::NAME_OFFSET, renamed.raw_name())?;

        log::debug!("entry for inode {child} in {parent} renamed to {new_name:?}");
        Ok(())
    }

    /// 把 `dir` 中第一个指向 `target` 的项清零成墓碑，`size` 不变
    pub fn remove_entry(&mut self, dir: u32, target: u32) -> Result<()> {
        let dir_inode = self.open_dir(dir)?;
        let (block, offset) = self
            .find_slot(&dir_inode, target)?
            .ok_or(Error::EntryNotFound { dir, inode: target })?;
        self.disk
            .write_record(block, offset, &DirEntry::tombstone())?;

        log::debug!("entry for inode {target} in {dir} tombstoned");
        Ok(())
    }

    /// 自根目录深度优先搜索，返回第一个含有指向 `target` 的项的目录
    pub fn find_parent(&self, target: u32) -> Result<u32> {
        if target == ROOT_INODE {
            return Err(Error::NotFound(target));
        }

        let mut visited = HashSet::new();
        self.search_parent(ROOT_INODE, target, &mut visited)?
            .ok_or(Error::NotFound(target))
    }

    /// 逐层进入子目录：`chooser` 拿到当前目录与其子目录，
    /// 返回 `None` 停下，返回子目录的 inode 则进入。
    pub fn navigate(
        &self,
        start: u32,
        mut chooser: impl FnMut(u32, &[DirEntry]) -> Option<u32>,
    ) -> Result<u32> {
        let mut cwd = start;
        self.open_dir(cwd)?;

        loop {
            let mut dirs = Vec::new();
            for entry in self.list_dirs(cwd)? {
                let entry = entry?;
                if !entry.is_dot() {
                    dirs.push(entry);
                }
            }

            let Some(child) = chooser(cwd, &dirs) else {
                return Ok(cwd);
            };
            if !dirs.iter().any(|entry| entry.inode() == child) {
                return Err(Error::EntryNotFound {
                    dir: cwd,
                    inode: child,
                });
            }
            cwd = child;
        }
    }

    /// 删除 `parent` 下的空目录 `dir`，回收其数据块与 inode
    pub fn dir_delete(&mut self, parent: u32, dir: u32) -> Result<()> {
        if dir == ROOT_INODE {
            return Err(Error::RootDirectory);
        }
        let dir_inode = self.open_dir(dir)?;
        for entry in self.list(dir)? {
            if !entry?.is_dot() {
                return Err(Error::DirectoryNotEmpty(dir));
            }
        }

        self.remove_entry(parent, dir)?;
        for block in dir_inode.data_blocks() {
            self.free_block(block)?;
        }
        self.free_inode(dir)?;

        log::debug!("directory {dir} deleted from {parent}");
        Ok(())
    }

    /// 把 `inode` 从 `src` 移到 `dst`，名字不变。
    ///
    /// 先链入目标目录，再从源目录摘除；目录还要改写其 `..`。
    pub fn move_entry(&mut self, src: u32, inode: u32, dst: u32) -> Result<()> {
        self.open_dir(src)?;
        self.open_dir(dst)?;

        let mut name = None;
        for entry in self.list(src)? {
            let entry = entry?;
            if !entry.is_dot() && entry.inode() == inode {
                name = Some(entry.name().into_owned());
                break;
            }
        }
        let name = name.ok_or(Error::EntryNotFound { dir: src, inode })?;
        if src == dst {
            return Ok(());
        }

        let is_dir = self.load_inode(inode)?.is_dir();
        if is_dir && (dst == inode || self.is_ancestor(inode, dst)?) {
            return Err(Error::InvalidMove(inode));
        }

        undo::run(self, |fs, compensations| {
            fs.add_entry(dst, inode, &name)?;
            compensations.push(Undo::Unlink { dir: dst, inode });
            if is_dir {
                fs.set_parent_link(inode, dst)?;
                compensations.push(Undo::Reparent {
                    dir: inode,
                    parent: src,
                });
            }
            fs.remove_entry(src, inode)
        })?;

        log::debug!("inode {inode} moved from {src} to {dst}");
        Ok(())
    }

    /// 先序列出 `dir` 之下的子树，跳过 `.` 与 `..`
    pub fn tree(&self, dir: u32) -> Result<Vec<TreeEntry>> {
        let mut lines = Vec::new();
        let mut visited = HashSet::from([dir]);
        self.walk(dir, 0, &mut lines, &mut visited)?;
        Ok(lines)
    }
}

impl FileSystem {
    /// 建立根目录：0 号 inode，`.` 与 `..` 都指向自身
    pub(crate) fn create_root(&mut self) -> Result<()> {
        undo::run(self, |fs, compensations| {
            let root = fs.alloc_inode()?;
            debug_assert_eq!(root, ROOT_INODE);
            fs.init_dir(root, root, compensations)
        })
    }

    /// 为新目录分配一个数据块，写入 `.` 与 `..`，保存其 inode
    fn init_dir(
        &mut self,
        inode: u32,
        parent: u32,
        compensations: &mut undo::Compensations,
    ) -> Result<()> {
        let block = self.alloc_block()?;
        compensations.push(Undo::ReleaseBlock(block));

        self.disk.zero_block(block)?;
        self.disk.write_record(block, 0, &DirEntry::new(".", inode))?;
        self.disk
            .write_record(block, DirEntry::SIZE, &DirEntry::new("..", parent))?;

        let mut dir = Inode::new(DIR_MODE);
        dir.blocks[0] = block;
        dir.size = 2 * DirEntry::SIZE as u32;
        self.save_inode(inode, &dir)?;
        compensations.push(Undo::FreeInode(inode));

        Ok(())
    }

    /// 改写目录的 `..`
    pub(crate) fn set_parent_link(&mut self, dir: u32, parent: u32) -> Result<()> {
        let dir_inode = self.open_dir(dir)?;
        self.disk.write_record(
            dir_inode.blocks[0],
            DirEntry::SIZE,
            &DirEntry::new("..", parent),
        )
    }

    /// 槽位所在的逻辑块索引与块内偏移
    #[inline]
    fn slot_pos(&self, slot: u32) -> (usize, usize) {
        let byte = slot as usize * DirEntry::SIZE;
        let block_size = self.block_size() as usize;
        (byte / block_size, byte % block_size)
    }

    /// 读出一个槽位；槽位所在的块不存在时跳过
    fn read_slot(&self, dir: &Inode, slot: u32) -> Result<Option<DirEntry>> {
        let (block_index, offset) = self.slot_pos(slot);
        if block_index >= MAX_BLOCKS_PER_INODE || dir.blocks[block_index] == 0 {
            log::warn!("slot {slot} lives in an unallocated block, skipped");
            return Ok(None);
        }
        self.disk
            .read_record(dir.blocks[block_index], offset)
            .map(Some)
    }

    /// 第一个指向 `target` 的非 `.`/`..` 有效槽位：块号与块内偏移
    fn find_slot(&self, dir: &Inode, target: u32) -> Result<Option<(u32, usize)>> {
        for slot in 0..dir.size / DirEntry::SIZE as u32 {
            let Some(entry) = self.read_slot(dir, slot)? else {
                continue;
            };
            if entry.is_tombstone() || entry.is_dot() || entry.inode() != target {
                continue;
            }

            let (block_index, offset) = self.slot_pos(slot);
            return Ok(Some((dir.blocks[block_index], offset)));
        }
        Ok(None)
    }

    fn search_parent(
        &self,
        dir: u32,
        target: u32,
        visited: &mut HashSet<u32>,
    ) -> Result<Option<u32>> {
        if !visited.insert(dir) {
            return Ok(None);
        }

        let mut children = Vec::new();
        for entry in self.list(dir)? {
            let entry = entry?;
            if !entry.is_dot() {
                children.push(entry.inode());
            }
        }
        if children.contains(&target) {
            return Ok(Some(dir));
        }

        for child in children {
            if !self.load_inode(child)?.is_dir() {
                continue;
            }
            if let Some(parent) = self.search_parent(child, target, visited)? {
                return Ok(Some(parent));
            }
        }
        Ok(None)
    }

    /// `ancestor` 是否位于 `dir` 到根目录的路径上
    fn is_ancestor(&self, ancestor: u32, dir: u32) -> Result<bool> {
        let mut current = dir;
        while current != ROOT_INODE {
            current = self.find_parent(current)?;
            if current == ancestor {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn walk(
        &self,
        dir: u32,
        depth: usize,
        lines: &mut Vec<TreeEntry>,
        visited: &mut HashSet<u32>,
    ) -> Result<()> {
        let mut children = Vec::new();
        for entry in self.list(dir)? {
            let entry = entry?;
            if !entry.is_dot() {
                children.push(entry);
            }
        }

        for entry in children {
            let is_dir = self.load_inode(entry.inode())?.is_dir();
            let child = entry.inode();
            lines.push(TreeEntry {
                depth,
                entry,
                is_dir,
            });
            if is_dir && depth + 1 < MAX_TREE_DEPTH && visited.insert(child) {
                self.walk(child, depth + 1, lines, visited)?;
            }
        }
        Ok(())
    }
}

/// 名字不能为空、不能含 `/` 或 `\0`，也不能是 `.` 或 `..`；
/// 过长的名字被截断。
pub(crate) fn check_name(name: &str) -> Result<&str> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\0']) {
        return Err(Error::InvalidName(name.to_owned()));
    }
    Ok(DirEntry::truncate(name))
}
