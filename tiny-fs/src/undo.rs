//! # 补偿动作
//!
//! 多步修改(分配块 → 写数据 → 保存 inode → 链入父目录)不具备事务性。
//! 每完成一步就登记其逆操作，失败时按相反顺序执行，
//! 使失败的调用在调用者看来没有留下痕迹。崩溃时不提供任何保证。

use crate::{FileSystem, Result};

/// 已完成的一步的逆操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Undo {
    /// 释放刚分配的数据块
    ReleaseBlock(u32),
    /// 回收刚写入的 inode
    FreeInode(u32),
    /// 墓碑化刚追加到 `dir` 中指向 `inode` 的目录项
    Unlink { dir: u32, inode: u32 },
    /// 把目录 `dir` 的 `..` 改回 `parent`
    Reparent { dir: u32, parent: u32 },
}

#[derive(Debug, Default)]
pub(crate) struct Compensations(Vec<Undo>);

impl Compensations {
    #[inline]
    pub fn push(&mut self, undo: Undo) {
        self.0.push(undo);
    }

    /// 逆序执行全部补偿；补偿自身的失败只记录，不再传播
    pub fn unwind(self, fs: &mut FileSystem) {
        for undo in self.0.into_iter().rev() {
            log::warn!("compensating: {undo:?}");
            let result = match undo {
                Undo::ReleaseBlock(block) => fs.free_block(block),
                Undo::FreeInode(inode) => fs.free_inode(inode),
                Undo::Unlink { dir, inode } => fs.remove_entry(dir, inode),
                Undo::Reparent { dir, parent } => fs.set_parent_link(dir, parent),
            };
            if let Err(e) = result {
                log::error!("compensation {undo:?} failed: {e}");
            }
        }
    }
}

/// 执行一串步骤，出错时撤销已登记的步骤
pub(crate) fn run<T>(
    fs: &mut FileSystem,
    steps: impl FnOnce(&mut FileSystem, &mut Compensations) -> Result<T>,
) -> Result<T> {
    let mut compensations = Compensations::default();
    match steps(fs, &mut compensations) {
        Ok(value) => Ok(value),
        Err(e) => {
            compensations.unwind(fs);
            Err(e)
        }
    }
}
