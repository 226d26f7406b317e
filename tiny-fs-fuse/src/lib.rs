//! 宿主机一侧的工具：把宿主目录打包成 tiny-fs 镜像，再把镜像内容渲染成文本


use std::fmt::Write;
use std::path::Path;

use tiny_fs::{DiskUsage, FileSystem, Inode, Result};

/// 打包进镜像的一个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packed {
    pub name: String,
    pub inode: u32,
    pub size: u32,
}

/// 把 `source` 下的普通文件逐个导入 `dir`，按名字排序。
///
/// 导入失败的文件只记录告警并跳过；子目录不会递归。
pub fn pack_dir(fs: &mut FileSystem, dir: u32, source: &Path) -> Result<Vec<Packed>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => files.push((name, entry.path())),
            Err(name) => log::warn!("skipping non UTF-8 name {name:?}"),
        }
    }
    files.sort();

    let mut packed = Vec::with_capacity(files.len());
    for (name, path) in files {
        match fs.file_import(dir, &path, &name) {
            Ok(inode) => {
                let size = fs.load_inode(inode)?.size;
                log::info!("packed {name:?} as inode {inode} ({size} bytes)");
                packed.push(Packed { name, inode, size });
            }
            Err(e) => log::warn!("skipping {path:?}: {e}"),
        }
    }

    Ok(packed)
}

/// 类似 `ls -l` 的列表，包括 `.` 与 `..`
pub fn render_listing(fs: &FileSystem, dir: u32) -> Result<String> {
    let mut out = String::new();
    for entry in fs.list_detailed(dir)? {
        let entry = entry?;
        let _ = writeln!(
            out,
            "{} {:>5} {:>8} {}",
            mode_string(&entry.meta),
            entry.entry.inode(),
            entry.meta.size,
            entry.entry.name()
        );
    }
    Ok(out)
}

/// 缩进表示层级，目录名以 `/` 结尾
pub fn render_tree(fs: &FileSystem, dir: u32) -> Result<String> {
    let mut out = String::from("/\n");
    for line in fs.tree(dir)? {
        let _ = writeln!(
            out,
            "{}{}{}",
            "  ".repeat(line.depth + 1),
            line.entry.name(),
            if line.is_dir { "/" } else { "" }
        );
    }
    Ok(out)
}

pub fn render_usage(usage: &DiskUsage) -> String {
    format!(
        "block size:  {} B\n\
         blocks:      {} total, {} used, {} free ({:.2}% used)\n\
         inodes:      {} total, {} live\n",
        usage.block_size,
        usage.total_blocks,
        usage.used_blocks,
        usage.free_blocks,
        usage.usage_percent(),
        usage.inode_count,
        usage.live_inodes,
    )
}

/// `drwxr-xr-x` 形式的类型与权限位
fn mode_string(inode: &Inode) -> String {
    let kind = if inode.is_dir() { 'd' } else { '-' };
    let perms = inode.permissions();
    let bits = (0..9).rev().map(|shift| {
        if perms & (1 << shift) == 0 {
            '-'
        } else {
            ['x', 'w', 'r'][shift % 3]
        }
    });
    std::iter::once(kind).chain(bits).collect()
}
