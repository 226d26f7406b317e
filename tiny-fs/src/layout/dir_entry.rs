use std::borrow::Cow;

use binrw::binrw;

const NAME_MAX_LEN: usize = 27;

/// 文件系统项的元信息
#[binrw]
#[brw(little)]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirEntry {
    inode: u32,
    // 最后一字节留给 \0
    name: [u8; NAME_MAX_LEN + 1],
}

impl DirEntry {
    /// 元信息大小恒为32字节
    pub const SIZE: usize = 32;
    /// 名字字段在记录内的偏移
    pub const NAME_OFFSET: usize = 4;

    /// 过长的名字会在字符边界上截断到 [`NAME_MAX_LEN`] 字节以内
    #[inline]
    pub fn new(name: &str, inode: u32) -> Self {
        let bytes = Self::truncate(name).as_bytes();
        let mut name = [0; NAME_MAX_LEN + 1];
        name[..bytes.len()].copy_from_slice(bytes);

        Self { inode, name }
    }

    /// 墓碑：全零的目录项
    #[inline]
    pub fn tombstone() -> Self {
        Self::default()
    }

    pub fn truncate(name: &str) -> &str {
        if name.len() <= NAME_MAX_LEN {
            return name;
        }
        let end = (0..=NAME_MAX_LEN)
            .rev()
            .find(|&i| name.is_char_boundary(i))
            .unwrap_or(0);
        &name[..end]
    }

    pub fn name(&self) -> Cow<'_, str> {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX_LEN);
        String::from_utf8_lossy(&self.name[..len])
    }

    /// 名字字段的原始字节，包括末尾的 \0 填充
    #[inline]
    pub fn raw_name(&self) -> &[u8] {
        &self.name
    }

    #[inline]
    pub fn inode(&self) -> u32 {
        self.inode
    }

    #[inline]
    pub fn is_tombstone(&self) -> bool {
        self.name[0] == 0
    }

    /// `.` 或 `..`
    #[inline]
    pub fn is_dot(&self) -> bool {
        let name = self.name();
        name == "." || name == ".."
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::OnDisk;

    #[test]
    fn layout() {
        let entry = DirEntry::new("home", 3);
        let bytes = entry.encode().unwrap();
        assert_eq!(&bytes[..4], &3u32.to_le_bytes());
        assert_eq!(&bytes[4..8], b"home");
        assert!(bytes[8..].iter().all(|&b| b == 0));
        assert_eq!(DirEntry::decode(&bytes).unwrap(), entry);
    }

    #[test]
    fn long_names_are_truncated() {
        let long = "abcdefghijklmnopqrstuvwxyz0123456789";
        let entry = DirEntry::new(long, 1);
        assert_eq!(entry.name(), &long[..27]);
        assert_eq!(entry.raw_name()[27], 0);

        // 不会截断在多字节字符中间
        let wide = "ééééééééééééééé";
        assert_eq!(DirEntry::new(wide, 1).name(), "ééééééééééééé");
    }

    #[test]
    fn tombstones_and_dots() {
        assert!(DirEntry::tombstone().is_tombstone());
        assert!(!DirEntry::new(".", 0).is_tombstone());
        assert!(DirEntry::new(".", 0).is_dot());
        assert!(DirEntry::new("..", 0).is_dot());
        assert!(!DirEntry::new("...", 0).is_dot());
    }
}
