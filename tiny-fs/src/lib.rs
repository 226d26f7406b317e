/* tiny-fs 的整体架构，自上而下 */

// 文件操作层：导入、读出、复制、删除普通文件
mod file;
pub use file::{FileInfo, FileReader};

// 目录层：目录项的追加、遍历、改名、墓碑化
mod dir;
pub use dir::{DetailedEntry, Entries, TreeEntry, MAX_TREE_DEPTH};

// 磁盘管理器层：格式化、挂载、块与 inode 的分配
mod fs;
pub use fs::{DiskUsage, FileSystem, FormatOptions, InodeAllocator};

// 多步操作的补偿动作
mod undo;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;
pub use layout::{Bitmap, DirEntry, FileKind, Geometry, Inode, OnDisk, SuperBlock};

// 块存储层：读写作为虚拟磁盘的宿主文件
mod disk;
pub use disk::Disk;

mod error;
pub use error::{Error, Result};

/// "FS_S"
pub const MAGIC: u32 = 0x4653_5F53;

/// 虚拟磁盘的最小容量
pub const DISK_SIZE_MIN: u32 = 1024 * 1024;
/// 虚拟磁盘的最大容量
pub const DISK_SIZE_MAX: u32 = 100 * 1024 * 1024;
/// 块大小必须是扇区大小的整数倍
pub const SECTOR_SIZE: u32 = 512;
pub const DEFAULT_BLOCK_SIZE: u32 = 4096;

/// 每个 inode 记录在磁盘上占据的字节数
pub const INODE_SIZE: usize = 128;
/// inode 中直接索引的槽位数
pub const DIRECT_BLOCKS: usize = 12;
/// 文件与目录实际可用的直接索引块数
pub const MAX_BLOCKS_PER_INODE: usize = 10;

pub const ROOT_INODE: u32 = 0;

/// drwxr-xr-x
pub const DIR_MODE: u32 = 0o040755;
/// -rw-r--r--
pub const FILE_MODE: u32 = 0o100644;
