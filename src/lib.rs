pub mod alloc;
pub mod dir;
pub mod error;
pub mod fs;
pub mod fsck;
pub mod fuse;
pub mod image;
pub mod layout;
pub mod mkfs;

pub use crate::dir::DirEntry;
pub use crate::error::{FsError, Result};
pub use crate::fs::{FileAttributes, FsStats, Minifs};
pub use crate::fuse::{MinifsFilesystem, MountConfig};
pub use crate::image::Image;
pub use crate::layout::{
    InodeKind, BLOCK_SIZE, DIR_ENTRY_LEN, INODE_RECORD_LEN, INODE_SIZE, MAX_NAME_LEN, ROOT_INODE,
};
