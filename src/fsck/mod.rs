pub mod fsck;
pub mod fsck_backend;
pub mod fsck_types;

pub use fsck::{repair, run_fsck};
pub use fsck_backend::{FsckBackend, RawImage};
pub use fsck_types::{Dirent, FsckReport};
