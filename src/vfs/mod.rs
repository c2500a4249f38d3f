//! The read-only virtual filesystem: a tree of directory, file, and
//! symlink nodes with path traversal independent of any particular
//! backing store. The library registry (`crate::library`) and the FTP
//! adapter (`crate::ftp`) are both built entirely on this module's
//! public surface — neither touches a torrent handle directly.

pub mod dir;
pub mod node;

pub use dir::{DictDir, StaticDir};
pub use node::{
    Dir, Dirent, FileNode, FileType, Node, NodeMeta, ReadStream, Stat, Symlink, SymlinkTarget,
};
