//! FUSE transport adapter
//!
//! Responsibilities:
//! - Translate inode-based kernel calls into the path-based core: an inode
//!   table keyed by stable path hashes and a file-handle table of buffered
//!   handles.
//! - Map core errors onto errnos.
//!
//! Submodules:
//! - `fs`: the rfuse3 `Filesystem` implementation
//! - `mount`: mount/unmount helpers
pub mod fs;
pub mod mount;
