//! Library crate for bucketfs: an S3-compatible object store presented as a
//! POSIX filesystem through FUSE. Internal modules are re-exported so the
//! core can also be driven directly as an SDK.

pub mod cadapter;
pub mod error;
pub mod fuse;
pub mod meta;
pub mod vfs;

pub use crate::cadapter::client::{ObjectBackend, ObjectClient, ObjectSummary};
pub use crate::cadapter::memory::MemoryBackend;
pub use crate::cadapter::s3::{S3Backend, S3Config};
pub use crate::error::{BackendError, FsError};
pub use crate::fuse::fs::FuseFs;
pub use crate::meta::cache::{CacheConfig, MetaCache};
pub use crate::vfs::attr::{Attributes, FileKind};
pub use crate::vfs::dir::DirEntry;
pub use crate::vfs::handle::BufferedHandle;
pub use crate::vfs::path::{Address, Position, parse};
pub use crate::vfs::rename::Move;
pub use crate::vfs::{ROOT_LABEL, Vfs, path_ino, root_ino};
