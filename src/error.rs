//! Error taxonomy shared by the filesystem core and the transport adapter.

use rfuse3::Errno;
use thiserror::Error;

/// Boxed error produced by object-store backends. Backends own wire-level
/// failure detail; above the facade everything collapses into [`FsError::Io`].
pub type BackendError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum FsError {
    /// No object or bucket matches the path.
    #[error("not found")]
    NotFound,
    /// Create/mkdir onto an occupied key or bucket.
    #[error("already exists")]
    AlreadyExists,
    /// Mutation aimed at the mount root or a bucket root.
    #[error("permission denied")]
    PermissionDenied,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("is a directory")]
    IsDirectory,
    /// Any store or local-storage failure, undistinguished by cause.
    #[error("i/o failure: {0}")]
    Io(#[source] BackendError),
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        FsError::Io(Box::new(err))
    }
}

impl From<FsError> for Errno {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => Errno::from(libc::ENOENT),
            FsError::AlreadyExists => Errno::from(libc::EEXIST),
            FsError::PermissionDenied => Errno::from(libc::EPERM),
            FsError::InvalidArgument => Errno::from(libc::EINVAL),
            FsError::IsDirectory => Errno::from(libc::EISDIR),
            FsError::Io(_) => Errno::from(libc::EIO),
        }
    }
}

pub type Result<T> = std::result::Result<T, FsError>;
