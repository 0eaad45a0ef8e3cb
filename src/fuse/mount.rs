//! Mount helpers for starting/stopping FUSE
//!
//! Notes:
//! - Only supported on Unix-like systems. On Linux we support unprivileged
//!   mount via fusermount3.
//! - These helpers are thin wrappers over rfuse3 raw Session APIs.

use std::path::Path;

use rfuse3::MountOptions;

use crate::cadapter::client::ObjectBackend;
use crate::fuse::fs::FuseFs;

/// Build default mount options.
#[allow(dead_code)]
fn default_mount_options(allow_other: bool) -> MountOptions {
    let mut options = MountOptions::default();
    options.fs_name("bucketfs");
    if allow_other {
        options.allow_other(true);
    }
    options
}

/// Mount the filesystem on the given directory using unprivileged mode
/// (requires fusermount3 in PATH).
#[cfg(target_os = "linux")]
pub async fn mount_unprivileged<B>(
    fs: FuseFs<B>,
    mount_point: impl AsRef<Path>,
    allow_other: bool,
) -> std::io::Result<rfuse3::raw::MountHandle>
where
    B: ObjectBackend + 'static,
{
    let options = default_mount_options(allow_other);
    let session = rfuse3::raw::Session::new(options);
    session.mount_with_unprivileged(fs, mount_point).await
}

/// Fallback stub for non-Linux targets.
#[cfg(not(target_os = "linux"))]
pub async fn mount_unprivileged<B>(
    _fs: FuseFs<B>,
    _mount_point: impl AsRef<Path>,
    _allow_other: bool,
) -> std::io::Result<rfuse3::raw::MountHandle>
where
    B: ObjectBackend + 'static,
{
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "FUSE mount is only supported on Linux in this build",
    ))
}
