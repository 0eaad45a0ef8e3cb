//! Attribute synthesis for paths over a flat key space.
//!
//! A key can look like a file and a directory prefix at once; classification
//! is explicit: exact-key match wins, directory inference runs only after it
//! fails and only past the segment-aligned prefix check.

use std::time::SystemTime;

use log::debug;

use crate::cadapter::client::ObjectBackend;
use crate::error::{FsError, Result};
use crate::vfs::path::{SEPARATOR, can_access, parse};
use crate::vfs::{Vfs, path_ino, root_ino};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// Synthesized attributes. Nothing here is persisted anywhere; identity is
/// a stable hash of the original path.
#[derive(Debug, Clone, PartialEq)]
pub struct Attributes {
    pub ino: u64,
    pub kind: FileKind,
    pub size: u64,
    pub perm: u16,
    pub mtime: Option<SystemTime>,
}

impl Attributes {
    fn directory(ino: u64, perm: u16, mtime: Option<SystemTime>) -> Self {
        Self {
            ino,
            kind: FileKind::Directory,
            size: 0,
            perm,
            mtime,
        }
    }
}

impl<B: ObjectBackend> Vfs<B> {
    /// Classify a path and synthesize its attributes.
    pub async fn getattr(&self, path: &str) -> Result<Attributes> {
        let pos = parse(path);

        // The mount root exists unconditionally and costs no store call.
        if pos.is_mount_root() {
            return Ok(Attributes::directory(
                root_ino(),
                0o777,
                Some(self.mounted_at),
            ));
        }

        if pos.is_bucket_root() {
            if self.client().exists_bucket(&pos.bucket).await? {
                return Ok(Attributes::directory(
                    path_ino(&pos.original_path),
                    0o777,
                    Some(self.mounted_at),
                ));
            }
            return Err(FsError::NotFound);
        }

        debug!("getattr path={path}");

        let listing = self.client().list(&pos.bucket, &pos.key).await?;
        if listing.is_empty() {
            return Err(FsError::NotFound);
        }

        let first = &listing[0];
        if first.key == pos.key || first.key.trim_end_matches(SEPARATOR) == pos.key {
            // The key heads a stored object: a file, unless the stored key
            // itself carries the trailing separator of a directory marker.
            if first.key.ends_with(SEPARATOR) {
                return Ok(Attributes::directory(
                    path_ino(&pos.original_path),
                    0o755,
                    first.last_modified,
                ));
            }
            return Ok(Attributes {
                ino: path_ino(&pos.original_path),
                kind: FileKind::File,
                size: first.size,
                perm: 0o777,
                mtime: first.last_modified,
            });
        }

        let keys: Vec<&str> = listing.iter().map(|o| o.key.as_str()).collect();
        if !can_access(&keys, &pos.key) {
            // A string-prefix hit that is not segment-aligned is a
            // stranger, not a descendant.
            return Err(FsError::NotFound);
        }

        // No object at the key, but descendants imply the directory.
        Ok(Attributes::directory(
            path_ino(&pos.original_path),
            0o755,
            None,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadapter::client::ObjectClient;
    use crate::cadapter::memory::MemoryBackend;

    async fn vfs_with(seeds: &[(&str, &str, &[u8])]) -> Vfs<MemoryBackend> {
        let backend = MemoryBackend::new();
        for (bucket, key, data) in seeds {
            backend.seed(bucket, key, data).await;
        }
        Vfs::new(ObjectClient::new(backend))
    }

    #[tokio::test]
    async fn test_mount_root_needs_no_store() {
        // An empty backend would fail any store call; the root must still
        // resolve.
        let vfs = vfs_with(&[]).await;
        let attrs = vfs.getattr("").await.unwrap();
        assert_eq!(attrs.kind, FileKind::Directory);
        assert_eq!(attrs.ino, root_ino());
    }

    #[tokio::test]
    async fn test_bucket_root_existence() {
        let vfs = vfs_with(&[("bkt", "k", b"x")]).await;
        let attrs = vfs.getattr("bkt").await.unwrap();
        assert_eq!(attrs.kind, FileKind::Directory);
        assert!(matches!(vfs.getattr("missing").await, Err(FsError::NotFound)));
    }

    #[tokio::test]
    async fn test_exact_key_is_a_file_with_size() {
        let vfs = vfs_with(&[("bkt", "dir/file.txt", b"hello")]).await;
        let attrs = vfs.getattr("bkt/dir/file.txt").await.unwrap();
        assert_eq!(attrs.kind, FileKind::File);
        assert_eq!(attrs.size, 5);
        assert!(attrs.mtime.is_some());
    }

    #[tokio::test]
    async fn test_marker_key_is_a_directory() {
        let vfs = vfs_with(&[("bkt", "empty-dir/", b"")]).await;
        let attrs = vfs.getattr("bkt/empty-dir").await.unwrap();
        assert_eq!(attrs.kind, FileKind::Directory);
        assert_eq!(attrs.size, 0);
    }

    #[tokio::test]
    async fn test_implied_directory_from_descendants() {
        let vfs = vfs_with(&[("bkt", "a/b/c.txt", b"x")]).await;
        let attrs = vfs.getattr("bkt/a/b").await.unwrap();
        assert_eq!(attrs.kind, FileKind::Directory);
    }

    #[tokio::test]
    async fn test_coincidental_string_prefix_is_not_found() {
        let vfs = vfs_with(&[("bkt", "aaa/111/ccc", b"x")]).await;
        assert!(matches!(vfs.getattr("bkt/aaa/11").await, Err(FsError::NotFound)));
        assert!(matches!(
            vfs.getattr("bkt/aaa/111/cc").await,
            Err(FsError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_identity_is_stable_across_calls() {
        let vfs = vfs_with(&[("bkt", "a/b.txt", b"x")]).await;
        let one = vfs.getattr("bkt/a/b.txt").await.unwrap();
        let two = vfs.getattr("bkt/a/b.txt").await.unwrap();
        assert_eq!(one.ino, two.ino);
        let other = vfs.getattr("bkt/a").await.unwrap();
        assert_ne!(one.ino, other.ino);
    }
}
