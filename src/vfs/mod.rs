//! Path-based filesystem core over a flat object store.
//!
//! Responsibilities:
//! - Resolve paths to (bucket, key) addresses and synthesize attributes,
//!   directory listings and identities from store listings alone.
//! - Stage buffered writes per open file and commit them as whole-object
//!   puts.
//! - Implement rename as copy-then-delete, single-object or whole-subtree.
//!
//! Submodules:
//! - `path`: pure path resolution and prefix predicates
//! - `attr`: attribute synthesis
//! - `dir`: one-level directory enumeration
//! - `handle`: buffered per-open-file state machine
//! - `rename`: the move engine

pub mod attr;
pub mod dir;
pub mod handle;
pub mod path;
pub mod rename;

use std::sync::Arc;
use std::time::SystemTime;

use log::debug;
use sha2::{Digest, Sha256};

use crate::cadapter::client::{ObjectBackend, ObjectClient};
use crate::error::{FsError, Result};
use crate::vfs::handle::BufferedHandle;
use crate::vfs::path::{SEPARATOR, parse};

/// Label hashed into the mount root's identity. No stored object backs the
/// root, so its inode must come from a constant.
pub const ROOT_LABEL: &str = "bucketfs";

/// Stable identity for a path: sha256 truncated to 64 bits. No persisted
/// state is needed for identities to survive across calls.
pub fn path_ino(path: &str) -> u64 {
    let digest = Sha256::digest(path.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("sha256 digest is 32 bytes"))
}

pub fn root_ino() -> u64 {
    path_ino(ROOT_LABEL)
}

/// The filesystem core. All handlers may run concurrently; shared state is
/// the store client (with its internal cache) and the mount timestamp used
/// for synthesized root attributes.
pub struct Vfs<B: ObjectBackend> {
    client: Arc<ObjectClient<B>>,
    mounted_at: SystemTime,
}

impl<B: ObjectBackend> Vfs<B> {
    pub fn new(client: ObjectClient<B>) -> Self {
        Self {
            client: Arc::new(client),
            mounted_at: SystemTime::now(),
        }
    }

    pub fn client(&self) -> &ObjectClient<B> {
        &self.client
    }

    /// Open an existing object for buffered i/o.
    pub async fn open(&self, path: &str) -> Result<BufferedHandle<B>> {
        debug!("open path={path}");
        let pos = parse(path);
        if pos.is_mount_root() || pos.is_bucket_root() {
            return Err(FsError::IsDirectory);
        }
        if !self.client.exists(&pos.bucket, &pos.key).await? {
            return Err(FsError::NotFound);
        }
        Ok(BufferedHandle::new(self.client.clone(), pos.bucket, pos.key))
    }

    /// Create a zero-byte object and open it. An object already stored at
    /// the exact key is rejected.
    pub async fn create(&self, path: &str) -> Result<BufferedHandle<B>> {
        debug!("create path={path}");
        let pos = parse(path);
        if pos.is_mount_root() || pos.is_bucket_root() {
            return Err(FsError::IsDirectory);
        }
        if self.client.exists(&pos.bucket, &pos.key).await? {
            return Err(FsError::InvalidArgument);
        }
        self.client.put(&pos.bucket, &pos.key, &[]).await?;
        Ok(BufferedHandle::new(self.client.clone(), pos.bucket, pos.key))
    }

    /// Make a directory: a new bucket at bucket-root level, a zero-byte
    /// trailing-separator marker object below it.
    pub async fn mkdir(&self, path: &str) -> Result<()> {
        debug!("mkdir path={path}");
        let pos = parse(path);
        if pos.is_mount_root() {
            return Err(FsError::AlreadyExists);
        }
        if pos.is_bucket_root() {
            if self.client.exists_bucket(&pos.bucket).await? {
                return Err(FsError::AlreadyExists);
            }
            return self.client.create_bucket(&pos.bucket).await;
        }
        let marker = marker_key(&pos.key);
        if self.client.exists(&pos.bucket, &pos.key).await?
            || self.client.exists(&pos.bucket, &marker).await?
        {
            return Err(FsError::AlreadyExists);
        }
        self.client.put(&pos.bucket, &marker, &[]).await
    }

    /// Remove a regular object.
    pub async fn unlink(&self, path: &str) -> Result<()> {
        debug!("unlink path={path}");
        let pos = parse(path);
        if !self.client.exists(&pos.bucket, &pos.key).await? {
            return Err(FsError::NotFound);
        }
        self.client.delete(&pos.bucket, &pos.key).await
    }

    /// Remove a bucket or an explicit directory marker. A directory that is
    /// only implied by its descendants has no object to remove and reports
    /// NotFound.
    pub async fn rmdir(&self, path: &str) -> Result<()> {
        debug!("rmdir path={path}");
        let pos = parse(path);
        if pos.is_mount_root() {
            return Err(FsError::PermissionDenied);
        }
        if pos.is_bucket_root() {
            if !self.client.exists_bucket(&pos.bucket).await? {
                return Err(FsError::NotFound);
            }
            return self.client.delete_bucket(&pos.bucket).await;
        }
        let marker = marker_key(&pos.key);
        if !self.client.exists(&pos.bucket, &marker).await? {
            return Err(FsError::NotFound);
        }
        self.client.delete(&pos.bucket, &marker).await
    }

    /// Access check. Directories may exist only as a prefix of deeper keys,
    /// so a listing under the key that survives the segment-aligned check
    /// grants access.
    pub async fn access(&self, path: &str) -> Result<()> {
        let pos = parse(path);
        if pos.is_mount_root() {
            return Ok(());
        }
        if pos.is_bucket_root() {
            return if self.client.exists_bucket(&pos.bucket).await? {
                Ok(())
            } else {
                Err(FsError::NotFound)
            };
        }
        let listing = self.client.list(&pos.bucket, &pos.key).await?;
        if listing.is_empty() {
            return Err(FsError::NotFound);
        }
        let exact = listing[0].key == pos.key
            || listing[0].key.trim_end_matches(SEPARATOR) == pos.key;
        let keys: Vec<&str> = listing.iter().map(|o| o.key.as_str()).collect();
        if exact || path::can_access(&keys, &pos.key) {
            Ok(())
        } else {
            Err(FsError::NotFound)
        }
    }

    /// Timestamp updates succeed when the object exists; the store keeps no
    /// such metadata to rewrite.
    pub async fn utimens(&self, path: &str) -> Result<()> {
        let pos = parse(path);
        if pos.is_mount_root() || pos.is_bucket_root() {
            return Ok(());
        }
        if self.client.exists(&pos.bucket, &pos.key).await? {
            Ok(())
        } else {
            Err(FsError::NotFound)
        }
    }

    /// Full truncation without an open handle: the object becomes empty.
    pub async fn truncate_object(&self, path: &str) -> Result<()> {
        debug!("truncate path={path}");
        let pos = parse(path);
        if pos.is_mount_root() || pos.is_bucket_root() {
            return Err(FsError::IsDirectory);
        }
        if !self.client.exists(&pos.bucket, &pos.key).await? {
            return Err(FsError::NotFound);
        }
        self.client.put(&pos.bucket, &pos.key, &[]).await
    }
}

fn marker_key(key: &str) -> String {
    if key.ends_with(SEPARATOR) {
        key.to_string()
    } else {
        format!("{key}{SEPARATOR}")
    }
}
