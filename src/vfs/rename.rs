//! Rename as copy-then-delete over the flat key space.

use log::debug;

use crate::cadapter::client::ObjectBackend;
use crate::error::{FsError, Result};
use crate::vfs::Vfs;
use crate::vfs::path::{Address, SEPARATOR, parse};

/// One object relocation. Transient; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    pub source_bucket: String,
    pub source_key: String,
    pub dest_bucket: String,
    pub dest_key: String,
}

impl Move {
    pub fn new(source: &Address, dest: &Address) -> Self {
        Self {
            source_bucket: source.bucket.clone(),
            source_key: source.key.clone(),
            dest_bucket: dest.bucket.clone(),
            dest_key: dest.key.clone(),
        }
    }
}

impl<B: ObjectBackend> Vfs<B> {
    /// Rename `old_path` to `new_path`: get→put→delete per object, whole
    /// subtree when the source exists only as a prefix. Multi-object moves
    /// have no rollback; a mid-sequence failure leaves the move
    /// half-applied and surfaces as an i/o error.
    pub async fn rename(&self, old_path: &str, new_path: &str) -> Result<()> {
        debug!("rename old={old_path} new={new_path}");
        let source = parse(old_path);
        let dest = parse(new_path);
        if source.is_mount_root()
            || source.is_bucket_root()
            || dest.is_mount_root()
            || dest.is_bucket_root()
        {
            return Err(FsError::PermissionDenied);
        }

        if self.client().exists(&source.bucket, &source.key).await? {
            return self.move_object(&Move::new(&source, &dest)).await;
        }

        // No exact object; the source may be a directory. Search one level
        // down with the separator appended.
        let prefix = format!("{}{}", source.key, SEPARATOR);
        let listing = self.client().list(&source.bucket, &prefix).await?;
        if listing.is_empty() {
            return Err(FsError::NotFound);
        }

        let moves: Vec<Move> = listing
            .iter()
            .map(|object| Move {
                source_bucket: source.bucket.clone(),
                source_key: object.key.clone(),
                dest_bucket: dest.bucket.clone(),
                dest_key: substitute_prefix(&object.key, &source.key, &dest.key),
            })
            .collect();

        for relocation in &moves {
            self.move_object(relocation).await?;
        }
        Ok(())
    }

    async fn move_object(&self, relocation: &Move) -> Result<()> {
        let body = self
            .client()
            .get(&relocation.source_bucket, &relocation.source_key)
            .await?
            .ok_or(FsError::NotFound)?;
        self.client()
            .put(&relocation.dest_bucket, &relocation.dest_key, &body)
            .await?;
        self.client()
            .delete(&relocation.source_bucket, &relocation.source_key)
            .await
    }
}

fn substitute_prefix(key: &str, source_prefix: &str, dest_prefix: &str) -> String {
    match key.strip_prefix(source_prefix) {
        Some(rest) => format!("{dest_prefix}{rest}"),
        None => key.to_string(),
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
    async fn test_single_object_move() {
        let vfs = vfs_with(&[("bkt", "old.txt", b"payload")]).await;
        vfs.rename("bkt/old.txt", "bkt/new.txt").await.unwrap();

        assert!(!vfs.client().exists("bkt", "old.txt").await.unwrap());
        let moved = vfs.client().get("bkt", "new.txt").await.unwrap().unwrap();
        assert_eq!(moved, b"payload");
    }

    #[tokio::test]
    async fn test_move_across_buckets() {
        let vfs = vfs_with(&[("src-bkt", "k", b"x"), ("dst-bkt", "seed", b"")]).await;
        vfs.rename("src-bkt/k", "dst-bkt/k2").await.unwrap();
        assert!(vfs.client().exists("dst-bkt", "k2").await.unwrap());
        assert!(!vfs.client().exists("src-bkt", "k").await.unwrap());
    }

    #[tokio::test]
    async fn test_subtree_move_relocates_every_key() {
        let vfs = vfs_with(&[
            ("bkt", "src/a.txt", b"a"),
            ("bkt", "src/deep/b.txt", b"b"),
            ("bkt", "srcother/c.txt", b"c"),
        ])
        .await;

        vfs.rename("bkt/src", "bkt/dst").await.unwrap();

        let remaining = vfs.client().list("bkt", "src/").await.unwrap();
        assert!(remaining.is_empty());
        assert_eq!(
            vfs.client().get("bkt", "dst/a.txt").await.unwrap().unwrap(),
            b"a"
        );
        assert_eq!(
            vfs.client()
                .get("bkt", "dst/deep/b.txt")
                .await
                .unwrap()
                .unwrap(),
            b"b"
        );
        // A sibling that merely shares the string prefix is untouched.
        assert!(vfs.client().exists("bkt", "srcother/c.txt").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_missing_source_is_not_found() {
        let vfs = vfs_with(&[("bkt", "seed", b"")]).await;
        assert!(matches!(
            vfs.rename("bkt/nope", "bkt/other").await,
            Err(FsError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_roots_are_refused() {
        let vfs = vfs_with(&[("bkt", "k", b"x")]).await;
        for (old, new) in [("", "bkt/k2"), ("bkt", "bkt2"), ("bkt/k", ""), ("bkt/k", "bkt2")] {
            assert!(matches!(
                vfs.rename(old, new).await,
                Err(FsError::PermissionDenied)
            ));
        }
    }
}
