//! One-level directory enumeration from flat key listings.

use std::collections::BTreeMap;

use log::debug;

use crate::cadapter::client::ObjectBackend;
use crate::error::Result;
use crate::vfs::attr::FileKind;
use crate::vfs::path::{SEPARATOR, most_parent_path, next_parent_path, parse};
use crate::vfs::{Vfs, path_ino};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub ino: u64,
    pub kind: FileKind,
}

impl<B: ObjectBackend> Vfs<B> {
    /// List the immediate children of a directory path.
    ///
    /// Every synthesized entry is a directory: any listed key with more
    /// segments than the prefix marks a directory boundary, and an exact
    /// file match contributes no extra segment to surface. Many keys share
    /// one immediate child; duplicates merge silently.
    pub async fn list_children(&self, path: &str) -> Result<Vec<DirEntry>> {
        let pos = parse(path);
        debug!("readdir path={path}");

        if pos.is_mount_root() {
            let buckets = self.client().list_buckets().await?;
            return Ok(buckets
                .iter()
                .map(|name| DirEntry {
                    name: name.clone(),
                    ino: path_ino(name),
                    kind: FileKind::Directory,
                })
                .collect());
        }

        let listing = self.client().list(&pos.bucket, &pos.key).await?;

        let mut children: BTreeMap<String, DirEntry> = BTreeMap::new();
        for object in listing.iter() {
            let child = if pos.is_bucket_root() {
                most_parent_path(&object.key)
            } else {
                next_parent_path(&object.key, &pos.key)
            };
            if child.is_empty() {
                continue;
            }
            let child_path = join_child(&pos.original_path, child);
            children.entry(child.to_string()).or_insert_with(|| DirEntry {
                name: child.to_string(),
                ino: path_ino(&child_path),
                kind: FileKind::Directory,
            });
        }
        Ok(children.into_values().collect())
    }
}

fn join_child(parent: &str, child: &str) -> String {
    let trimmed = parent.trim_end_matches(SEPARATOR);
    if trimmed.is_empty() {
        child.to_string()
    } else {
        format!("{trimmed}{SEPARATOR}{child}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadapter::client::ObjectClient;
    use crate::cadapter::memory::MemoryBackend;

    async fn vfs_with(seeds: &[(&str, &str)]) -> Vfs<MemoryBackend> {
        let backend = MemoryBackend::new();
        for (bucket, key) in seeds {
            backend.seed(bucket, key, b"x").await;
        }
        Vfs::new(ObjectClient::new(backend))
    }

    fn names(entries: &[DirEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_mount_root_lists_buckets() {
        let vfs = vfs_with(&[("b1", "k"), ("b2", "k")]).await;
        let entries = vfs.list_children("").await.unwrap();
        assert_eq!(names(&entries), ["b1", "b2"]);
        assert!(entries.iter().all(|e| e.kind == FileKind::Directory));
    }

    #[tokio::test]
    async fn test_bucket_root_children_deduplicated() {
        let vfs = vfs_with(&[
            ("bkt", "docs/a.txt"),
            ("bkt", "docs/b.txt"),
            ("bkt", "logs/2024/x.log"),
            ("bkt", "top.txt"),
        ])
        .await;
        let entries = vfs.list_children("bkt").await.unwrap();
        assert_eq!(names(&entries), ["docs", "logs", "top.txt"]);
    }

    #[tokio::test]
    async fn test_nested_prefix_children() {
        let vfs = vfs_with(&[
            ("bkt", "a/b/one.txt"),
            ("bkt", "a/b/two/three.txt"),
            ("bkt", "a/c/other.txt"),
        ])
        .await;
        let entries = vfs.list_children("bkt/a/b").await.unwrap();
        assert_eq!(names(&entries), ["one.txt", "two"]);
    }

    #[tokio::test]
    async fn test_exact_file_match_surfaces_no_child() {
        let vfs = vfs_with(&[("bkt", "a/file.txt")]).await;
        let entries = vfs.list_children("bkt/a/file.txt").await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_child_identity_matches_lookup_path() {
        let vfs = vfs_with(&[("bkt", "a/b/c.txt")]).await;
        let entries = vfs.list_children("bkt/a").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].ino, path_ino("bkt/a/b"));
    }
}
