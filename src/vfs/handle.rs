//! Buffered per-open-file state machine.
//!
//! Two states: `Unstaged` (initial) and `Staged` (a local temp copy of the
//! whole object exists). Reads bypass the stage and always fetch the object
//! fresh; the first write materializes the stage; flush commits it as one
//! whole-object put and returns to `Unstaged`. The staging file is a scoped
//! resource: it is removed on release, on successful flush, and on drop.

use std::os::unix::fs::FileExt;
use std::sync::Arc;

use log::debug;
use tempfile::NamedTempFile;

use crate::cadapter::client::{ObjectBackend, ObjectClient};
use crate::error::{FsError, Result};

enum Staging {
    Unstaged,
    Staged(NamedTempFile),
}

/// One open file. Owned exclusively by its open session; concurrent handles
/// on the same key are not coordinated (last flush wins).
pub struct BufferedHandle<B: ObjectBackend> {
    client: Arc<ObjectClient<B>>,
    bucket: String,
    key: String,
    staging: Staging,
}

impl<B: ObjectBackend> BufferedHandle<B> {
    pub(crate) fn new(client: Arc<ObjectClient<B>>, bucket: String, key: String) -> Self {
        Self {
            client,
            bucket,
            key,
            staging: Staging::Unstaged,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Read a slice of the object, clipped to its length. Always fetched
    /// fresh from the store; staged writes stay invisible until flush.
    pub async fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>> {
        debug!("read key={} offset={offset} len={len}", self.key);
        let data = self
            .client
            .get(&self.bucket, &self.key)
            .await?
            .ok_or(FsError::NotFound)?;
        let start = (offset as usize).min(data.len());
        let end = start.saturating_add(len).min(data.len());
        Ok(data[start..end].to_vec())
    }

    /// Write at an offset. The first write fetches the whole current object
    /// into a fresh staging file; later writes land in place, extending the
    /// file when they run past its end. Failures leave the prior state.
    pub async fn write(&mut self, data: &[u8], offset: u64) -> Result<usize> {
        debug!("write key={} offset={offset} len={}", self.key, data.len());
        match &self.staging {
            Staging::Staged(staged) => {
                staged.as_file().write_all_at(data, offset)?;
            }
            Staging::Unstaged => {
                let current = self
                    .client
                    .get(&self.bucket, &self.key)
                    .await?
                    .ok_or(FsError::NotFound)?;
                let staged = NamedTempFile::new()?;
                staged.as_file().write_all_at(&current, 0)?;
                staged.as_file().write_all_at(data, offset)?;
                // Transition only after the copy and the write both landed.
                self.staging = Staging::Staged(staged);
            }
        }
        Ok(data.len())
    }

    /// Discard any staged content and restart from an empty object image.
    /// Truncation is always to empty, whatever size the caller asked for.
    pub async fn truncate(&mut self) -> Result<()> {
        debug!("truncate key={}", self.key);
        let staged = NamedTempFile::new()?;
        self.staging = Staging::Staged(staged);
        Ok(())
    }

    /// Commit the staged content as one whole-object put. Nothing staged
    /// means nothing to do.
    pub async fn flush(&mut self) -> Result<()> {
        let Staging::Staged(staged) = &self.staging else {
            return Ok(());
        };
        debug!("flush key={}", self.key);
        let body = tokio::fs::read(staged.path()).await?;
        self.client.put(&self.bucket, &self.key, &body).await?;
        self.staging = Staging::Unstaged;
        Ok(())
    }

    /// Drop any staged content without uploading it.
    pub fn release(&mut self) {
        debug!("release key={}", self.key);
        self.staging = Staging::Unstaged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cadapter::client::ObjectClient;
    use crate::cadapter::memory::MemoryBackend;
    use crate::vfs::Vfs;

    async fn open_handle(
        seeds: &[(&str, &str, &[u8])],
        path: &str,
    ) -> BufferedHandle<MemoryBackend> {
        let backend = MemoryBackend::new();
        for (bucket, key, data) in seeds {
            backend.seed(bucket, key, data).await;
        }
        let vfs = Vfs::new(ObjectClient::new(backend));
        vfs.open(path).await.unwrap()
    }

    #[tokio::test]
    async fn test_write_then_flush_stores_exact_bytes() {
        let mut handle = open_handle(&[("bkt", "k", b"")], "bkt/k").await;
        handle.write(b"hello", 0).await.unwrap();
        handle.flush().await.unwrap();
        let stored = handle.client.get("bkt", "k").await.unwrap().unwrap();
        assert_eq!(stored, b"hello");
    }

    #[tokio::test]
    async fn test_first_write_stages_existing_content() {
        let mut handle = open_handle(&[("bkt", "k", b"0123456789")], "bkt/k").await;
        handle.write(b"AB", 2).await.unwrap();
        handle.flush().await.unwrap();
        let stored = handle.client.get("bkt", "k").await.unwrap().unwrap();
        assert_eq!(stored, b"01AB456789");
    }

    #[tokio::test]
    async fn test_write_past_end_extends_staging() {
        let mut handle = open_handle(&[("bkt", "k", b"ab")], "bkt/k").await;
        handle.write(b"Z", 4).await.unwrap();
        handle.flush().await.unwrap();
        let stored = handle.client.get("bkt", "k").await.unwrap().unwrap();
        assert_eq!(stored, b"ab\0\0Z");
    }

    #[tokio::test]
    async fn test_read_is_clipped_and_fresh() {
        let handle = open_handle(&[("bkt", "k", b"hello world")], "bkt/k").await;
        assert_eq!(handle.read(6, 100).await.unwrap(), b"world");
        assert_eq!(handle.read(100, 5).await.unwrap(), b"");
    }

    #[tokio::test]
    async fn test_read_ignores_staged_writes() {
        let mut handle = open_handle(&[("bkt", "k", b"stored")], "bkt/k").await;
        handle.write(b"staged", 0).await.unwrap();
        assert_eq!(handle.read(0, 6).await.unwrap(), b"stored");
    }

    #[tokio::test]
    async fn test_truncate_discards_previous_content() {
        let mut handle = open_handle(&[("bkt", "k", b"content")], "bkt/k").await;
        handle.write(b"xyz", 0).await.unwrap();
        handle.truncate().await.unwrap();
        handle.flush().await.unwrap();
        let stored = handle.client.get("bkt", "k").await.unwrap().unwrap();
        assert!(stored.is_empty());
    }

    #[tokio::test]
    async fn test_flush_without_writes_is_a_noop() {
        let mut handle = open_handle(&[("bkt", "k", b"keep")], "bkt/k").await;
        handle.flush().await.unwrap();
        let stored = handle.client.get("bkt", "k").await.unwrap().unwrap();
        assert_eq!(stored, b"keep");
    }

    #[tokio::test]
    async fn test_release_drops_staging_without_upload() {
        let mut handle = open_handle(&[("bkt", "k", b"keep")], "bkt/k").await;
        handle.write(b"discarded", 0).await.unwrap();
        let staged_path = match &handle.staging {
            Staging::Staged(staged) => staged.path().to_path_buf(),
            Staging::Unstaged => panic!("write should have staged"),
        };
        assert!(staged_path.exists());
        handle.release();
        assert!(!staged_path.exists());
        let stored = handle.client.get("bkt", "k").await.unwrap().unwrap();
        assert_eq!(stored, b"keep");
    }

    #[tokio::test]
    async fn test_flush_then_write_restages_from_store() {
        let mut handle = open_handle(&[("bkt", "k", b"")], "bkt/k").await;
        handle.write(b"first", 0).await.unwrap();
        handle.flush().await.unwrap();
        // Second round of writes starts from the flushed content.
        handle.write(b"F", 0).await.unwrap();
        handle.flush().await.unwrap();
        let stored = handle.client.get("bkt", "k").await.unwrap().unwrap();
        assert_eq!(stored, b"First");
    }
}
