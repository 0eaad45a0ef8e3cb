//! Backend trait and the cache-backed store client.
//!
//! `ObjectClient` is the one type the filesystem core talks to. It wraps a
//! backend with the metadata cache, invalidates structurally on every
//! mutation, and folds backend failures into [`FsError::Io`]. Absence is
//! data here (`None`, `false`, an empty listing), never an error.

use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;

use crate::error::{BackendError, FsError, Result};
use crate::meta::cache::{CacheConfig, MetaCache};

/// One entry of a key listing. A key ending in the path separator denotes a
/// directory marker, otherwise the object is a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub last_modified: Option<SystemTime>,
    pub size: u64,
}

/// Whole-object operations a store must offer. Implementations own the wire
/// (auth, retries, TLS); nothing above this trait retries.
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Fetch a whole object; `None` when the key does not exist.
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> std::result::Result<Option<Vec<u8>>, BackendError>;

    /// Store a whole object, replacing any previous content.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        data: &[u8],
    ) -> std::result::Result<(), BackendError>;

    async fn delete_object(&self, bucket: &str, key: &str)
    -> std::result::Result<(), BackendError>;

    async fn head_object(&self, bucket: &str, key: &str)
    -> std::result::Result<bool, BackendError>;

    async fn head_bucket(&self, bucket: &str) -> std::result::Result<bool, BackendError>;

    /// Keys under a prefix in lexicographic order.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> std::result::Result<Vec<ObjectSummary>, BackendError>;

    async fn list_buckets(&self) -> std::result::Result<Vec<String>, BackendError>;

    async fn create_bucket(&self, bucket: &str) -> std::result::Result<(), BackendError>;

    async fn delete_bucket(&self, bucket: &str) -> std::result::Result<(), BackendError>;
}

/// Cache-backed facade over an [`ObjectBackend`].
pub struct ObjectClient<B: ObjectBackend> {
    backend: B,
    cache: MetaCache,
}

impl<B: ObjectBackend> ObjectClient<B> {
    pub fn new(backend: B) -> Self {
        Self::with_cache(backend, CacheConfig::default())
    }

    pub fn with_cache(backend: B, config: CacheConfig) -> Self {
        Self {
            backend,
            cache: MetaCache::new(config),
        }
    }

    pub async fn get(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        self.backend.get_object(bucket, key).await.map_err(FsError::Io)
    }

    pub async fn put(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        self.backend
            .put_object(bucket, key, data)
            .await
            .map_err(FsError::Io)?;
        self.cache.invalidate_key(bucket, key).await;
        Ok(())
    }

    pub async fn delete(&self, bucket: &str, key: &str) -> Result<()> {
        self.backend
            .delete_object(bucket, key)
            .await
            .map_err(FsError::Io)?;
        self.cache.invalidate_key(bucket, key).await;
        Ok(())
    }

    /// Exact-key existence. Uncached: callers use it as a pre-mutation
    /// check, where a stale answer is worse than a head per call.
    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        self.backend.head_object(bucket, key).await.map_err(FsError::Io)
    }

    pub async fn exists_bucket(&self, bucket: &str) -> Result<bool> {
        if let Some(hit) = self.cache.bucket_exists(bucket).await {
            return Ok(hit);
        }
        let exists = self
            .backend
            .head_bucket(bucket)
            .await
            .map_err(FsError::Io)?;
        self.cache.store_bucket_exists(bucket, exists).await;
        Ok(exists)
    }

    /// Listing under a prefix, read-through cached. Two concurrent misses
    /// may both hit the store; the later insert wins, which is harmless.
    pub async fn list(&self, bucket: &str, prefix: &str) -> Result<Arc<Vec<ObjectSummary>>> {
        if let Some(hit) = self.cache.listing(bucket, prefix).await {
            return Ok(hit);
        }
        let listing = Arc::new(
            self.backend
                .list_objects(bucket, prefix)
                .await
                .map_err(FsError::Io)?,
        );
        self.cache.store_listing(bucket, prefix, listing.clone()).await;
        Ok(listing)
    }

    pub async fn list_buckets(&self) -> Result<Arc<Vec<String>>> {
        if let Some(hit) = self.cache.bucket_names().await {
            return Ok(hit);
        }
        let names = Arc::new(self.backend.list_buckets().await.map_err(FsError::Io)?);
        self.cache.store_bucket_names(names.clone()).await;
        Ok(names)
    }

    pub async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.backend
            .create_bucket(bucket)
            .await
            .map_err(FsError::Io)?;
        self.cache.invalidate_bucket(bucket).await;
        Ok(())
    }

    pub async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.backend
            .delete_bucket(bucket)
            .await
            .map_err(FsError::Io)?;
        self.cache.invalidate_bucket(bucket).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cadapter::memory::MemoryBackend;

    /// Counts store round-trips so tests can observe cache behavior.
    struct CountingBackend {
        inner: MemoryBackend,
        lists: AtomicUsize,
        bucket_heads: AtomicUsize,
    }

    impl CountingBackend {
        fn new(inner: MemoryBackend) -> Self {
            Self {
                inner,
                lists: AtomicUsize::new(0),
                bucket_heads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ObjectBackend for CountingBackend {
        async fn get_object(
            &self,
            bucket: &str,
            key: &str,
        ) -> std::result::Result<Option<Vec<u8>>, BackendError> {
            self.inner.get_object(bucket, key).await
        }

        async fn put_object(
            &self,
            bucket: &str,
            key: &str,
            data: &[u8],
        ) -> std::result::Result<(), BackendError> {
            self.inner.put_object(bucket, key, data).await
        }

        async fn delete_object(
            &self,
            bucket: &str,
            key: &str,
        ) -> std::result::Result<(), BackendError> {
            self.inner.delete_object(bucket, key).await
        }

        async fn head_object(
            &self,
            bucket: &str,
            key: &str,
        ) -> std::result::Result<bool, BackendError> {
            self.inner.head_object(bucket, key).await
        }

        async fn head_bucket(&self, bucket: &str) -> std::result::Result<bool, BackendError> {
            self.bucket_heads.fetch_add(1, Ordering::SeqCst);
            self.inner.head_bucket(bucket).await
        }

        async fn list_objects(
            &self,
            bucket: &str,
            prefix: &str,
        ) -> std::result::Result<Vec<ObjectSummary>, BackendError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            self.inner.list_objects(bucket, prefix).await
        }

        async fn list_buckets(&self) -> std::result::Result<Vec<String>, BackendError> {
            self.inner.list_buckets().await
        }

        async fn create_bucket(&self, bucket: &str) -> std::result::Result<(), BackendError> {
            self.inner.create_bucket(bucket).await
        }

        async fn delete_bucket(&self, bucket: &str) -> std::result::Result<(), BackendError> {
            self.inner.delete_bucket(bucket).await
        }
    }

    async fn seeded_client() -> ObjectClient<CountingBackend> {
        let backend = MemoryBackend::new();
        backend.seed("bkt", "a/b/1.txt", b"one").await;
        ObjectClient::new(CountingBackend::new(backend))
    }

    #[tokio::test]
    async fn test_list_is_cached_until_put_invalidates() {
        let client = seeded_client().await;

        let first = client.list("bkt", "a/b").await.unwrap();
        assert_eq!(first.len(), 1);
        let _ = client.list("bkt", "a/b").await.unwrap();
        assert_eq!(client.backend.lists.load(Ordering::SeqCst), 1);

        // A write below the prefix must refresh the parent listing.
        client.put("bkt", "a/b/c", b"new").await.unwrap();
        let after = client.list("bkt", "a/b").await.unwrap();
        assert_eq!(client.backend.lists.load(Ordering::SeqCst), 2);
        assert!(after.iter().any(|o| o.key == "a/b/c"));
    }

    #[tokio::test]
    async fn test_delete_invalidates_ancestor_listings() {
        let client = seeded_client().await;

        let _ = client.list("bkt", "").await.unwrap();
        client.delete("bkt", "a/b/1.txt").await.unwrap();
        let root = client.list("bkt", "").await.unwrap();
        assert!(root.is_empty());
    }

    #[tokio::test]
    async fn test_bucket_existence_is_cached() {
        let client = seeded_client().await;

        assert!(client.exists_bucket("bkt").await.unwrap());
        assert!(client.exists_bucket("bkt").await.unwrap());
        assert_eq!(client.backend.bucket_heads.load(Ordering::SeqCst), 1);

        assert!(!client.exists_bucket("nope").await.unwrap());
        assert_eq!(client.backend.bucket_heads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bucket_create_refreshes_bucket_set() {
        let client = seeded_client().await;

        let names = client.list_buckets().await.unwrap();
        assert_eq!(names.as_slice(), ["bkt"]);

        client.create_bucket("fresh").await.unwrap();
        let names = client.list_buckets().await.unwrap();
        assert!(names.contains(&"fresh".to_string()));
    }
}
