//! TTL-bounded metadata cache with structural invalidation.
//!
//! Three independent domains: key listings, bucket existence, and the
//! bucket-name set. Listings churn with every write and get a short window;
//! buckets rarely change and keep a longer one. Mutations invalidate every
//! ancestor prefix of the touched key so parent listings never outlive a
//! child write. Store errors are never cached.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::cadapter::client::ObjectSummary;
use crate::vfs::path::dir_combination;

/// Freshness windows and capacity for the cache domains.
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    pub listing_ttl: Duration,
    pub bucket_ttl: Duration,
    pub capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            listing_ttl: Duration::from_secs(5),
            bucket_ttl: Duration::from_secs(60),
            capacity: 10_000,
        }
    }
}

pub struct MetaCache {
    listings: Cache<(String, String), Arc<Vec<ObjectSummary>>>,
    bucket_exists: Cache<String, bool>,
    buckets: Cache<(), Arc<Vec<String>>>,
}

impl MetaCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            listings: Cache::builder()
                .max_capacity(config.capacity)
                .time_to_live(config.listing_ttl)
                .build(),
            bucket_exists: Cache::builder()
                .max_capacity(config.capacity)
                .time_to_live(config.bucket_ttl)
                .build(),
            buckets: Cache::builder()
                .max_capacity(1)
                .time_to_live(config.bucket_ttl)
                .build(),
        }
    }

    pub async fn listing(&self, bucket: &str, prefix: &str) -> Option<Arc<Vec<ObjectSummary>>> {
        self.listings
            .get(&(bucket.to_string(), prefix.to_string()))
            .await
    }

    pub async fn store_listing(
        &self,
        bucket: &str,
        prefix: &str,
        listing: Arc<Vec<ObjectSummary>>,
    ) {
        self.listings
            .insert((bucket.to_string(), prefix.to_string()), listing)
            .await;
    }

    pub async fn bucket_exists(&self, bucket: &str) -> Option<bool> {
        self.bucket_exists.get(bucket).await
    }

    pub async fn store_bucket_exists(&self, bucket: &str, exists: bool) {
        self.bucket_exists.insert(bucket.to_string(), exists).await;
    }

    pub async fn bucket_names(&self) -> Option<Arc<Vec<String>>> {
        self.buckets.get(&()).await
    }

    pub async fn store_bucket_names(&self, names: Arc<Vec<String>>) {
        self.buckets.insert((), names).await;
    }

    /// Drop every listing whose prefix is an ancestor of (or equal to) the
    /// mutated key. Listings are cached under both bare and
    /// trailing-separator spellings of a prefix, so both are dropped.
    /// Idempotent; may race with a concurrent populate (see module docs).
    pub async fn invalidate_key(&self, bucket: &str, key: &str) {
        for prefix in dir_combination(key) {
            self.listings
                .invalidate(&(bucket.to_string(), format!("{prefix}/")))
                .await;
            self.listings.invalidate(&(bucket.to_string(), prefix)).await;
        }
    }

    /// Bucket create/delete: drop the bucket-name set and the bucket's
    /// existence entry.
    pub async fn invalidate_bucket(&self, bucket: &str) {
        self.buckets.invalidate(&()).await;
        self.bucket_exists.invalidate(bucket).await;
    }
}

impl Default for MetaCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
