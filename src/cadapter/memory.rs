//! In-memory object backend for tests and local development.

use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cadapter::client::{ObjectBackend, ObjectSummary};
use crate::error::BackendError;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    last_modified: SystemTime,
}

impl StoredObject {
    fn new(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
            last_modified: SystemTime::now(),
        }
    }
}

/// Map-backed store double. Keys are kept sorted per bucket, so listings
/// come back in the lexicographic order S3 guarantees.
#[derive(Default)]
pub struct MemoryBackend {
    buckets: RwLock<HashMap<String, BTreeMap<String, StoredObject>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed helper: create the bucket if needed and store an object.
    pub async fn seed(&self, bucket: &str, key: &str, data: &[u8]) {
        let mut buckets = self.buckets.write().await;
        buckets
            .entry(bucket.to_string())
            .or_default()
            .insert(key.to_string(), StoredObject::new(data));
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .map(|object| object.data.clone()))
    }

    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), BackendError> {
        let mut buckets = self.buckets.write().await;
        let Some(objects) = buckets.get_mut(bucket) else {
            return Err(format!("no such bucket: {bucket}").into());
        };
        objects.insert(key.to_string(), StoredObject::new(data));
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BackendError> {
        let mut buckets = self.buckets.write().await;
        let Some(objects) = buckets.get_mut(bucket) else {
            return Err(format!("no such bucket: {bucket}").into());
        };
        // Deleting a missing key succeeds, as it does on S3.
        objects.remove(key);
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, BackendError> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    async fn head_bucket(&self, bucket: &str) -> Result<bool, BackendError> {
        Ok(self.buckets.read().await.contains_key(bucket))
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectSummary>, BackendError> {
        let buckets = self.buckets.read().await;
        let Some(objects) = buckets.get(bucket) else {
            return Ok(Vec::new());
        };
        Ok(objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| ObjectSummary {
                key: key.clone(),
                last_modified: Some(object.last_modified),
                size: object.data.len() as u64,
            })
            .collect())
    }

    async fn list_buckets(&self) -> Result<Vec<String>, BackendError> {
        let mut names: Vec<String> = self.buckets.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(bucket) {
            return Err(format!("bucket already exists: {bucket}").into());
        }
        buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        let mut buckets = self.buckets.write().await;
        match buckets.get(bucket) {
            None => Err(format!("no such bucket: {bucket}").into()),
            Some(objects) if !objects.is_empty() => {
                Err(format!("bucket not empty: {bucket}").into())
            }
            Some(_) => {
                buckets.remove(bucket);
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listing_is_sorted_and_prefix_filtered() {
        let backend = MemoryBackend::new();
        backend.seed("bkt", "b/2", b"2").await;
        backend.seed("bkt", "a/1", b"1").await;
        backend.seed("bkt", "a/10", b"10").await;

        let listing = backend.list_objects("bkt", "a/1").await.unwrap();
        let keys: Vec<&str> = listing.iter().map(|o| o.key.as_str()).collect();
        assert_eq!(keys, ["a/1", "a/10"]);
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let backend = MemoryBackend::new();
        backend.create_bucket("b").await.unwrap();
        assert!(backend.create_bucket("b").await.is_err());

        backend.put_object("b", "k", b"data").await.unwrap();
        assert!(backend.delete_bucket("b").await.is_err());

        backend.delete_object("b", "k").await.unwrap();
        backend.delete_bucket("b").await.unwrap();
        assert!(!backend.head_bucket("b").await.unwrap());
    }
}
