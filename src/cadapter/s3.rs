//! S3 adapter: aws-sdk-s3 implementation of the object backend.
//!
//! Wire-level concerns live here — credentials, endpoint, path-style
//! addressing, Content-MD5 on upload, bounded retry with backoff. The
//! filesystem core above never retries; absence comes back as `None`,
//! `false`, or an empty listing.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::DateTime;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use tokio::time::sleep;

use crate::cadapter::client::{ObjectBackend, ObjectSummary};
use crate::error::BackendError;

/// Connection options for an S3-compatible endpoint.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    /// Maximum retry count for mutating calls.
    pub max_retries: u32,
    /// Initial retry delay (milliseconds), doubled per attempt.
    pub initial_retry_delay_ms: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4566".to_string(),
            region: "ap-northeast-1".to_string(),
            max_retries: 3,
            initial_retry_delay_ms: 100,
        }
    }
}

pub struct S3Backend {
    client: Client,
    config: S3Config,
}

impl S3Backend {
    pub async fn new(config: S3Config) -> Self {
        let conf = aws_config::ConfigLoader::default()
            .credentials_provider(
                aws_config::environment::EnvironmentVariableCredentialsProvider::new(),
            )
            .region(aws_config::Region::new(config.region.clone()))
            .endpoint_url(&config.endpoint)
            .load()
            .await;
        // Path-style addressing: bucket names go into the URL path, which is
        // what LocalStack/MinIO-style endpoints resolve.
        let s3_conf = aws_sdk_s3::config::Builder::from(&conf)
            .force_path_style(true)
            .build();
        Self {
            client: Client::from_conf(s3_conf),
            config,
        }
    }

    fn md5_base64(data: &[u8]) -> String {
        let sum = md5::compute(data);
        B64.encode(sum.0)
    }

    async fn execute_with_retry<T, F, Fut, E>(
        &self,
        operation: F,
        operation_name: &'static str,
    ) -> Result<T, BackendError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        let mut attempt = 0;
        let max_retries = self.config.max_retries;
        loop {
            attempt += 1;
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if attempt > max_retries {
                        return Err(Box::new(std::io::Error::other(format!(
                            "{operation_name} failed after {max_retries} attempts: {e}"
                        ))));
                    }
                    let delay_ms = self.config.initial_retry_delay_ms * 2u64.pow(attempt - 1);
                    sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }
}

fn to_system_time(datetime: &DateTime) -> Option<SystemTime> {
    let secs = datetime.secs();
    if secs < 0 {
        return None;
    }
    Some(SystemTime::UNIX_EPOCH + Duration::new(secs as u64, datetime.subsec_nanos()))
}

#[async_trait]
impl ObjectBackend for S3Backend {
    async fn get_object(
        &self,
        bucket: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, BackendError> {
        let resp = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await;
        match resp {
            Ok(output) => {
                use tokio::io::AsyncReadExt;
                let mut body = output.body.into_async_read();
                let mut buf = Vec::new();
                body.read_to_end(&mut buf).await?;
                Ok(Some(buf))
            }
            Err(err) => {
                let service = err.into_service_error();
                if service.is_no_such_key() {
                    Ok(None)
                } else {
                    Err(Box::new(service))
                }
            }
        }
    }

    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), BackendError> {
        let checksum = Self::md5_base64(data);
        let operation = || async {
            self.client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_md5(checksum.clone())
                .body(data.to_owned().into())
                .send()
                .await
        };
        self.execute_with_retry(operation, "put_object").await?;
        Ok(())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BackendError> {
        let operation = || async {
            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
        };
        self.execute_with_retry(operation, "delete_object").await?;
        Ok(())
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<bool, BackendError> {
        let resp = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await;
        match resp {
            Ok(_) => Ok(true),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(Box::new(service))
                }
            }
        }
    }

    async fn head_bucket(&self, bucket: &str) -> Result<bool, BackendError> {
        let resp = self.client.head_bucket().bucket(bucket).send().await;
        match resp {
            Ok(_) => Ok(true),
            Err(err) => {
                let service = err.into_service_error();
                if service.is_not_found() {
                    Ok(false)
                } else {
                    Err(Box::new(service))
                }
            }
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ObjectSummary>, BackendError> {
        let mut summaries = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(token) = &continuation {
                req = req.continuation_token(token);
            }
            let page = req
                .send()
                .await
                .map_err(|err| Box::new(err.into_service_error()) as BackendError)?;
            for object in page.contents() {
                summaries.push(ObjectSummary {
                    key: object.key().unwrap_or_default().to_string(),
                    last_modified: object.last_modified().and_then(to_system_time),
                    size: object.size().unwrap_or(0).max(0) as u64,
                });
            }
            match page.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => return Ok(summaries),
            }
        }
    }

    async fn list_buckets(&self) -> Result<Vec<String>, BackendError> {
        let output = self
            .client
            .list_buckets()
            .send()
            .await
            .map_err(|err| Box::new(err.into_service_error()) as BackendError)?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| bucket.name().map(String::from))
            .collect())
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        let operation = || async {
            let mut req = self.client.create_bucket().bucket(bucket);
            // us-east-1 is the one region S3 rejects as an explicit
            // location constraint.
            if self.config.region != "us-east-1" {
                let constraint = BucketLocationConstraint::from(self.config.region.as_str());
                req = req.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(constraint)
                        .build(),
                );
            }
            req.send().await
        };
        self.execute_with_retry(operation, "create_bucket").await?;
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), BackendError> {
        let operation = || async { self.client.delete_bucket().bucket(bucket).send().await };
        self.execute_with_retry(operation, "delete_bucket").await?;
        Ok(())
    }
}
