//! S3 object store
//!
//! Works against Amazon S3 or S3-compatible backends (MinIO, LocalStack, etc.).

use async_stream::try_stream;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::config::StorageConfig;
use crate::error::{ConsistencyError, Result};
use crate::storage::{KeyStream, ObjectMeta, ObjectStore};

const HTTP_NOT_FOUND: u16 = 404;
const NO_SUCH_KEY: &str = "NoSuchKey";
const NO_SUCH_BUCKET: &str = "NoSuchBucket";

/// Does a failed GET mean the key is missing?
///
/// The error code wins over the status: a 404 `NoSuchBucket` says nothing
/// about the key. A bare 404 without a code counts as a missing key.
fn get_means_missing_key(code: Option<&str>, status: Option<u16>) -> bool {
    match code {
        Some(NO_SUCH_KEY) => true,
        Some(NO_SUCH_BUCKET) => false,
        _ => status == Some(HTTP_NOT_FOUND),
    }
}

/// S3 object store bound to one bucket
pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    /// Create a new S3 store from configuration
    pub async fn new(config: &StorageConfig) -> Result<Self> {
        let mut sdk_config_builder = aws_config::defaults(BehaviorVersion::latest());

        if let Some(region) = &config.region {
            sdk_config_builder = sdk_config_builder.region(Region::new(region.clone()));
        }

        if let Some(profile) = &config.profile {
            sdk_config_builder = sdk_config_builder.profile_name(profile);
        }

        let sdk_config = sdk_config_builder.load().await;

        let mut s3_config_builder = aws_sdk_s3::config::Builder::from(&sdk_config)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(config.request_timeout)
                    .build(),
            );

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            s3_config_builder = s3_config_builder.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "s3-consistency-config",
            ));
        }

        let client = Client::from_conf(s3_config_builder.build());

        Ok(Self::from_client(client, config.bucket.clone()))
    }

    /// Wrap an already configured client
    pub fn from_client(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn list_keys(&self, prefix: &str) -> KeyStream {
        let client = self.client.clone();
        let bucket = self.bucket.clone();
        let prefix = prefix.to_string();

        Box::pin(try_stream! {
            let mut continuation_token: Option<String> = None;

            loop {
                let mut request = client
                    .list_objects_v2()
                    .bucket(&bucket)
                    .prefix(&prefix);

                if let Some(token) = continuation_token.take() {
                    request = request.continuation_token(token);
                }

                let result = request.send().await.map_err(|e| {
                    let service_error = e.into_service_error();
                    ConsistencyError::Backend(format!(
                        "S3 ListObjectsV2 error for prefix '{}': {:?}",
                        prefix, service_error
                    ))
                })?;

                trace!(
                    "list_keys: prefix={} page_keys={}",
                    prefix,
                    result.contents().len()
                );

                for obj in result.contents() {
                    if let Some(key) = obj.key() {
                        yield key.to_string();
                    }
                }

                if result.is_truncated().unwrap_or(false) {
                    continuation_token = result.next_continuation_token().map(|s| s.to_string());
                    if continuation_token.is_none() {
                        Err::<(), _>(ConsistencyError::Backend(format!(
                            "S3 ListObjectsV2 for prefix '{}' truncated without a continuation token",
                            prefix
                        )))?;
                    }
                } else {
                    break;
                }
            }
        })
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        trace!("get_object: bucket={} key={}", self.bucket, key);

        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let status = e.raw_response().map(|r| r.status().as_u16());
                let service_error = e.into_service_error();
                if service_error.is_no_such_key()
                    || get_means_missing_key(service_error.code(), status)
                {
                    ConsistencyError::NotFound(key.to_string())
                } else {
                    ConsistencyError::Backend(format!("S3 GetObject error: {}", service_error))
                }
            })?;

        let body = result
            .body
            .collect()
            .await
            .map_err(|e| ConsistencyError::Backend(format!("S3 read body error: {}", e)))?;

        Ok(body.into_bytes())
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMeta> {
        trace!("head_object: bucket={} key={}", self.bucket, key);

        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let status = e.raw_response().map(|r| r.status().as_u16());
                let service_error = e.into_service_error();
                // HEAD replies carry no body, hence no error code: a missing
                // bucket is indistinguishable from a missing key here
                if service_error.is_not_found() || status == Some(HTTP_NOT_FOUND) {
                    ConsistencyError::NotFound(key.to_string())
                } else {
                    ConsistencyError::Backend(format!("S3 HeadObject error: {}", service_error))
                }
            })?;

        Ok(ObjectMeta {
            key: key.to_string(),
            size: output.content_length().unwrap_or(0).max(0) as u64,
            etag: output.e_tag().map(|s| s.to_string()),
        })
    }

    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        debug!("put_object: key={} size={}", key, data.len());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| ConsistencyError::Backend(format!("S3 PutObject error: {}", e)))?;

        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        debug!("delete_object: key={}", key);

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| ConsistencyError::Backend(format!("S3 DeleteObject error: {}", e)))?;

        Ok(())
    }
}
