//! Storage client abstraction consumed by the probes
//!
//! Implementations are responsible for classifying backend failures:
//! a missing object must surface as [`ConsistencyError::NotFound`](crate::error::ConsistencyError::NotFound), anything
//! else (timeouts, throttling, 5xx, malformed replies) as a transient error.

pub mod memory;
pub mod s3;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, TryStreamExt};

use crate::error::Result;

/// Metadata returned by a HEAD request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub etag: Option<String>,
}

/// Stream of object keys, one page at a time under the hood
pub type KeyStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Object store operations used by probes and workload fixtures.
///
/// A store is bound to a single bucket. All methods must be safe to call
/// concurrently from many tasks.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket this store operates on
    fn bucket(&self) -> &str;

    /// List every key under `prefix`, following pagination
    fn list_keys(&self, prefix: &str) -> KeyStream;

    /// Fetch a whole object
    async fn get_object(&self, key: &str) -> Result<Bytes>;

    /// Fetch object metadata without the body
    async fn head_object(&self, key: &str) -> Result<ObjectMeta>;

    /// Write an object, replacing any previous version
    async fn put_object(&self, key: &str, data: Bytes) -> Result<()>;

    /// Delete an object. Deleting a missing key is not an error.
    async fn delete_object(&self, key: &str) -> Result<()>;
}

/// Drain a listing into a vector of keys
pub async fn collect_keys(store: &dyn ObjectStore, prefix: &str) -> Result<Vec<String>> {
    store.list_keys(prefix).try_collect().await
}
