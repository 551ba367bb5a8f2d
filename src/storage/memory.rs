//! In-memory object store with simulated eventual consistency
//!
//! Every write becomes visible to readers only after a configurable lag;
//! until then readers keep seeing the previous state of the key. Listings
//! and point reads have independent lags so a test can model a backend
//! whose index converges slower than its data path. Faults can be injected
//! per operation to exercise transient-error handling.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::stream;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::error::{ConsistencyError, Result};
use crate::storage::{KeyStream, ObjectMeta, ObjectStore};

/// Store operations, for fault injection and call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    List,
    Get,
    Head,
    Put,
    Delete,
}

/// Visibility lags for the in-memory store
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreConfig {
    /// Delay before GET/HEAD observe a write or delete
    pub read_lag: Duration,
    /// Delay before listings observe a write or delete
    pub list_lag: Duration,
}

impl MemoryStoreConfig {
    /// Same lag on every read path
    pub fn uniform(lag: Duration) -> Self {
        Self {
            read_lag: lag,
            list_lag: lag,
        }
    }
}

/// Latest mutation of a key together with what readers saw before it
#[derive(Debug, Clone)]
struct Entry {
    current: Option<Bytes>,
    previous: Option<Bytes>,
    changed_at: Instant,
}

impl Entry {
    fn visible(&self, lag: Duration, now: Instant) -> Option<&Bytes> {
        if now.duration_since(self.changed_at) >= lag {
            self.current.as_ref()
        } else {
            self.previous.as_ref()
        }
    }
}

#[derive(Debug, Default)]
struct OpState {
    faults: HashMap<Operation, usize>,
    calls: HashMap<Operation, usize>,
}

/// Object store held entirely in memory
pub struct MemoryStore {
    bucket: String,
    config: MemoryStoreConfig,
    objects: DashMap<String, Entry>,
    ops: Mutex<OpState>,
}

impl MemoryStore {
    /// Strongly consistent store (zero lag)
    pub fn new(bucket: impl Into<String>) -> Self {
        Self::with_config(bucket, MemoryStoreConfig::default())
    }

    /// Store with the given visibility lags
    pub fn with_config(bucket: impl Into<String>, config: MemoryStoreConfig) -> Self {
        Self {
            bucket: bucket.into(),
            config,
            objects: DashMap::new(),
            ops: Mutex::new(OpState::default()),
        }
    }

    /// Make the next `count` calls of `op` fail with a transient backend error
    pub fn fail_next(&self, op: Operation, count: usize) {
        *self.ops.lock().faults.entry(op).or_insert(0) += count;
    }

    /// Number of times `op` has been called
    pub fn call_count(&self, op: Operation) -> usize {
        self.ops.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Record a call and consume an injected fault if one is pending
    fn enter(&self, op: Operation, key: &str) -> Result<()> {
        let mut ops = self.ops.lock();
        *ops.calls.entry(op).or_insert(0) += 1;

        if let Some(remaining) = ops.faults.get_mut(&op) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ConsistencyError::Backend(format!(
                    "injected {:?} fault for '{}'",
                    op, key
                )));
            }
        }
        Ok(())
    }

    fn mutate(&self, key: &str, data: Option<Bytes>) {
        let now = Instant::now();
        let settle_lag = self.config.read_lag.max(self.config.list_lag);

        self.objects
            .entry(key.to_string())
            .and_modify(|entry| {
                // The slowest reader's current view becomes the fallback
                let previous = entry.visible(settle_lag, now).cloned();
                entry.previous = previous;
                entry.current = data.clone();
                entry.changed_at = now;
            })
            .or_insert_with(|| Entry {
                current: data.clone(),
                previous: None,
                changed_at: now,
            });
    }

    fn read(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        self.objects
            .get(key)
            .and_then(|entry| entry.visible(self.config.read_lag, now).cloned())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn list_keys(&self, prefix: &str) -> KeyStream {
        if let Err(e) = self.enter(Operation::List, prefix) {
            return Box::pin(stream::iter(vec![Err::<String, _>(e)]));
        }

        let now = Instant::now();
        let mut keys: Vec<String> = self
            .objects
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .filter(|entry| entry.value().visible(self.config.list_lag, now).is_some())
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();

        trace!("list_keys: prefix={} visible={}", prefix, keys.len());
        Box::pin(stream::iter(keys.into_iter().map(Ok::<_, ConsistencyError>)))
    }

    async fn get_object(&self, key: &str) -> Result<Bytes> {
        self.enter(Operation::Get, key)?;
        self.read(key)
            .ok_or_else(|| ConsistencyError::NotFound(key.to_string()))
    }

    async fn head_object(&self, key: &str) -> Result<ObjectMeta> {
        self.enter(Operation::Head, key)?;
        let data = self
            .read(key)
            .ok_or_else(|| ConsistencyError::NotFound(key.to_string()))?;

        Ok(ObjectMeta {
            key: key.to_string(),
            size: data.len() as u64,
            etag: None,
        })
    }

    async fn put_object(&self, key: &str, data: Bytes) -> Result<()> {
        self.enter(Operation::Put, key)?;
        self.mutate(key, Some(data));
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.enter(Operation::Delete, key)?;
        if self.objects.contains_key(key) {
            self.mutate(key, None);
        }
        Ok(())
    }
}
