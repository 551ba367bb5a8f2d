//! Workload fixtures: populate and clear a prefix with numbered objects

use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};
use tracing::{debug, info};

use crate::error::{ConsistencyError, Result};
use crate::storage::ObjectStore;

/// Key of the `index`-th workload object (1-based)
pub fn object_key(prefix: &str, index: usize) -> String {
    format!("{}arquivo_{}.txt", prefix, index)
}

fn object_body(index: usize) -> Bytes {
    Bytes::from(format!("consistency probe object {}\n", index))
}

/// Upload `quantity` objects under `prefix` with at most `workers` puts in
/// flight. Returns the keys in index order.
pub async fn upload_objects(
    store: &dyn ObjectStore,
    prefix: &str,
    quantity: usize,
    workers: usize,
) -> Result<Vec<String>> {
    if workers == 0 {
        return Err(ConsistencyError::InvalidRequest(
            "workers must be at least 1".to_string(),
        ));
    }

    info!(
        "uploading {} object(s) under {}{} with {} worker(s)",
        quantity,
        store.bucket(),
        prefix,
        workers
    );

    let keys: Vec<String> = (1..=quantity).map(|i| object_key(prefix, i)).collect();

    stream::iter(keys.iter().enumerate())
        .map(|(i, key)| async move {
            store.put_object(key, object_body(i + 1)).await?;
            debug!("uploaded {}", key);
            Ok::<_, ConsistencyError>(())
        })
        .buffer_unordered(workers)
        .try_collect::<Vec<()>>()
        .await?;

    Ok(keys)
}

/// Delete `keys` with at most `workers` deletes in flight
pub async fn delete_objects(store: &dyn ObjectStore, keys: &[String], workers: usize) -> Result<()> {
    if workers == 0 {
        return Err(ConsistencyError::InvalidRequest(
            "workers must be at least 1".to_string(),
        ));
    }

    info!("deleting {} object(s) from {}", keys.len(), store.bucket());

    stream::iter(keys)
        .map(|key| store.delete_object(key))
        .buffer_unordered(workers)
        .try_collect::<Vec<()>>()
        .await?;

    Ok(())
}
