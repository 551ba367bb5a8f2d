//! Read-path probes
//!
//! A probe performs one read-style check against the store and reduces the
//! answer to a boolean: "the expected state was observed". Probes never
//! return errors. Timeouts, throttling and other transient failures are
//! logged and reported as `false` so the validator's round loop stays the
//! only retry mechanism.
//!
//! The four standard probes are built from a [`ProbeContext`] (shared store
//! handle and per-call timeout) and a [`ProbeTarget`], wired for either
//! [`Expectation::Present`] or [`Expectation::Absent`].

pub mod listing;
pub mod object;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::error::{ConsistencyError, Result};
use crate::storage::ObjectStore;

pub use listing::{CountProbe, ListingProbe};
pub use object::{MetadataProbe, RetrievalProbe};

/// Default per-call timeout applied by probes
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// One named, side-effect-free check against the store.
///
/// `check` may be called many times, including concurrently with other
/// probes against the same store.
#[async_trait]
pub trait Probe: Send + Sync {
    /// Unique name, used as the key in validation results and reports
    fn name(&self) -> &str;

    /// True when the expected state was observed on this call
    async fn check(&self) -> bool;
}

/// The standard probe kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum ProbeKind {
    #[serde(rename = "list-objects")]
    Listing,
    #[serde(rename = "get-object")]
    Retrieval,
    #[serde(rename = "head-object")]
    Metadata,
    #[serde(rename = "count-objects")]
    Count,
}

impl ProbeKind {
    pub const ALL: [ProbeKind; 4] = [
        ProbeKind::Listing,
        ProbeKind::Retrieval,
        ProbeKind::Metadata,
        ProbeKind::Count,
    ];

    /// Probe name as it appears in results and reports
    pub fn name(&self) -> &'static str {
        match self {
            ProbeKind::Listing => "list-objects",
            ProbeKind::Retrieval => "get-object",
            ProbeKind::Metadata => "head-object",
            ProbeKind::Count => "count-objects",
        }
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which state a probe reports as success
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    /// The object exists (or the count matches)
    Present,
    /// The object does not exist (or the remaining count matches)
    Absent,
}

impl Expectation {
    pub fn wants_present(&self) -> bool {
        matches!(self, Expectation::Present)
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Present => f.write_str("presence"),
            Expectation::Absent => f.write_str("absence"),
        }
    }
}

/// Shared state handed to every probe constructor
#[derive(Clone)]
pub struct ProbeContext {
    store: Arc<dyn ObjectStore>,
    timeout: Duration,
}

impl ProbeContext {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Override the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run one store call under the probe timeout
    pub async fn call<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(ConsistencyError::Timeout(self.timeout)),
        }
    }
}

/// What the standard probes look at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeTarget {
    /// Object key checked by listing, retrieval and metadata probes
    pub key: String,
    /// Prefix listed by listing and count probes
    pub prefix: String,
    /// Expected number of keys under `prefix`, for the count probe
    pub expected_count: Option<usize>,
}

impl ProbeTarget {
    /// Target `key`, listing the "directory" that contains it
    pub fn new(key: impl Into<String>) -> Self {
        let key = key.into();
        let prefix = match key.rfind('/') {
            Some(idx) => key[..=idx].to_string(),
            None => String::new(),
        };
        Self {
            key,
            prefix,
            expected_count: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_expected_count(mut self, count: usize) -> Self {
        self.expected_count = Some(count);
        self
    }
}

/// Build the standard probes for `kinds`.
///
/// In presence mode the count probe needs `target.expected_count`; in
/// absence mode it compares against the remaining count, zero when unset.
pub fn build_probes(
    ctx: &ProbeContext,
    target: &ProbeTarget,
    expectation: Expectation,
    kinds: &[ProbeKind],
) -> Result<Vec<Arc<dyn Probe>>> {
    kinds
        .iter()
        .map(|kind| {
            let probe: Arc<dyn Probe> = match kind {
                ProbeKind::Listing => Arc::new(ListingProbe::new(ctx.clone(), target, expectation)),
                ProbeKind::Retrieval => {
                    Arc::new(RetrievalProbe::new(ctx.clone(), target, expectation))
                }
                ProbeKind::Metadata => Arc::new(MetadataProbe::new(ctx.clone(), target, expectation)),
                ProbeKind::Count => {
                    let expected = match (expectation, target.expected_count) {
                        (_, Some(count)) => count,
                        (Expectation::Absent, None) => 0,
                        (Expectation::Present, None) => {
                            return Err(ConsistencyError::InvalidRequest(
                                "count-objects probe in presence mode needs an expected count"
                                    .to_string(),
                            ))
                        }
                    };
                    Arc::new(CountProbe::new(ctx.clone(), &target.prefix, expected))
                }
            };
            Ok(probe)
        })
        .collect()
}

/// Probe backed by an async closure, for checks outside the standard four
/// (policy reads, lock configuration, custom predicates).
pub struct FnProbe<F> {
    name: String,
    check: F,
}

impl<F, Fut> FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    pub fn new(name: impl Into<String>, check: F) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }
}

#[async_trait]
impl<F, Fut> Probe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = bool> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn check(&self) -> bool {
        (self.check)().await
    }
}

/// Log a failure that says nothing about the observed state
fn log_transient(probe: &str, err: &ConsistencyError) {
    warn!("probe {}: treating transient error as not observed: {}", probe, err);
}
