//! Listing-based probes: key membership and key count under a prefix

use async_trait::async_trait;
use tracing::trace;

use crate::probe::{log_transient, Expectation, Probe, ProbeContext, ProbeKind, ProbeTarget};
use crate::storage::collect_keys;

/// Is the target key part of a full listing of its prefix?
pub struct ListingProbe {
    ctx: ProbeContext,
    prefix: String,
    key: String,
    expectation: Expectation,
}

impl ListingProbe {
    pub fn new(ctx: ProbeContext, target: &ProbeTarget, expectation: Expectation) -> Self {
        Self {
            ctx,
            prefix: target.prefix.clone(),
            key: target.key.clone(),
            expectation,
        }
    }
}

#[async_trait]
impl Probe for ListingProbe {
    fn name(&self) -> &str {
        ProbeKind::Listing.name()
    }

    async fn check(&self) -> bool {
        let store = self.ctx.store().as_ref();
        match self.ctx.call(collect_keys(store, &self.prefix)).await {
            Ok(keys) => {
                let listed = keys.iter().any(|k| k == &self.key);
                trace!(
                    "{}: key={} listed={} ({} keys under '{}')",
                    self.name(),
                    self.key,
                    listed,
                    keys.len(),
                    self.prefix
                );
                listed == self.expectation.wants_present()
            }
            Err(e) => {
                log_transient(self.name(), &e);
                false
            }
        }
    }
}

/// Does the number of keys under a prefix equal an externally tracked count?
///
/// Not negated in absence mode: the caller supplies the remaining count.
pub struct CountProbe {
    ctx: ProbeContext,
    prefix: String,
    expected: usize,
}

impl CountProbe {
    pub fn new(ctx: ProbeContext, prefix: &str, expected: usize) -> Self {
        Self {
            ctx,
            prefix: prefix.to_string(),
            expected,
        }
    }
}

#[async_trait]
impl Probe for CountProbe {
    fn name(&self) -> &str {
        ProbeKind::Count.name()
    }

    async fn check(&self) -> bool {
        let store = self.ctx.store().as_ref();
        match self.ctx.call(collect_keys(store, &self.prefix)).await {
            Ok(keys) => {
                trace!(
                    "{}: prefix='{}' counted={} expected={}",
                    self.name(),
                    self.prefix,
                    keys.len(),
                    self.expected
                );
                keys.len() == self.expected
            }
            Err(e) => {
                log_transient(self.name(), &e);
                false
            }
        }
    }
}
