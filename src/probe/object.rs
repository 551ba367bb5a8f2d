//! Point-read probes: full GET and metadata-only HEAD

use async_trait::async_trait;
use tracing::trace;

use crate::error::Result;
use crate::probe::{log_transient, Expectation, Probe, ProbeContext, ProbeKind, ProbeTarget};

/// Reduce a point-read outcome to "expected state observed".
///
/// Only a not-found answer counts as evidence of absence; a transient error
/// is never mistaken for it.
fn judge<T>(probe: &str, key: &str, expectation: Expectation, outcome: Result<T>) -> bool {
    match outcome {
        Ok(_) => {
            trace!("{}: key={} found", probe, key);
            expectation.wants_present()
        }
        Err(e) if e.is_not_found() => {
            trace!("{}: key={} not found", probe, key);
            !expectation.wants_present()
        }
        Err(e) => {
            log_transient(probe, &e);
            false
        }
    }
}

/// Can the object body be fetched?
pub struct RetrievalProbe {
    ctx: ProbeContext,
    key: String,
    expectation: Expectation,
}

impl RetrievalProbe {
    pub fn new(ctx: ProbeContext, target: &ProbeTarget, expectation: Expectation) -> Self {
        Self {
            ctx,
            key: target.key.clone(),
            expectation,
        }
    }
}

#[async_trait]
impl Probe for RetrievalProbe {
    fn name(&self) -> &str {
        ProbeKind::Retrieval.name()
    }

    async fn check(&self) -> bool {
        let outcome = self.ctx.call(self.ctx.store().get_object(&self.key)).await;
        judge(self.name(), &self.key, self.expectation, outcome)
    }
}

/// Can the object metadata be fetched? Cheaper than [`RetrievalProbe`].
pub struct MetadataProbe {
    ctx: ProbeContext,
    key: String,
    expectation: Expectation,
}

impl MetadataProbe {
    pub fn new(ctx: ProbeContext, target: &ProbeTarget, expectation: Expectation) -> Self {
        Self {
            ctx,
            key: target.key.clone(),
            expectation,
        }
    }
}

#[async_trait]
impl Probe for MetadataProbe {
    fn name(&self) -> &str {
        ProbeKind::Metadata.name()
    }

    async fn check(&self) -> bool {
        let outcome = self.ctx.call(self.ctx.store().head_object(&self.key)).await;
        judge(self.name(), &self.key, self.expectation, outcome)
    }
}
