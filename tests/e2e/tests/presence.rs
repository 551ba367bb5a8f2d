//! Presence validation against MinIO
//!
//! Uploads a workload, then checks that every read path sees the newest
//! object.

mod common;

use anyhow::Result;
use common::*;
use s3_consistency::probe::{ProbeContext, ProbeKind, ProbeTarget};
use s3_consistency::storage::s3::S3Store;
use s3_consistency::validator::{validate_presence, ValidationPolicy};
use s3_consistency::workload::upload_objects;
use std::sync::Arc;
use std::time::Duration;
use test_case::test_case;

fn policy() -> ValidationPolicy {
    ValidationPolicy::new(3, 10, Duration::from_secs(1))
}

/// 512 objects under `additional/`, all four probes, 3 successes within 10 rounds
#[tokio::test]
async fn test_presence_of_last_uploaded_object() -> Result<()> {
    let harness = TestHarness::new().await?;
    let ctx = harness.probe_context();

    let keys = upload_objects(ctx.store().as_ref(), "additional/", 512, 16).await?;
    assert_eq!(keys.last().map(String::as_str), Some("additional/arquivo_512.txt"));

    let target = ProbeTarget::new("additional/arquivo_512.txt").with_expected_count(512);
    let result = validate_presence(ctx, &target, &ProbeKind::ALL, &policy()).await?;

    assert_consistent(&result);
    assert_probe_names(
        &result,
        &["list-objects", "get-object", "head-object", "count-objects"],
    );
    assert_attempts_within(&result, 3, 10);

    harness.cleanup().await
}

#[test_case(ProbeKind::Listing ; "listing only")]
#[test_case(ProbeKind::Retrieval ; "retrieval only")]
#[test_case(ProbeKind::Metadata ; "metadata only")]
#[test_case(ProbeKind::Count ; "count only")]
#[tokio::test]
async fn test_single_probe_presence(kind: ProbeKind) -> Result<()> {
    let ctx = shared_harness().await.context().await?;
    let prefix = ctx.subprefix("single");

    upload_objects(ctx.probe_context().store().as_ref(), &prefix, 8, 4).await?;

    let target = ProbeTarget::new(format!("{}arquivo_8.txt", prefix)).with_expected_count(8);
    let result = validate_presence(ctx.probe_context(), &target, &[kind], &policy()).await?;

    assert_consistent(&result);
    assert_probe_names(&result, &[kind.name()]);

    ctx.cleanup().await
}

/// Same checks through a client built from runner configuration
#[tokio::test]
async fn test_presence_through_configured_store() -> Result<()> {
    let ctx = shared_harness().await.context().await?;
    let prefix = ctx.subprefix("configured");

    let storage = ctx.minio().storage_config(ctx.bucket().name());
    assert_eq!(storage.profile_label(), "us-east-1");
    let store = S3Store::new(&storage).await?;
    let probe_context = ProbeContext::new(Arc::new(store)).with_timeout(storage.request_timeout);

    upload_objects(probe_context.store().as_ref(), &prefix, 3, 3).await?;

    let target = ProbeTarget::new(format!("{}arquivo_3.txt", prefix)).with_expected_count(3);
    let result = validate_presence(&probe_context, &target, &ProbeKind::ALL, &policy()).await?;
    assert_consistent(&result);

    ctx.cleanup().await
}

/// A wrong expected count must not settle
#[tokio::test]
async fn test_count_mismatch_exhausts_attempts() -> Result<()> {
    let ctx = shared_harness().await.context().await?;
    let prefix = ctx.subprefix("mismatch");

    upload_objects(ctx.probe_context().store().as_ref(), &prefix, 5, 2).await?;

    let target = ProbeTarget::new(format!("{}arquivo_5.txt", prefix)).with_expected_count(6);
    let short = ValidationPolicy::new(2, 3, Duration::from_millis(200));
    let result = validate_presence(ctx.probe_context(), &target, &[ProbeKind::Count], &short).await?;

    assert!(!result.succeeded);
    assert_eq!(result.attempts_used, 3);
    assert_eq!(result.per_probe_elapsed_seconds()["count-objects"], None);

    ctx.cleanup().await
}

shared_test!(test_missing_object_never_present, |ctx: &TestContext<'_>| {
    let probe_context = ctx.probe_context().clone();
    let key = format!("{}never-written.txt", ctx.prefix());
    async move {
        let target = ProbeTarget::new(key);
        let short = ValidationPolicy::new(1, 2, Duration::from_millis(200));
        let kinds = [ProbeKind::Listing, ProbeKind::Retrieval, ProbeKind::Metadata];
        let result = validate_presence(&probe_context, &target, &kinds, &short).await?;

        assert!(!result.succeeded);
        assert_eq!(result.unsettled().count(), 3);
        Ok::<(), anyhow::Error>(())
    }
});
