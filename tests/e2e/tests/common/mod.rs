//! Common test utilities and fixtures
//!
//! Two setup patterns:
//!
//! 1. **Per-test harness**: each test creates its own bucket with
//!    `TestHarness::new()`. Used where exact keys matter.
//!
//! 2. **Shared harness with contexts**: tests share one bucket and get
//!    isolated key prefixes via `shared_harness().await.context()`.

#![allow(dead_code)]

pub use s3_consistency_e2e::*;

use tokio::sync::OnceCell;

/// Global shared harness instance, initialized on first use
static SHARED_HARNESS: OnceCell<SharedHarness> = OnceCell::const_new();

pub async fn shared_harness() -> &'static SharedHarness {
    SHARED_HARNESS
        .get_or_init(|| async {
            SharedHarness::new()
                .await
                .expect("Failed to initialize shared harness")
        })
        .await
}

/// Macro for tests using the shared harness pattern.
///
/// ```ignore
/// shared_test!(test_my_feature, |ctx| async move {
///     let prefix = ctx.prefix();
///     Ok(())
/// });
/// ```
#[macro_export]
macro_rules! shared_test {
    ($test_name:ident, $body:expr) => {
        #[tokio::test]
        async fn $test_name() -> anyhow::Result<()> {
            let ctx = $crate::common::shared_harness().await.context().await?;
            let result: anyhow::Result<()> = ($body)(&ctx).await;
            ctx.cleanup().await?;
            result
        }
    };
}
