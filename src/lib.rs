//! s3-consistency: eventual-consistency probing for S3-compatible stores
//!
//! After a write or delete, an object store may take a while before every
//! read path agrees on the new state. This library measures that window by
//! polling independent read paths until each has observed the expected
//! state often enough.
//!
//! # Architecture
//!
//! - **Storage**: the `ObjectStore` trait, implemented for S3 (aws-sdk-s3)
//!   and an in-memory store with simulated visibility lag.
//! - **Probes**: one read-path check each (listing, GET, HEAD, key count),
//!   wired for presence or absence and reduced to a boolean.
//! - **Validator**: runs pending probes concurrently in rounds, counts
//!   successes per probe and records when each one settled.
//! - **Report**: appends one CSV row per probe per validation.
//! - **Scenario**: upload a workload, validate presence, delete, validate
//!   absence, record both.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use s3_consistency::config::Config;
//! use s3_consistency::probe::{ProbeContext, ProbeKind, ProbeTarget};
//! use s3_consistency::storage::s3::S3Store;
//! use s3_consistency::validator::{validate_presence, ValidationPolicy};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_file(&"config.yaml".into())?;
//! let store = S3Store::new(&config.storage).await?;
//! let ctx = ProbeContext::new(Arc::new(store));
//!
//! let target = ProbeTarget::new("additional/arquivo_512.txt").with_expected_count(512);
//! let result =
//!     validate_presence(&ctx, &target, &ProbeKind::ALL, &ValidationPolicy::default()).await?;
//! assert!(result.succeeded, "{}", result);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod probe;
pub mod report;
pub mod scenario;
pub mod storage;
pub mod validator;
pub mod workload;

pub use error::{ConsistencyError, Result};
pub use validator::{
    validate_absence, validate_presence, ConsistencyValidator, ValidationPolicy, ValidationResult,
};
