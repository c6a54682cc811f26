//! # s3-broker core
//!
//! Bucket lifecycle management on top of an [`ObjectStorage`] provider.
//!
//! This crate provides:
//! - **BucketStore**: describe, create, modify and delete a bucket
//! - **Two-phase drain**: current objects, then versions and delete markers,
//!   are purged page by page before the bucket itself is removed
//! - **Policy templates**: access policies rendered from the bucket's own fields
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Provisioning service / CLI       │
//! ├─────────────────────────────────────────┤
//! │     BucketLifecycle  (BucketStore)      │
//! ├────────────────────┬────────────────────┤
//! │  Policy templates  │  Delete state      │
//! │                    │  machine           │
//! ├────────────────────┴────────────────────┤
//! │           ObjectStorage trait           │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use s3_broker_client::MemoryStorage;
//! use s3_broker_core::{BucketDetails, BucketLifecycle, BucketStore};
//!
//! let store = BucketStore::new(MemoryStorage::new());
//! store.create("my-bucket", BucketDetails::new("my-bucket", "aws")).await?;
//! let details = store.describe("my-bucket", "aws").await?;
//! assert_eq!(details.arn(), "arn:aws:s3:::my-bucket");
//! store.delete("my-bucket").await?;
//! ```

pub mod details;
pub mod error;
pub mod store;
pub mod template;

pub use details::{BucketDetails, DEFAULT_PARTITION};
pub use error::{BucketError, Result};
pub use store::{BucketStore, DeletePhase, OBJECT_PAGE_SIZE};
pub use template::{PolicyTemplate, TemplateError};

pub use s3_broker_client::ObjectStorage;

use async_trait::async_trait;

/// The operations a provisioning service performs on a bucket
#[async_trait]
pub trait BucketLifecycle: Send + Sync {
    /// Look a bucket up; `partition` is used to derive its ARN
    async fn describe(&self, bucket: &str, partition: &str) -> Result<BucketDetails>;

    /// Create a bucket and apply its policy template, returning the bucket's location
    async fn create(&self, bucket: &str, details: BucketDetails) -> Result<String>;

    /// Change an existing bucket
    async fn modify(&self, bucket: &str, details: BucketDetails) -> Result<()>;

    /// Empty a bucket of objects and versions, then delete it
    async fn delete(&self, bucket: &str) -> Result<()>;
}
