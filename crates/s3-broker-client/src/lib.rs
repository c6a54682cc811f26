//! # s3-broker client
//!
//! The object-storage capability set the bucket lifecycle manager is built
//! on, plus two implementations of it.
//!
//! ## Features
//!
//! - **ObjectStorage trait**: the seven remote calls bucket provisioning needs
//! - **S3Client**: S3 REST API over `reqwest`, signed with AWS Signature V4
//! - **MemoryStorage**: versioned in-memory provider for tests and local runs
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Bucket lifecycle manager        │
//! ├─────────────────────────────────────────┤
//! │           ObjectStorage trait           │
//! ├────────────────────┬────────────────────┤
//! │      S3Client      │   MemoryStorage    │
//! ├────────────────────┴────────────────────┤
//! │      S3 / S3-compatible endpoint        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use s3_broker_client::{Config, Credentials, ObjectStorage, S3Client};
//!
//! let client = S3Client::new(
//!     Config::new("https://s3.amazonaws.com")
//!         .with_credentials(Credentials::new("AKID", "secret")),
//! )?;
//! let region = client.get_bucket_location("my-bucket").await?;
//! ```

mod client;
mod config;
mod error;
pub mod memory;
pub mod sigv4;
mod types;
mod xml;

pub use client::S3Client;
pub use config::Config;
pub use error::{ClientError, Result};
pub use memory::{MemoryStorage, Operation};
pub use sigv4::{Credentials, SigV4Signer};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;

/// Region S3 reports as an empty location constraint
pub const DEFAULT_REGION: &str = "us-east-1";

/// Largest page a listing returns and largest batch a delete accepts
pub const MAX_KEYS_PER_REQUEST: usize = 1000;

/// Remote object-storage capabilities used to manage a bucket's lifecycle
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// List up to `max_keys` current objects after `marker`
    async fn list_objects(
        &self,
        bucket: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage>;

    /// Delete a batch of objects or object versions
    async fn delete_objects(&self, bucket: &str, objects: &[ObjectIdentifier]) -> Result<()>;

    /// List object versions and delete markers after the given cursors
    async fn list_object_versions(
        &self,
        bucket: &str,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
    ) -> Result<VersionPage>;

    /// Get the bucket's location constraint (empty for the default region)
    async fn get_bucket_location(&self, bucket: &str) -> Result<String>;

    /// Create a bucket, returning its location
    async fn create_bucket(&self, bucket: &str) -> Result<String>;

    /// Replace the bucket's access policy
    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<()>;

    /// Delete an empty bucket
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;
}

#[async_trait]
impl<T: ObjectStorage + ?Sized> ObjectStorage for Arc<T> {
    async fn list_objects(
        &self,
        bucket: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage> {
        (**self).list_objects(bucket, marker, max_keys).await
    }

    async fn delete_objects(&self, bucket: &str, objects: &[ObjectIdentifier]) -> Result<()> {
        (**self).delete_objects(bucket, objects).await
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
    ) -> Result<VersionPage> {
        (**self)
            .list_object_versions(bucket, key_marker, version_id_marker)
            .await
    }

    async fn get_bucket_location(&self, bucket: &str) -> Result<String> {
        (**self).get_bucket_location(bucket).await
    }

    async fn create_bucket(&self, bucket: &str) -> Result<String> {
        (**self).create_bucket(bucket).await
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<()> {
        (**self).put_bucket_policy(bucket, policy).await
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        (**self).delete_bucket(bucket).await
    }
}
