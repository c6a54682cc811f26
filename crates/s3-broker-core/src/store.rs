//! Bucket lifecycle over an object-storage provider

use crate::{
    template::PolicyTemplate, BucketDetails, BucketError, BucketLifecycle, Result,
};
use async_trait::async_trait;
use s3_broker_client::{
    ClientError, ObjectIdentifier, ObjectStorage, ObjectVersion, DEFAULT_REGION,
    MAX_KEYS_PER_REQUEST,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

/// Keys requested per object-listing page
pub const OBJECT_PAGE_SIZE: usize = MAX_KEYS_PER_REQUEST;

/// Stages of a bucket delete, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletePhase {
    /// Removing current objects
    PurgingObjects,
    /// Removing noncurrent versions and delete markers
    PurgingVersions,
    /// Removing the now-empty bucket
    DeletingBucket,
}

impl DeletePhase {
    /// All phases in execution order
    pub const ALL: [DeletePhase; 3] = [
        DeletePhase::PurgingObjects,
        DeletePhase::PurgingVersions,
        DeletePhase::DeletingBucket,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Self::PurgingObjects => "purging objects",
            Self::PurgingVersions => "purging versions",
            Self::DeletingBucket => "deleting bucket",
        }
    }
}

impl fmt::Display for DeletePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bucket lifecycle manager.
///
/// Holds nothing but its storage handle, so one instance can be shared
/// between concurrent callers. Concurrent deletes of the same bucket are not
/// coordinated.
pub struct BucketStore<S: ObjectStorage> {
    storage: Arc<S>,
}

impl<S: ObjectStorage> Clone for BucketStore<S> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
        }
    }
}

impl<S: ObjectStorage> BucketStore<S> {
    /// Create a store over `storage`
    pub fn new(storage: S) -> Self {
        Self {
            storage: Arc::new(storage),
        }
    }

    /// Create a store over shared storage
    pub fn from_arc(storage: Arc<S>) -> Self {
        Self { storage }
    }

    /// Get the storage provider
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Delete a bucket, stopping at the next page boundary once `cancel` fires
    pub async fn delete_with_cancel(&self, bucket: &str, cancel: &CancellationToken) -> Result<()> {
        self.delete_from(bucket, DeletePhase::PurgingObjects, cancel)
            .await
    }

    /// Run the delete state machine starting at `start`; earlier phases are skipped
    #[instrument(skip(self, cancel))]
    pub async fn delete_from(
        &self,
        bucket: &str,
        start: DeletePhase,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for phase in DeletePhase::ALL.into_iter().filter(|p| *p >= start) {
            debug!(%phase, "Entering delete phase");

            let result = if cancel.is_cancelled() {
                Err(BucketError::Cancelled)
            } else {
                match phase {
                    DeletePhase::PurgingObjects => self.purge_objects(bucket, cancel).await,
                    DeletePhase::PurgingVersions => self.purge_versions(bucket, cancel).await,
                    DeletePhase::DeletingBucket => self.delete_bucket(bucket).await,
                }
            };

            if let Err(err) = result {
                if err.is_not_found() {
                    debug!(%phase, "Bucket does not exist");
                } else {
                    error!(%phase, code = ?err.provider_code(), "Bucket delete failed: {}", err);
                }
                return Err(err.in_phase(phase));
            }
        }

        info!("Bucket deleted");
        Ok(())
    }

    // ==================== Delete Phases ====================

    async fn purge_objects(&self, bucket: &str, cancel: &CancellationToken) -> Result<()> {
        let mut marker: Option<String> = None;
        let mut removed = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(BucketError::Cancelled);
            }

            let page = self
                .storage
                .list_objects(bucket, marker.as_deref(), OBJECT_PAGE_SIZE)
                .await
                .map_err(|e| BucketError::from_client(bucket, e))?;
            debug!(keys = page.keys.len(), marker = ?marker, "Listed objects");

            if !page.keys.is_empty() {
                let objects: Vec<ObjectIdentifier> =
                    page.keys.iter().map(ObjectIdentifier::key).collect();
                self.storage
                    .delete_objects(bucket, &objects)
                    .await
                    .map_err(|e| BucketError::from_client(bucket, e))?;
                removed += objects.len();
            }

            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        debug!(removed, "Purged current objects");
        Ok(())
    }

    async fn purge_versions(&self, bucket: &str, cancel: &CancellationToken) -> Result<()> {
        let mut key_marker: Option<String> = None;
        let mut version_id_marker: Option<String> = None;
        let mut removed = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Err(BucketError::Cancelled);
            }

            let page = self
                .storage
                .list_object_versions(bucket, key_marker.as_deref(), version_id_marker.as_deref())
                .await
                .map_err(|e| BucketError::from_client(bucket, e))?;
            debug!(
                versions = page.versions.len(),
                key_marker = ?key_marker,
                version_id_marker = ?version_id_marker,
                "Listed versions"
            );

            if !page.versions.is_empty() {
                let objects: Vec<ObjectIdentifier> =
                    page.versions.iter().map(ObjectVersion::identifier).collect();
                self.storage
                    .delete_objects(bucket, &objects)
                    .await
                    .map_err(|e| BucketError::from_client(bucket, e))?;
                removed += objects.len();
            }

            if page.is_last() {
                break;
            }
            key_marker = page.next_key_marker;
            version_id_marker = page.next_version_id_marker;
        }

        debug!(removed, "Purged versions");
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.storage
            .delete_bucket(bucket)
            .await
            .map_err(|e| match e.status() {
                // Providers answer 400 for names that cannot exist
                Some(400) | Some(404) => BucketError::NotFound {
                    bucket: bucket.to_string(),
                },
                _ => BucketError::from_client(bucket, e),
            })
    }

    fn translate(bucket: &str, err: ClientError) -> BucketError {
        let err = BucketError::from_client(bucket, err);
        if let BucketError::Provider { code, .. } = &err {
            error!(bucket, code = %code, "Provider call failed");
        }
        err
    }
}

#[async_trait]
impl<S: ObjectStorage> BucketLifecycle for BucketStore<S> {
    #[instrument(skip(self))]
    async fn describe(&self, bucket: &str, partition: &str) -> Result<BucketDetails> {
        let location = self
            .storage
            .get_bucket_location(bucket)
            .await
            .map_err(|e| Self::translate(bucket, e))?;

        let region = if location.is_empty() {
            DEFAULT_REGION.to_string()
        } else {
            location
        };
        debug!(%region, "Described bucket");

        Ok(BucketDetails::new(bucket, partition).with_region(region))
    }

    #[instrument(skip(self, details))]
    async fn create(&self, bucket: &str, mut details: BucketDetails) -> Result<String> {
        let location = self
            .storage
            .create_bucket(bucket)
            .await
            .map_err(|e| Self::translate(bucket, e))?;
        info!(%location, "Bucket created");

        if let Some(source) = details.policy.clone().filter(|p| !p.is_empty()) {
            details.name = bucket.to_string();
            let policy = PolicyTemplate::parse(&source)
                .and_then(|template| template.render(&details))
                .map_err(|e| {
                    error!("Policy template failed, bucket left without policy: {}", e);
                    BucketError::from(e)
                })?;

            self.storage
                .put_bucket_policy(bucket, &policy)
                .await
                .map_err(|e| Self::translate(bucket, e))?;
            debug!("Applied bucket policy");
        }

        Ok(location)
    }

    async fn modify(&self, _bucket: &str, _details: BucketDetails) -> Result<()> {
        Err(BucketError::Unimplemented("modify"))
    }

    async fn delete(&self, bucket: &str) -> Result<()> {
        self.delete_with_cancel(bucket, &CancellationToken::new())
            .await
    }
}
