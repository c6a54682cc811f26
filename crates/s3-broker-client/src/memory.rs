//! In-memory object storage for testing and local runs
//!
//! Behaves like a single-account S3 endpoint: buckets hold versioned
//! objects, listings page through them with the same markers S3 uses, and
//! failures come back as S3-shaped [`ClientError::S3Error`] values.

use crate::{types::*, ClientError, ObjectStorage, Result, MAX_KEYS_PER_REQUEST};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Version ID S3 assigns to objects written while versioning is off
const NULL_VERSION: &str = "null";

/// Remote calls tracked by [`MemoryStorage`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ListObjects,
    DeleteObjects,
    ListObjectVersions,
    GetBucketLocation,
    CreateBucket,
    PutBucketPolicy,
    DeleteBucket,
}

impl Operation {
    const COUNT: usize = 7;

    fn index(self) -> usize {
        match self {
            Self::ListObjects => 0,
            Self::DeleteObjects => 1,
            Self::ListObjectVersions => 2,
            Self::GetBucketLocation => 3,
            Self::CreateBucket => 4,
            Self::PutBucketPolicy => 5,
            Self::DeleteBucket => 6,
        }
    }
}

#[derive(Clone, Debug)]
struct StoredVersion {
    seq: u64,
    delete_marker: bool,
}

fn version_id(seq: u64) -> String {
    match seq {
        0 => NULL_VERSION.to_string(),
        n => format!("v{:08}", n),
    }
}

fn parse_version_id(id: &str) -> Option<u64> {
    if id == NULL_VERSION {
        return Some(0);
    }
    id.strip_prefix('v')?.parse().ok()
}

/// Bucket state; each key's versions are kept oldest first.
///
/// Sequence 0 is the null version, which only exists for writes made before
/// versioning was enabled, so ascending sequence is also age order.
#[derive(Debug, Default)]
struct MemoryBucket {
    location: String,
    versioning: bool,
    policy: Option<String>,
    entries: BTreeMap<String, Vec<StoredVersion>>,
    next_seq: u64,
}

impl MemoryBucket {
    fn new(location: String) -> Self {
        Self {
            location,
            ..Default::default()
        }
    }

    fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn put(&mut self, key: &str) -> String {
        let seq = if self.versioning { self.next_seq() } else { 0 };

        let versions = self.entries.entry(key.to_string()).or_default();
        versions.retain(|v| v.seq != seq);
        versions.push(StoredVersion {
            seq,
            delete_marker: false,
        });
        version_id(seq)
    }

    fn delete(&mut self, object: &ObjectIdentifier) {
        match &object.version_id {
            Some(id) => {
                if let (Some(seq), Some(versions)) =
                    (parse_version_id(id), self.entries.get_mut(&object.key))
                {
                    versions.retain(|v| v.seq != seq);
                }
            }
            None if self.versioning => {
                if self.entries.contains_key(&object.key) {
                    let seq = self.next_seq();
                    if let Some(versions) = self.entries.get_mut(&object.key) {
                        versions.push(StoredVersion {
                            seq,
                            delete_marker: true,
                        });
                    }
                }
            }
            None => {
                if let Some(versions) = self.entries.get_mut(&object.key) {
                    versions.retain(|v| v.seq != 0);
                }
            }
        }

        if self
            .entries
            .get(&object.key)
            .is_some_and(|versions| versions.is_empty())
        {
            self.entries.remove(&object.key);
        }
    }

    /// Keys whose latest version is content rather than a delete marker
    fn current_keys(&self) -> impl Iterator<Item = &String> {
        self.entries
            .iter()
            .filter(|(_, versions)| versions.last().is_some_and(|v| !v.delete_marker))
            .map(|(key, _)| key)
    }

    /// Every version in listing order (key ascending, newest first) with its sequence
    fn listing(&self) -> impl Iterator<Item = (u64, ObjectVersion)> + '_ {
        self.entries.iter().flat_map(|(key, versions)| {
            versions.iter().rev().map(move |v| {
                (
                    v.seq,
                    ObjectVersion {
                        key: key.clone(),
                        version_id: version_id(v.seq),
                        is_delete_marker: v.delete_marker,
                    },
                )
            })
        })
    }

    fn version_count(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }
}

/// In-memory [`ObjectStorage`] with call accounting and failure injection
#[derive(Clone)]
pub struct MemoryStorage {
    buckets: Arc<DashMap<String, MemoryBucket>>,
    calls: Arc<[AtomicUsize; Operation::COUNT]>,
    failures: Arc<DashMap<Operation, (u16, String)>>,
    delete_batches: Arc<Mutex<Vec<Vec<ObjectIdentifier>>>>,
    page_limit: usize,
    region: String,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create an empty store placing buckets in the default region
    pub fn new() -> Self {
        Self {
            buckets: Arc::new(DashMap::new()),
            calls: Arc::new(Default::default()),
            failures: Arc::new(DashMap::new()),
            delete_batches: Arc::new(Mutex::new(Vec::new())),
            page_limit: MAX_KEYS_PER_REQUEST,
            region: String::new(),
        }
    }

    /// Cap every listing page at `limit` entries
    pub fn with_page_limit(mut self, limit: usize) -> Self {
        self.page_limit = limit.max(1);
        self
    }

    /// Location constraint recorded for newly created buckets
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Write an object, returning the version ID it was stored under
    pub fn put_object(&self, bucket: &str, key: &str) -> Result<String> {
        let mut entry = self.buckets.get_mut(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        Ok(entry.put(key))
    }

    /// Turn on versioning; later writes and deletes keep history
    pub fn enable_versioning(&self, bucket: &str) -> Result<()> {
        let mut entry = self.buckets.get_mut(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        entry.versioning = true;
        Ok(())
    }

    /// Check if a bucket exists
    pub fn bucket_exists(&self, bucket: &str) -> bool {
        self.buckets.contains_key(bucket)
    }

    /// Number of current (non-deleted) objects in a bucket
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets
            .get(bucket)
            .map(|b| b.current_keys().count())
            .unwrap_or(0)
    }

    /// Number of stored versions and delete markers in a bucket
    pub fn version_count(&self, bucket: &str) -> usize {
        self.buckets
            .get(bucket)
            .map(|b| b.version_count())
            .unwrap_or(0)
    }

    /// The bucket's policy document, if one was set
    pub fn bucket_policy(&self, bucket: &str) -> Option<String> {
        self.buckets.get(bucket).and_then(|b| b.policy.clone())
    }

    /// How many times an operation was called
    pub fn request_count(&self, op: Operation) -> usize {
        self.calls[op.index()].load(Ordering::SeqCst)
    }

    /// Batches passed to delete_objects, in call order
    pub fn delete_batches(&self) -> Vec<Vec<ObjectIdentifier>> {
        self.delete_batches.lock().clone()
    }

    /// Sizes of the batches passed to delete_objects, in call order
    pub fn delete_batch_sizes(&self) -> Vec<usize> {
        self.delete_batches.lock().iter().map(Vec::len).collect()
    }

    /// Forget recorded calls and batch sizes
    pub fn reset_counts(&self) {
        for counter in self.calls.iter() {
            counter.store(0, Ordering::SeqCst);
        }
        self.delete_batches.lock().clear();
    }

    /// Fail the next call of `op` with the given status and error code
    pub fn inject_failure(&self, op: Operation, status: u16, code: impl Into<String>) {
        self.failures.insert(op, (status, code.into()));
    }

    // ==================== Helper Methods ====================

    fn begin(&self, op: Operation) -> Result<()> {
        self.calls[op.index()].fetch_add(1, Ordering::SeqCst);
        match self.failures.remove(&op) {
            Some((_, (status, code))) => Err(ClientError::s3(
                status,
                code,
                format!("Injected failure for {:?}", op),
            )),
            None => Ok(()),
        }
    }
}

fn no_such_bucket(bucket: &str) -> ClientError {
    ClientError::s3(
        404,
        "NoSuchBucket",
        format!("The specified bucket does not exist: {}", bucket),
    )
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn list_objects(
        &self,
        bucket: &str,
        marker: Option<&str>,
        max_keys: usize,
    ) -> Result<ObjectPage> {
        self.begin(Operation::ListObjects)?;
        let entry = self.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;

        let limit = max_keys.min(self.page_limit).max(1);
        let mut remaining = entry
            .current_keys()
            .filter(|key| marker.map_or(true, |m| key.as_str() > m));

        let keys: Vec<String> = remaining.by_ref().take(limit).cloned().collect();
        let next_marker = match remaining.next() {
            Some(_) => keys.last().cloned(),
            None => None,
        };

        Ok(ObjectPage { keys, next_marker })
    }

    async fn delete_objects(&self, bucket: &str, objects: &[ObjectIdentifier]) -> Result<()> {
        self.begin(Operation::DeleteObjects)?;
        self.delete_batches.lock().push(objects.to_vec());

        if objects.is_empty() || objects.len() > MAX_KEYS_PER_REQUEST {
            return Err(ClientError::s3(
                400,
                "MalformedXML",
                format!("Delete request must name 1 to {} objects", MAX_KEYS_PER_REQUEST),
            ));
        }

        let mut entry = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;
        for object in objects {
            entry.delete(object);
        }
        Ok(())
    }

    async fn list_object_versions(
        &self,
        bucket: &str,
        key_marker: Option<&str>,
        version_id_marker: Option<&str>,
    ) -> Result<VersionPage> {
        self.begin(Operation::ListObjectVersions)?;
        let entry = self.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;

        // A version marker resumes inside its key; a bare key marker skips the key.
        // Positions are compared by sequence so deleted markers still resume correctly.
        let resume_seq = version_id_marker.and_then(parse_version_id);
        let mut remaining = entry
            .listing()
            .filter(|(seq, v)| match key_marker {
                None => true,
                Some(km) if v.key.as_str() > km => true,
                Some(km) if v.key == km => resume_seq.is_some_and(|marker| *seq < marker),
                Some(_) => false,
            })
            .map(|(_, v)| v);

        let versions: Vec<ObjectVersion> = remaining.by_ref().take(self.page_limit).collect();
        let truncated = remaining.next().is_some();

        let (next_key_marker, next_version_id_marker) = match versions.last() {
            Some(last) if truncated => (Some(last.key.clone()), Some(last.version_id.clone())),
            _ => (None, None),
        };

        Ok(VersionPage {
            versions,
            next_key_marker,
            next_version_id_marker,
        })
    }

    async fn get_bucket_location(&self, bucket: &str) -> Result<String> {
        self.begin(Operation::GetBucketLocation)?;
        self.buckets
            .get(bucket)
            .map(|b| b.location.clone())
            .ok_or_else(|| no_such_bucket(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<String> {
        self.begin(Operation::CreateBucket)?;

        match self.buckets.entry(bucket.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ClientError::s3(
                409,
                "BucketAlreadyOwnedByYou",
                format!("Your previous request to create {} succeeded", bucket),
            )),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(MemoryBucket::new(self.region.clone()));
                Ok(format!("/{}", bucket))
            }
        }
    }

    async fn put_bucket_policy(&self, bucket: &str, policy: &str) -> Result<()> {
        self.begin(Operation::PutBucketPolicy)?;
        let mut entry = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| no_such_bucket(bucket))?;

        if serde_json::from_str::<serde_json::Value>(policy).is_err() {
            return Err(ClientError::s3(
                400,
                "MalformedPolicy",
                "Policies must be valid JSON",
            ));
        }

        entry.policy = Some(policy.to_string());
        Ok(())
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.begin(Operation::DeleteBucket)?;

        let not_empty = match self.buckets.get(bucket) {
            None => return Err(no_such_bucket(bucket)),
            Some(entry) => !entry.entries.is_empty(),
        };
        if not_empty {
            return Err(ClientError::s3(
                409,
                "BucketNotEmpty",
                "The bucket you tried to delete is not empty",
            ));
        }

        self.buckets.remove(bucket);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store_with_bucket(name: &str) -> MemoryStorage {
        let store = MemoryStorage::new();
        store.create_bucket(name).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_and_locate() {
        let store = MemoryStorage::new().with_region("eu-west-1");

        let location = store.create_bucket("photos").await.unwrap();
        assert_eq!(location, "/photos");
        assert_eq!(store.get_bucket_location("photos").await.unwrap(), "eu-west-1");

        let err = store.create_bucket("photos").await.unwrap_err();
        assert_eq!(err.code(), "BucketAlreadyOwnedByYou");
        assert_eq!(err.status(), Some(409));
    }

    #[tokio::test]
    async fn test_missing_bucket() {
        let store = MemoryStorage::new();

        let err = store.get_bucket_location("nope").await.unwrap_err();
        assert!(err.is_no_such_bucket());
        assert!(store.delete_bucket("nope").await.unwrap_err().is_no_such_bucket());
        assert!(store.put_object("nope", "a").is_err());
    }

    #[tokio::test]
    async fn test_list_objects_pages() {
        let store = store_with_bucket("b").await;
        for key in ["a", "b", "c", "d", "e"] {
            store.put_object("b", key).unwrap();
        }

        let first = store.list_objects("b", None, 2).await.unwrap();
        assert_eq!(first.keys, vec!["a", "b"]);
        assert_eq!(first.next_marker.as_deref(), Some("b"));

        let second = store.list_objects("b", Some("b"), 2).await.unwrap();
        assert_eq!(second.keys, vec!["c", "d"]);

        let last = store.list_objects("b", Some("d"), 2).await.unwrap();
        assert_eq!(last.keys, vec!["e"]);
        assert_eq!(last.next_marker, None);
    }

    #[tokio::test]
    async fn test_versioned_delete_leaves_marker() {
        let store = store_with_bucket("b").await;
        store.enable_versioning("b").unwrap();
        store.put_object("b", "doc").unwrap();
        store.put_object("b", "doc").unwrap();

        store
            .delete_objects("b", &[ObjectIdentifier::key("doc")])
            .await
            .unwrap();

        assert_eq!(store.object_count("b"), 0);
        assert_eq!(store.version_count("b"), 3);

        let page = store.list_object_versions("b", None, None).await.unwrap();
        assert!(page.is_last());
        assert!(page.versions[0].is_delete_marker);
        assert_eq!(page.versions.len(), 3);

        let err = store.delete_bucket("b").await.unwrap_err();
        assert_eq!(err.code(), "BucketNotEmpty");
    }

    #[tokio::test]
    async fn test_version_listing_resumes_inside_key() {
        let store = store_with_bucket("b").await.with_page_limit(2);
        store.enable_versioning("b").unwrap();
        for key in ["a", "a", "a", "b"] {
            store.put_object("b", key).unwrap();
        }

        let mut seen = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;
        loop {
            let page = store
                .list_object_versions("b", key_marker.as_deref(), version_marker.as_deref())
                .await
                .unwrap();
            seen.extend(page.versions.iter().map(|v| (v.key.clone(), v.version_id.clone())));
            if page.is_last() {
                break;
            }
            key_marker = page.next_key_marker;
            version_marker = page.next_version_id_marker;
        }

        assert_eq!(
            seen,
            vec![
                ("a".to_string(), "v00000003".to_string()),
                ("a".to_string(), "v00000002".to_string()),
                ("a".to_string(), "v00000001".to_string()),
                ("b".to_string(), "v00000004".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_version_listing_resumes_after_marker_is_deleted() {
        let store = store_with_bucket("b").await.with_page_limit(2);
        store.enable_versioning("b").unwrap();
        for _ in 0..3 {
            store.put_object("b", "a").unwrap();
        }

        let first = store.list_object_versions("b", None, None).await.unwrap();
        let ids: Vec<_> = first.versions.iter().map(ObjectVersion::identifier).collect();
        store.delete_objects("b", &ids).await.unwrap();

        let second = store
            .list_object_versions(
                "b",
                first.next_key_marker.as_deref(),
                first.next_version_id_marker.as_deref(),
            )
            .await
            .unwrap();
        assert_eq!(second.versions.len(), 1);
        assert_eq!(second.versions[0].version_id, "v00000001");
        assert!(second.is_last());
    }

    #[tokio::test]
    async fn test_unversioned_objects_use_null_version() {
        let store = store_with_bucket("b").await;
        assert_eq!(store.put_object("b", "k").unwrap(), "null");
        assert_eq!(store.put_object("b", "k").unwrap(), "null");
        assert_eq!(store.version_count("b"), 1);

        store
            .delete_objects("b", &[ObjectIdentifier::versioned("k", "null")])
            .await
            .unwrap();
        store.delete_bucket("b").await.unwrap();
        assert!(!store.bucket_exists("b"));
    }

    #[tokio::test]
    async fn test_delete_batch_limits() {
        let store = store_with_bucket("b").await;

        let err = store.delete_objects("b", &[]).await.unwrap_err();
        assert_eq!(err.code(), "MalformedXML");

        let too_many: Vec<_> = (0..=MAX_KEYS_PER_REQUEST)
            .map(|i| ObjectIdentifier::key(format!("k{}", i)))
            .collect();
        assert!(store.delete_objects("b", &too_many).await.is_err());
        assert_eq!(store.delete_batch_sizes(), vec![0, MAX_KEYS_PER_REQUEST + 1]);
    }

    #[tokio::test]
    async fn test_policy_must_be_json() {
        let store = store_with_bucket("b").await;

        let err = store.put_bucket_policy("b", "not json").await.unwrap_err();
        assert_eq!(err.code(), "MalformedPolicy");

        store.put_bucket_policy("b", r#"{"Version":"2012-10-17"}"#).await.unwrap();
        assert_eq!(store.bucket_policy("b").as_deref(), Some(r#"{"Version":"2012-10-17"}"#));
    }

    #[tokio::test]
    async fn test_injected_failure_fires_once() {
        let store = store_with_bucket("b").await;
        store.inject_failure(Operation::GetBucketLocation, 403, "AccessDenied");

        let err = store.get_bucket_location("b").await.unwrap_err();
        assert_eq!(err.code(), "AccessDenied");
        assert!(store.get_bucket_location("b").await.is_ok());
        assert_eq!(store.request_count(Operation::GetBucketLocation), 2);

        store.reset_counts();
        assert_eq!(store.request_count(Operation::GetBucketLocation), 0);
    }
}
