//! Common types for the object-storage capability set

use serde::{Deserialize, Serialize};

/// One page of a current-object listing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectPage {
    /// Object keys in this page
    pub keys: Vec<String>,
    /// Marker to resume from; `None` on the final page
    pub next_marker: Option<String>,
}

/// A single historical version or delete marker
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectVersion {
    /// Object key
    pub key: String,
    /// Version ID (`null` for objects written before versioning)
    pub version_id: String,
    /// Whether this entry is a delete marker rather than content
    pub is_delete_marker: bool,
}

impl ObjectVersion {
    /// Identifier addressing exactly this version
    pub fn identifier(&self) -> ObjectIdentifier {
        ObjectIdentifier::versioned(self.key.clone(), self.version_id.clone())
    }
}

/// One page of a version listing.
///
/// The listing has two cursors; more pages remain while either is present.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VersionPage {
    /// Versions and delete markers in this page
    pub versions: Vec<ObjectVersion>,
    /// Key to resume from
    pub next_key_marker: Option<String>,
    /// Version ID to resume from
    pub next_version_id_marker: Option<String>,
}

impl VersionPage {
    /// Whether the provider reported no further pages
    pub fn is_last(&self) -> bool {
        self.next_key_marker.is_none() && self.next_version_id_marker.is_none()
    }
}

/// Key (and optionally version) addressed by a batch delete
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ObjectIdentifier {
    /// Object key
    pub key: String,
    /// Specific version to remove; `None` targets the current object
    pub version_id: Option<String>,
}

impl ObjectIdentifier {
    /// Address the current object under `key`
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: None,
        }
    }

    /// Address one version of `key`
    pub fn versioned(key: impl Into<String>, version_id: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            version_id: Some(version_id.into()),
        }
    }
}

/// Treat empty markers the same as absent ones
pub(crate) fn non_empty(marker: Option<String>) -> Option<String> {
    marker.filter(|m| !m.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_page_needs_both_markers_absent() {
        let mut page = VersionPage {
            next_key_marker: Some("k".into()),
            ..Default::default()
        };
        assert!(!page.is_last());

        page.next_key_marker = None;
        page.next_version_id_marker = Some("v1".into());
        assert!(!page.is_last());

        page.next_version_id_marker = None;
        assert!(page.is_last());
    }

    #[test]
    fn test_empty_marker_is_absent() {
        assert_eq!(non_empty(Some(String::new())), None);
        assert_eq!(non_empty(Some("a".into())), Some("a".into()));
    }
}
