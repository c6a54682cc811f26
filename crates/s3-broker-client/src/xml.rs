//! S3 XML wire documents
//!
//! Only the elements the broker reads are modelled; anything else in a
//! response (ETag, Size, Owner, ...) is ignored by the deserializer.
//!
//! Listings are requested with `encoding-type=url`. The XML deserializer trims
//! text content, so keys with leading or trailing spaces only survive the
//! round trip in encoded form.

use crate::types::{non_empty, ObjectPage, ObjectVersion, VersionPage};
use crate::{ClientError, ObjectIdentifier, Result};
use serde::{Deserialize, Serialize};

const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";

/// Query parameter value asking S3 to URL-encode keys in listings
pub(crate) const URL_ENCODING: &str = "url";

/// `ListBucketResult` (ListObjects v1)
#[derive(Debug, Deserialize)]
struct ListBucketResult {
    #[serde(rename = "EncodingType", default)]
    encoding_type: Option<String>,
    #[serde(rename = "IsTruncated", default)]
    is_truncated: bool,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
    #[serde(rename = "Contents", default)]
    contents: Vec<ObjectEntry>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    #[serde(rename = "Key")]
    key: String,
}

/// `ListVersionsResult`; `Version` and `DeleteMarker` elements interleave
#[derive(Debug, Deserialize)]
struct ListVersionsResult {
    #[serde(rename = "EncodingType", default)]
    encoding_type: Option<String>,
    #[serde(rename = "NextKeyMarker", default)]
    next_key_marker: Option<String>,
    #[serde(rename = "NextVersionIdMarker", default)]
    next_version_id_marker: Option<String>,
    #[serde(rename = "Version", default)]
    versions: Vec<VersionEntry>,
    #[serde(rename = "DeleteMarker", default)]
    delete_markers: Vec<VersionEntry>,
}

#[derive(Debug, Deserialize)]
struct VersionEntry {
    #[serde(rename = "Key")]
    key: String,
    #[serde(rename = "VersionId")]
    version_id: String,
}

#[derive(Debug, Deserialize)]
struct LocationConstraint {
    #[serde(rename = "$text", default)]
    region: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "CreateBucketConfiguration")]
struct CreateBucketConfiguration<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "LocationConstraint")]
    location_constraint: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename = "Delete")]
struct DeleteRequest<'a> {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "Quiet")]
    quiet: bool,
    #[serde(rename = "Object")]
    objects: Vec<DeleteObject<'a>>,
}

#[derive(Debug, Serialize)]
struct DeleteObject<'a> {
    #[serde(rename = "Key")]
    key: &'a str,
    #[serde(rename = "VersionId", skip_serializing_if = "Option::is_none")]
    version_id: Option<&'a str>,
}

#[derive(Debug, Default, Deserialize)]
struct DeleteResult {
    #[serde(rename = "Error", default)]
    errors: Vec<DeleteErrorEntry>,
}

/// A key the service refused to delete in a batch
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub(crate) struct DeleteErrorEntry {
    #[serde(rename = "Key", default)]
    pub key: String,
    #[serde(rename = "Code", default)]
    pub code: String,
    #[serde(rename = "Message", default)]
    pub message: String,
}

/// Undo `encoding-type=url` for keys and key markers.
///
/// Providers that ignore the request parameter omit `EncodingType`, and their
/// keys are returned as-is.
struct KeyDecoder {
    url_encoded: bool,
}

impl KeyDecoder {
    fn new(encoding_type: Option<&str>) -> Self {
        Self {
            url_encoded: encoding_type.is_some_and(|e| e.eq_ignore_ascii_case(URL_ENCODING)),
        }
    }

    fn decode(&self, raw: String) -> Result<String> {
        if !self.url_encoded {
            return Ok(raw);
        }
        // S3 form-encodes spaces; a literal '+' arrives as %2B
        let spaced = raw.replace('+', " ");
        urlencoding::decode(&spaced)
            .map(|key| key.into_owned())
            .map_err(|e| ClientError::InvalidResponse(format!("undecodable key {:?}: {}", raw, e)))
    }

    fn decode_marker(&self, marker: Option<String>) -> Result<Option<String>> {
        non_empty(marker).map(|m| self.decode(m)).transpose()
    }
}

/// Parse a ListObjects v1 response.
///
/// Without a delimiter S3 omits `NextMarker`; a truncated page then resumes
/// after its last key.
pub(crate) fn parse_object_page(xml: &str) -> Result<ObjectPage> {
    let result: ListBucketResult = quick_xml::de::from_str(xml)?;
    let decoder = KeyDecoder::new(result.encoding_type.as_deref());

    let keys = result
        .contents
        .into_iter()
        .map(|o| decoder.decode(o.key))
        .collect::<Result<Vec<String>>>()?;

    let next_marker = match decoder.decode_marker(result.next_marker)? {
        Some(marker) => Some(marker),
        None if result.is_truncated => keys.last().cloned(),
        None => None,
    };

    Ok(ObjectPage { keys, next_marker })
}

/// Parse a ListObjectVersions response
pub(crate) fn parse_version_page(xml: &str) -> Result<VersionPage> {
    let result: ListVersionsResult = quick_xml::de::from_str(xml)?;
    let decoder = KeyDecoder::new(result.encoding_type.as_deref());

    let versions = result
        .versions
        .into_iter()
        .map(|v| (v, false))
        .chain(result.delete_markers.into_iter().map(|v| (v, true)))
        .map(|(v, is_delete_marker)| {
            Ok(ObjectVersion {
                key: decoder.decode(v.key)?,
                version_id: v.version_id,
                is_delete_marker,
            })
        })
        .collect::<Result<Vec<ObjectVersion>>>()?;

    Ok(VersionPage {
        versions,
        next_key_marker: decoder.decode_marker(result.next_key_marker)?,
        next_version_id_marker: non_empty(result.next_version_id_marker),
    })
}

/// Parse a GetBucketLocation response; the default region is an empty element
pub(crate) fn parse_location(xml: &str) -> Result<String> {
    let location: LocationConstraint = quick_xml::de::from_str(xml)?;
    Ok(location.region.trim().to_string())
}

/// Parse the per-key failures of a DeleteObjects response
pub(crate) fn parse_delete_errors(xml: &str) -> Result<Vec<DeleteErrorEntry>> {
    if xml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let result: DeleteResult = quick_xml::de::from_str(xml)?;
    Ok(result.errors)
}

/// Build a quiet DeleteObjects request body
pub(crate) fn delete_request(objects: &[ObjectIdentifier]) -> Result<String> {
    let request = DeleteRequest {
        xmlns: S3_XMLNS,
        quiet: true,
        objects: objects
            .iter()
            .map(|o| DeleteObject {
                key: &o.key,
                version_id: o.version_id.as_deref(),
            })
            .collect(),
    };
    Ok(quick_xml::se::to_string(&request)?)
}

/// Build a CreateBucket body pinning the bucket to `region`
pub(crate) fn create_bucket_configuration(region: &str) -> Result<String> {
    let config = CreateBucketConfiguration {
        xmlns: S3_XMLNS,
        location_constraint: region,
    };
    Ok(quick_xml::se::to_string(&config)?)
}
