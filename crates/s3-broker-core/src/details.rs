//! Bucket description

use serde::{Deserialize, Serialize, Serializer};
use std::collections::HashMap;

/// Partition used when none is configured
pub const DEFAULT_PARTITION: &str = "aws";

/// A bucket as the provisioning service sees it.
///
/// The ARN is derived from `partition` and `name` on demand and never stored.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BucketDetails {
    /// Bucket name
    pub name: String,
    /// ARN partition (`aws`, `aws-cn`, `aws-us-gov`, ...)
    #[serde(default = "default_partition")]
    pub partition: String,
    /// Region the bucket lives in
    #[serde(default)]
    pub region: String,
    /// Resource tags
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Access policy template applied at creation
    #[serde(default)]
    pub policy: Option<String>,
}

fn default_partition() -> String {
    DEFAULT_PARTITION.to_string()
}

impl BucketDetails {
    /// Describe `name` within `partition`
    pub fn new(name: impl Into<String>, partition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partition: partition.into(),
            region: String::new(),
            tags: HashMap::new(),
            policy: None,
        }
    }

    /// Set the region
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Set the policy template
    pub fn with_policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    /// Canonical resource identifier
    pub fn arn(&self) -> String {
        bucket_arn(&self.partition, &self.name)
    }
}

/// `arn:<partition>:s3:::<name>`
pub fn bucket_arn(partition: &str, name: &str) -> String {
    format!("arn:{}:s3:::{}", partition, name)
}

impl Serialize for BucketDetails {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        #[derive(Serialize)]
        struct View<'a> {
            name: &'a str,
            arn: String,
            partition: &'a str,
            region: &'a str,
            tags: &'a HashMap<String, String>,
            #[serde(skip_serializing_if = "Option::is_none")]
            policy: Option<&'a str>,
        }

        View {
            name: &self.name,
            arn: self.arn(),
            partition: &self.partition,
            region: &self.region,
            tags: &self.tags,
            policy: self.policy.as_deref(),
        }
        .serialize(serializer)
    }
}
