//! Client error types

use serde::Deserialize;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP transport error (connect, timeout, body read)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Error document returned by the storage service
    #[error("S3 error ({code}): {message}")]
    S3Error {
        status: u16,
        code: String,
        message: String,
        request_id: Option<String>,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// XML encoding or decoding error
    #[error("XML error: {0}")]
    Xml(String),

    /// Response that could not be interpreted
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename = "Error")]
struct ErrorDocument {
    #[serde(rename = "Code", default)]
    code: Option<String>,
    #[serde(rename = "Message", default)]
    message: Option<String>,
    #[serde(rename = "RequestId", default)]
    request_id: Option<String>,
}

impl ClientError {
    /// Build a service error from its parts
    pub fn s3(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::S3Error {
            status,
            code: code.into(),
            message: message.into(),
            request_id: None,
        }
    }

    /// Parse an S3 error from an XML response body.
    ///
    /// HEAD responses and some proxies return an empty body, in which case the
    /// code falls back to `HTTP<status>`.
    pub fn from_s3_xml(xml: &str, status: u16) -> Self {
        let doc: ErrorDocument = quick_xml::de::from_str(xml).unwrap_or_default();

        Self::S3Error {
            status,
            code: doc.code.unwrap_or_else(|| format!("HTTP{}", status)),
            message: doc.message.unwrap_or_else(|| "Unknown error".to_string()),
            request_id: doc.request_id,
        }
    }

    /// HTTP status reported by the service, if the request got that far
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::S3Error { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Service error code, or a client-side code for local failures
    pub fn code(&self) -> &str {
        match self {
            Self::S3Error { code, .. } => code,
            Self::Http(_) => "RequestError",
            Self::Config(_) => "ConfigError",
            Self::Xml(_) | Self::InvalidResponse(_) => "SerializationError",
        }
    }

    /// Error message without the code prefix
    pub fn message(&self) -> String {
        match self {
            Self::S3Error { message, .. } => message.clone(),
            Self::Http(e) => e.to_string(),
            Self::Config(m) | Self::Xml(m) | Self::InvalidResponse(m) => m.clone(),
        }
    }

    /// Check if this error means the bucket does not exist
    pub fn is_no_such_bucket(&self) -> bool {
        matches!(self, Self::S3Error { status: 404, .. })
            || matches!(self, Self::S3Error { code, .. } if code == "NoSuchBucket")
    }
}

impl From<quick_xml::de::DeError> for ClientError {
    fn from(err: quick_xml::de::DeError) -> Self {
        ClientError::Xml(err.to_string())
    }
}

impl From<quick_xml::se::SeError> for ClientError {
    fn from(err: quick_xml::se::SeError) -> Self {
        ClientError::Xml(err.to_string())
    }
}
