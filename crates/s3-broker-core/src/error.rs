//! Error types for the s3-broker-core crate

use crate::{store::DeletePhase, template::TemplateError};
use s3_broker_client::ClientError;
use thiserror::Error;

/// Result type alias using `BucketError`
pub type Result<T> = std::result::Result<T, BucketError>;

/// Errors returned by bucket lifecycle operations
#[derive(Error, Debug)]
pub enum BucketError {
    /// The bucket does not exist
    #[error("bucket not found: {bucket}")]
    NotFound { bucket: String },

    /// The storage provider rejected a call
    #[error("provider error ({code}): {message}")]
    Provider {
        code: String,
        message: String,
        status: Option<u16>,
    },

    /// Policy template failed to parse or render
    #[error("policy template error: {0}")]
    Template(#[from] TemplateError),

    /// Operation is not supported
    #[error("operation not implemented: {0}")]
    Unimplemented(&'static str),

    /// Caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Delete failed part-way; the bucket may be partially emptied
    #[error("bucket delete failed while {phase}: {source}")]
    Delete {
        phase: DeletePhase,
        source: Box<BucketError>,
    },
}

impl BucketError {
    /// Translate a provider error, normalizing "no such bucket"
    pub fn from_client(bucket: &str, err: ClientError) -> Self {
        if err.is_no_such_bucket() {
            return Self::NotFound {
                bucket: bucket.to_string(),
            };
        }
        Self::Provider {
            code: err.code().to_string(),
            message: err.message(),
            status: err.status(),
        }
    }

    /// Attach the delete phase; `NotFound` is left bare
    pub(crate) fn in_phase(self, phase: DeletePhase) -> Self {
        match self {
            Self::NotFound { .. } | Self::Delete { .. } => self,
            other => Self::Delete {
                phase,
                source: Box::new(other),
            },
        }
    }

    /// Check if the bucket does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Check if the caller cancelled the operation
    pub fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled => true,
            Self::Delete { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }

    /// Provider error code, looking through delete-phase wrapping
    pub fn provider_code(&self) -> Option<&str> {
        match self {
            Self::Provider { code, .. } => Some(code),
            Self::Delete { source, .. } => source.provider_code(),
            _ => None,
        }
    }

    /// Phase a failed delete stopped in
    pub fn phase(&self) -> Option<DeletePhase> {
        match self {
            Self::Delete { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}
