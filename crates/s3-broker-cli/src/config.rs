//! Broker configuration

use config::{Config, Environment, File, FileFormat};
use s3_broker_client::{Credentials, DEFAULT_REGION};
use s3_broker_core::DEFAULT_PARTITION;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Prefix for environment overrides, e.g. `S3_BROKER__S3__REGION`
pub const ENV_PREFIX: &str = "S3_BROKER";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// File or environment could not be read or deserialized
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// Configuration loaded but is not usable
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level broker configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Log level for the broker crates
    pub log_level: String,
    /// Object storage settings
    pub s3: S3Settings,
}

/// Object storage connection settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    /// Service endpoint
    pub endpoint: String,
    /// Region for signing and new buckets
    pub region: String,
    /// ARN partition
    pub partition: String,
    /// Access key ID
    pub access_key_id: Option<String>,
    /// Secret access key
    pub secret_access_key: Option<String>,
    /// Session token for temporary credentials
    pub session_token: Option<String>,
    /// Request timeout (seconds)
    pub timeout_secs: u64,
    /// Default policy template for new buckets
    pub policy: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            s3: S3Settings::default(),
        }
    }
}

impl Default for S3Settings {
    fn default() -> Self {
        Self {
            endpoint: "https://s3.amazonaws.com".to_string(),
            region: DEFAULT_REGION.to_string(),
            partition: DEFAULT_PARTITION.to_string(),
            access_key_id: None,
            secret_access_key: None,
            session_token: None,
            timeout_secs: 30,
            policy: None,
        }
    }
}

impl std::fmt::Debug for S3Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Settings")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("partition", &self.partition)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("policy", &self.policy.is_some())
            .finish()
    }
}

impl BrokerConfig {
    /// Load defaults, then `path` (if any), then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(path, Self::environment())
    }

    /// `S3_BROKER__<SECTION>__<KEY>` variables, e.g. `S3_BROKER__S3__REGION`
    pub fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
    }

    fn load_from(path: Option<&Path>, environment: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Json));
        }

        let config: Self = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.log_level.is_empty() {
            return Err(ConfigError::Invalid("log_level must not be empty".into()));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "log_level must be one of {}, got {:?}",
                LOG_LEVELS.join("|"),
                self.log_level
            )));
        }

        for (name, value) in [
            ("s3.endpoint", &self.s3.endpoint),
            ("s3.region", &self.s3.region),
            ("s3.partition", &self.s3.partition),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{} must not be empty", name)));
            }
        }

        match (&self.s3.access_key_id, &self.s3.secret_access_key) {
            (Some(_), None) | (None, Some(_)) => Err(ConfigError::Invalid(
                "s3.access_key_id and s3.secret_access_key must be set together".into(),
            )),
            _ => Ok(()),
        }
    }

    /// Settings for the S3 client
    pub fn client_config(&self) -> s3_broker_client::Config {
        let mut config = s3_broker_client::Config::new(&self.s3.endpoint)
            .with_region(&self.s3.region)
            .with_timeout(Duration::from_secs(self.s3.timeout_secs));

        if let (Some(id), Some(secret)) = (&self.s3.access_key_id, &self.s3.secret_access_key) {
            let mut credentials = Credentials::new(id, secret);
            if let Some(token) = &self.s3.session_token {
                credentials = credentials.with_session_token(token);
            }
            config = config.with_credentials(credentials);
        }

        config
    }
}
