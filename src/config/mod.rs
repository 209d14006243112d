//! Configuration module for the S3 adaptor
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.
//!
//! # Example
//!
//! ```yaml
//! client:
//!   region: eu-west-1
//!   endpoint: "${S3_ENDPOINT:-http://localhost:9000}"
//!   force_path_style: true
//!   auth:
//!     type: static
//!     access_key_id: "${AWS_ACCESS_KEY_ID}"
//!     secret_access_key: "${AWS_SECRET_ACCESS_KEY}"
//! transfer:
//!   part_size: 8388608
//! presign:
//!   default_expiration_minutes: 30
//! errors:
//!   namespace: aws.s3
//! ```

use crate::error::DEFAULT_NAMESPACE;
use crate::transfer::{MAX_PRESIGN_EXPIRATION_MINUTES, MIN_PART_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub presign: PresignConfig,
    #[serde(default)]
    pub errors: ErrorsConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.region.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "client.region cannot be empty".into(),
            ));
        }

        if let Some(ref endpoint) = self.client.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid endpoint '{}': must start with http:// or https://",
                    endpoint
                )));
            }
        }

        match &self.client.auth {
            Some(AuthConfig::Static {
                access_key_id,
                secret_access_key,
                ..
            }) => {
                if access_key_id.is_empty() || secret_access_key.is_empty() {
                    return Err(ConfigError::ValidationError(
                        "Static credentials need both access_key_id and secret_access_key".into(),
                    ));
                }
            }
            Some(AuthConfig::Profile { profile_name, .. }) => {
                if profile_name.trim().is_empty() {
                    return Err(ConfigError::ValidationError(
                        "Profile credentials need a profile_name".into(),
                    ));
                }
            }
            None => {}
        }

        let transfer = &self.transfer;
        if transfer.read_buffer_size == 0 || transfer.download_chunk_size == 0 {
            return Err(ConfigError::ValidationError(
                "read_buffer_size and download_chunk_size must be positive".into(),
            ));
        }
        if transfer.part_size < MIN_PART_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "part_size {} is below the minimum of {} bytes",
                transfer.part_size, MIN_PART_SIZE
            )));
        }
        if transfer.concurrent_parts == 0 {
            return Err(ConfigError::ValidationError(
                "concurrent_parts must be at least 1".into(),
            ));
        }

        let expiration = self.presign.default_expiration_minutes;
        if expiration == 0 || expiration > MAX_PRESIGN_EXPIRATION_MINUTES {
            return Err(ConfigError::ValidationError(format!(
                "default_expiration_minutes {} must be between 1 and {}",
                expiration, MAX_PRESIGN_EXPIRATION_MINUTES
            )));
        }

        if self.errors.namespace.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "errors.namespace cannot be empty".into(),
            ));
        }

        Ok(())
    }
}

/// Service client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack, ...)
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    /// Falls back to the SDK's default credential chain when absent
    #[serde(default)]
    pub auth: Option<AuthConfig>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            force_path_style: false,
            auth: None,
        }
    }
}

impl ClientConfig {
    /// Get the endpoint URL
    pub fn endpoint(&self) -> String {
        self.endpoint
            .clone()
            .unwrap_or_else(|| format!("https://s3.{}.amazonaws.com", self.region))
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Credential source
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AuthConfig {
    #[serde(rename = "static")]
    Static {
        access_key_id: String,
        secret_access_key: String,
        #[serde(default)]
        session_token: Option<String>,
    },
    #[serde(rename = "profile")]
    Profile {
        profile_name: String,
        #[serde(default)]
        credentials_file: Option<PathBuf>,
    },
}

/// Transfer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Read size used when buffering a streamed upload body
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,
    /// Maximum bytes returned per download read
    #[serde(default = "default_download_chunk_size")]
    pub download_chunk_size: usize,
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: u64,
    #[serde(default = "default_part_size")]
    pub part_size: usize,
    #[serde(default = "default_concurrent_parts")]
    pub concurrent_parts: usize,
    #[serde(default = "default_bucket_wait_attempts")]
    pub bucket_wait_attempts: u32,
    #[serde(default = "default_bucket_wait_interval_ms")]
    pub bucket_wait_interval_ms: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: default_read_buffer_size(),
            download_chunk_size: default_download_chunk_size(),
            multipart_threshold: default_multipart_threshold(),
            part_size: default_part_size(),
            concurrent_parts: default_concurrent_parts(),
            bucket_wait_attempts: default_bucket_wait_attempts(),
            bucket_wait_interval_ms: default_bucket_wait_interval_ms(),
        }
    }
}

fn default_read_buffer_size() -> usize {
    8192
}

fn default_download_chunk_size() -> usize {
    4096
}

fn default_multipart_threshold() -> u64 {
    52428800 // 50MB
}

fn default_part_size() -> usize {
    16777216 // 16MB
}

fn default_concurrent_parts() -> usize {
    4
}

fn default_bucket_wait_attempts() -> u32 {
    20
}

fn default_bucket_wait_interval_ms() -> u64 {
    250
}

/// Presigned URL configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresignConfig {
    #[serde(default = "default_expiration_minutes")]
    pub default_expiration_minutes: u32,
}

impl Default for PresignConfig {
    fn default() -> Self {
        Self {
            default_expiration_minutes: default_expiration_minutes(),
        }
    }
}

fn default_expiration_minutes() -> u32 {
    15
}

/// Error tagging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorsConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for ErrorsConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}
