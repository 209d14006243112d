//! S3 Credentials Module
//!
//! Resolves the configured [`AuthConfig`] into an SDK credentials provider.
//!
//! # Sources
//!
//! - `static` - access key, secret and optional session token from config
//! - `profile` - a named profile from the shared credentials file, optionally
//!   at a custom path
//! - none configured - the SDK's default chain (environment, profile, IMDS...)
//!
//! # Example
//!
//! ```
//! use s3_adaptor::s3::Credentials;
//!
//! let creds = Credentials::with_session_token("access-key", "secret-key", "token");
//! assert_eq!(creds.access_key_id(), "access-key");
//! assert_eq!(creds.session_token(), Some("token"));
//! ```

use crate::config::AuthConfig;
use aws_config::profile::ProfileFileCredentialsProvider;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_runtime::env_config::file::{EnvConfigFileKind, EnvConfigFiles};
use std::path::Path;
use thiserror::Error;

/// Provider name reported to the SDK for static credentials
const STATIC_PROVIDER_NAME: &str = "s3-adaptor-static";

/// Credential loading errors
#[derive(Error, Debug)]
pub enum CredentialsError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),
}

/// Static credential values
#[derive(Clone)]
pub struct Credentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"** redacted **")
            .field("session_token", &self.session_token.as_ref().map(|_| "** redacted **"))
            .finish()
    }
}

impl Credentials {
    /// Create new credentials
    pub fn new(access_key_id: impl Into<String>, secret_access_key: impl Into<String>) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: None,
        }
    }

    /// Create credentials with session token (for temporary credentials)
    pub fn with_session_token(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token: Some(session_token.into()),
        }
    }

    pub fn access_key_id(&self) -> &str {
        &self.access_key_id
    }

    pub fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }

    pub fn session_token(&self) -> Option<&str> {
        self.session_token.as_deref()
    }

    /// Convert into the SDK's credential type
    pub fn into_sdk(self) -> aws_credential_types::Credentials {
        aws_credential_types::Credentials::new(
            self.access_key_id,
            self.secret_access_key,
            self.session_token,
            None,
            STATIC_PROVIDER_NAME,
        )
    }
}

/// Factory for SDK credential providers
pub struct CredentialsProvider;

impl CredentialsProvider {
    /// Build static credentials from config values
    pub fn from_static(
        access_key_id: &str,
        secret_access_key: &str,
        session_token: Option<&str>,
    ) -> Result<Credentials, CredentialsError> {
        if access_key_id.is_empty() {
            return Err(CredentialsError::MissingCredentials(
                "access_key_id not set in config".into(),
            ));
        }
        if secret_access_key.is_empty() {
            return Err(CredentialsError::MissingCredentials(
                "secret_access_key not set in config".into(),
            ));
        }

        Ok(match session_token.filter(|t| !t.is_empty()) {
            Some(token) => Credentials::with_session_token(access_key_id, secret_access_key, token),
            None => Credentials::new(access_key_id, secret_access_key),
        })
    }

    /// Build a named-profile provider
    pub fn from_profile(
        profile_name: &str,
        credentials_file: Option<&Path>,
    ) -> Result<ProfileFileCredentialsProvider, CredentialsError> {
        if profile_name.trim().is_empty() {
            return Err(CredentialsError::InvalidCredentials(
                "profile_name cannot be empty".into(),
            ));
        }

        let mut builder = ProfileFileCredentialsProvider::builder().profile_name(profile_name);
        if let Some(path) = credentials_file {
            if !path.exists() {
                return Err(CredentialsError::MissingCredentials(format!(
                    "credentials file {} does not exist",
                    path.display()
                )));
            }
            let files = EnvConfigFiles::builder()
                .with_file(EnvConfigFileKind::Credentials, path)
                .build();
            builder = builder.profile_files(files);
        }
        Ok(builder.build())
    }

    /// Resolve the configured source
    ///
    /// Returns `None` when no source is configured and the SDK default chain
    /// should be used.
    pub fn from_config(
        auth: Option<&AuthConfig>,
    ) -> Result<Option<SharedCredentialsProvider>, CredentialsError> {
        match auth {
            Some(AuthConfig::Static {
                access_key_id,
                secret_access_key,
                session_token,
            }) => {
                let creds =
                    Self::from_static(access_key_id, secret_access_key, session_token.as_deref())?;
                Ok(Some(SharedCredentialsProvider::new(creds.into_sdk())))
            }
            Some(AuthConfig::Profile {
                profile_name,
                credentials_file,
            }) => {
                let provider = Self::from_profile(profile_name, credentials_file.as_deref())?;
                Ok(Some(SharedCredentialsProvider::new(provider)))
            }
            None => Ok(None),
        }
    }
}
