//! Error taxonomy
//!
//! Backend faults arrive as a loose `(code, message)` pair. [`classify`] folds
//! the service code into a closed set of [`ErrorKind`]s so callers can branch
//! on meaning instead of on transport status codes or string codes.
//!
//! # Example
//!
//! ```
//! use s3_adaptor::error::{classify, ErrorKind, ErrorScope, ServiceFault};
//!
//! assert_eq!(classify(Some("NoSuchKey")), ErrorKind::ObjectNotFound);
//! assert_eq!(classify(Some("SlowDown")), ErrorKind::Generic);
//!
//! let scope = ErrorScope::new("aws.s3");
//! let err = scope.fault(ServiceFault::new(Some("NoSuchBucket"), "bucket is gone"));
//! assert_eq!(err.kind(), ErrorKind::BucketNotFound);
//! assert_eq!(err.to_string(), "aws.s3:NoSuchBucketError: bucket is gone");
//! ```

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Default namespace used to tag errors
pub const DEFAULT_NAMESPACE: &str = "aws.s3";

/// Semantic error kinds
///
/// The first six kinds come from service faults via [`classify`]. The last
/// two are raised locally by the adaptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Generic,
    ObjectNotFound,
    BucketAlreadyExists,
    BucketAlreadyOwnedByCaller,
    BucketNotFound,
    BucketNotEmpty,
    /// Caller-supplied input is malformed
    Validation,
    /// A streamed body or download could not be read
    Connectivity,
}

impl ErrorKind {
    /// Error type name, as exposed to callers
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Generic => "Error",
            ErrorKind::ObjectNotFound => "NoSuchKeyError",
            ErrorKind::BucketAlreadyExists => "BucketAlreadyExistsError",
            ErrorKind::BucketAlreadyOwnedByCaller => "BucketAlreadyOwnedByYouError",
            ErrorKind::BucketNotFound => "NoSuchBucketError",
            ErrorKind::BucketNotEmpty => "BucketNotEmptyError",
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Connectivity => "ConnectivityError",
        }
    }

    /// Short label for metrics
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::Generic => "generic",
            ErrorKind::ObjectNotFound => "object_not_found",
            ErrorKind::BucketAlreadyExists => "bucket_already_exists",
            ErrorKind::BucketAlreadyOwnedByCaller => "bucket_already_owned",
            ErrorKind::BucketNotFound => "bucket_not_found",
            ErrorKind::BucketNotEmpty => "bucket_not_empty",
            ErrorKind::Validation => "validation",
            ErrorKind::Connectivity => "connectivity",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Service code to kind table
const CODE_TABLE: &[(&str, ErrorKind)] = &[
    ("NoSuchKey", ErrorKind::ObjectNotFound),
    ("BucketAlreadyExists", ErrorKind::BucketAlreadyExists),
    ("BucketAlreadyOwnedByYou", ErrorKind::BucketAlreadyOwnedByCaller),
    ("NoSuchBucket", ErrorKind::BucketNotFound),
    ("BucketNotEmpty", ErrorKind::BucketNotEmpty),
];

/// Classify a service error code
///
/// Pure and total: absent or unrecognized codes map to [`ErrorKind::Generic`].
pub fn classify(code: Option<&str>) -> ErrorKind {
    let Some(code) = code else {
        return ErrorKind::Generic;
    };

    CODE_TABLE
        .iter()
        .find(|(mapped, _)| *mapped == code)
        .map(|(_, kind)| *kind)
        .unwrap_or(ErrorKind::Generic)
}

/// Raw fault reported by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFault {
    pub code: Option<String>,
    pub message: String,
}

impl ServiceFault {
    pub fn new(code: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            code: code.map(str::to_string),
            message: message.into(),
        }
    }

    /// Fault carrying a service code
    pub fn coded(code: &str, message: impl Into<String>) -> Self {
        Self::new(Some(code), message)
    }

    /// Fault without a service code (transport, local I/O, ...)
    pub fn uncoded(message: impl Into<String>) -> Self {
        Self::new(None, message)
    }

    pub fn kind(&self) -> ErrorKind {
        classify(self.code.as_deref())
    }
}

impl fmt::Display for ServiceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{}: {}", code, self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Error returned by every adaptor operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{namespace}:{kind}: {message}")]
pub struct AdaptorError {
    kind: ErrorKind,
    namespace: Arc<str>,
    code: Option<String>,
    message: String,
}

impl AdaptorError {
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Service code, when the error came from a backend fault
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::ObjectNotFound | ErrorKind::BucketNotFound
        )
    }
}

/// Result alias for adaptor operations
pub type Result<T> = std::result::Result<T, AdaptorError>;

/// Error constructor bound to a namespace
///
/// The namespace is configuration; it is passed in when the client is built.
#[derive(Debug, Clone)]
pub struct ErrorScope {
    namespace: Arc<str>,
}

impl Default for ErrorScope {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}

impl ErrorScope {
    pub fn new(namespace: impl AsRef<str>) -> Self {
        Self {
            namespace: Arc::from(namespace.as_ref()),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Classify a backend fault
    pub fn fault(&self, fault: ServiceFault) -> AdaptorError {
        AdaptorError {
            kind: fault.kind(),
            namespace: self.namespace.clone(),
            code: fault.code,
            message: fault.message,
        }
    }

    pub fn validation(&self, message: impl Into<String>) -> AdaptorError {
        self.local(ErrorKind::Validation, message)
    }

    pub fn connectivity(&self, message: impl Into<String>) -> AdaptorError {
        self.local(ErrorKind::Connectivity, message)
    }

    fn local(&self, kind: ErrorKind, message: impl Into<String>) -> AdaptorError {
        AdaptorError {
            kind,
            namespace: self.namespace.clone(),
            code: None,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_mapped_codes() {
        for (code, kind) in CODE_TABLE {
            assert_eq!(classify(Some(code)), *kind, "code {}", code);
        }
    }

    #[test]
    fn test_classify_unmapped_and_absent() {
        assert_eq!(classify(None), ErrorKind::Generic);
        assert_eq!(classify(Some("")), ErrorKind::Generic);
        assert_eq!(classify(Some("AccessDenied")), ErrorKind::Generic);
        // Codes are case-sensitive
        assert_eq!(classify(Some("nosuchkey")), ErrorKind::Generic);
    }

    #[test]
    fn test_scope_tags_namespace() {
        let scope = ErrorScope::new("ballast");
        let err = scope.fault(ServiceFault::coded("BucketNotEmpty", "has objects"));

        assert_eq!(err.namespace(), "ballast");
        assert_eq!(err.kind(), ErrorKind::BucketNotEmpty);
        assert_eq!(err.code(), Some("BucketNotEmpty"));
        assert_eq!(err.to_string(), "ballast:BucketNotEmptyError: has objects");
    }

    #[test]
    fn test_local_errors_have_no_code() {
        let scope = ErrorScope::default();
        let err = scope.validation("bad method");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.code().is_none());
        assert_eq!(err.namespace(), DEFAULT_NAMESPACE);

        let err = scope.connectivity("stream broke");
        assert_eq!(err.kind(), ErrorKind::Connectivity);
    }

    #[test]
    fn test_fault_display() {
        assert_eq!(
            ServiceFault::coded("NoSuchKey", "missing").to_string(),
            "NoSuchKey: missing"
        );
        assert_eq!(ServiceFault::uncoded("timeout").to_string(), "timeout");
    }
}
