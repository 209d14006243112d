//! Typed requests and responses exchanged with an [`ObjectStore`](super::ObjectStore)
//!
//! Each request type carries its identity (bucket, key, upload id) as plain
//! fields and declares the optional fields it accepts through a
//! [`Bindable`] table.

use crate::binder::{Bindable, Binding, Setter};
use crate::stream::ChunkSource;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Storage class reported when the service omits one
pub const DEFAULT_STORAGE_CLASS: &str = "STANDARD";

/// Region meaning "no location constraint"
pub const DEFAULT_REGION: &str = "us-east-1";

/// Characters escaped in a copy source; unreserved characters and `/` pass through
const COPY_SOURCE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Request body handed to a store
#[derive(Debug, Clone)]
pub enum Payload {
    Bytes(Bytes),
    File(PathBuf),
}

/// Optional attributes of a stored object
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectAttributes {
    pub content_type: Option<String>,
    pub acl: Option<String>,
    pub storage_class: Option<String>,
    pub cache_control: Option<String>,
    pub content_disposition: Option<String>,
    pub content_encoding: Option<String>,
    pub content_language: Option<String>,
    pub tagging: Option<String>,
    pub server_side_encryption: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateBucketRequest {
    pub bucket: String,
    /// Location constraint; `None` for the default region
    pub location: Option<String>,
    pub acl: Option<String>,
    pub object_ownership: Option<String>,
    pub object_lock_enabled: Option<bool>,
}

impl CreateBucketRequest {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }
}

impl Bindable for CreateBucketRequest {
    const FIELDS: &'static [Binding<Self>] = &[
        Binding::new("acl", Setter::Str(|r, v| r.acl = Some(v))),
        Binding::new("objectOwnership", Setter::Str(|r, v| r.object_ownership = Some(v))),
        Binding::new("objectLockEnabled", Setter::Bool(|r, v| r.object_lock_enabled = Some(v))),
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectRequest {
    pub bucket: String,
    pub key: String,
    pub attributes: ObjectAttributes,
}

impl PutObjectRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            attributes: ObjectAttributes::default(),
        }
    }
}

impl Bindable for PutObjectRequest {
    const FIELDS: &'static [Binding<Self>] = &[
        Binding::new("contentType", Setter::Str(|r, v| r.attributes.content_type = Some(v))),
        Binding::new("acl", Setter::Str(|r, v| r.attributes.acl = Some(v))),
        Binding::new("storageClass", Setter::Str(|r, v| r.attributes.storage_class = Some(v))),
        Binding::new("cacheControl", Setter::Str(|r, v| r.attributes.cache_control = Some(v))),
        Binding::new(
            "contentDisposition",
            Setter::Str(|r, v| r.attributes.content_disposition = Some(v)),
        ),
        Binding::new("contentEncoding", Setter::Str(|r, v| r.attributes.content_encoding = Some(v))),
        Binding::new("contentLanguage", Setter::Str(|r, v| r.attributes.content_language = Some(v))),
        Binding::new("tagging", Setter::Str(|r, v| r.attributes.tagging = Some(v))),
        Binding::new(
            "serverSideEncryption",
            Setter::Str(|r, v| r.attributes.server_side_encryption = Some(v)),
        ),
        Binding::new("metadata", Setter::Map(|r, v| r.attributes.metadata = Some(v))),
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetObjectRequest {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
    pub range: Option<String>,
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<DateTime<Utc>>,
    pub if_unmodified_since: Option<DateTime<Utc>>,
    pub part_number: Option<i32>,
}

impl GetObjectRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            ..Default::default()
        }
    }
}

impl Bindable for GetObjectRequest {
    const FIELDS: &'static [Binding<Self>] = &[
        Binding::new("versionId", Setter::Str(|r, v| r.version_id = Some(v))),
        Binding::new("range", Setter::Str(|r, v| r.range = Some(v))),
        Binding::new("ifMatch", Setter::Str(|r, v| r.if_match = Some(v))),
        Binding::new("ifNoneMatch", Setter::Str(|r, v| r.if_none_match = Some(v))),
        Binding::new("ifModifiedSince", Setter::Timestamp(|r, v| r.if_modified_since = Some(v))),
        Binding::new(
            "ifUnmodifiedSince",
            Setter::Timestamp(|r, v| r.if_unmodified_since = Some(v)),
        ),
        Binding::new("partNumber", Setter::Int(|r, v| r.part_number = Some(v))),
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteObjectRequest {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
    pub mfa: Option<String>,
    pub bypass_governance_retention: Option<bool>,
}

impl DeleteObjectRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            ..Default::default()
        }
    }
}

impl Bindable for DeleteObjectRequest {
    const FIELDS: &'static [Binding<Self>] = &[
        Binding::new("versionId", Setter::Str(|r, v| r.version_id = Some(v))),
        Binding::new("mfa", Setter::Str(|r, v| r.mfa = Some(v))),
        Binding::new(
            "bypassGovernanceRetention",
            Setter::Bool(|r, v| r.bypass_governance_retention = Some(v)),
        ),
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsRequest {
    pub bucket: String,
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub max_keys: Option<i32>,
    pub continuation_token: Option<String>,
    pub start_after: Option<String>,
    pub fetch_owner: Option<bool>,
}

impl ListObjectsRequest {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }
}

impl Bindable for ListObjectsRequest {
    const FIELDS: &'static [Binding<Self>] = &[
        Binding::new("prefix", Setter::Str(|r, v| r.prefix = Some(v))),
        Binding::new("delimiter", Setter::Str(|r, v| r.delimiter = Some(v))),
        Binding::new("maxKeys", Setter::Int(|r, v| r.max_keys = Some(v))),
        Binding::new("continuationToken", Setter::Str(|r, v| r.continuation_token = Some(v))),
        Binding::new("startAfter", Setter::Str(|r, v| r.start_after = Some(v))),
        Binding::new("fetchOwner", Setter::Bool(|r, v| r.fetch_owner = Some(v))),
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadObjectRequest {
    pub bucket: String,
    pub key: String,
    pub version_id: Option<String>,
    pub part_number: Option<i32>,
}

impl HeadObjectRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            ..Default::default()
        }
    }
}

impl Bindable for HeadObjectRequest {
    const FIELDS: &'static [Binding<Self>] = &[
        Binding::new("versionId", Setter::Str(|r, v| r.version_id = Some(v))),
        Binding::new("partNumber", Setter::Int(|r, v| r.part_number = Some(v))),
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyObjectRequest {
    pub source_bucket: String,
    pub source_key: String,
    pub bucket: String,
    pub key: String,
    pub acl: Option<String>,
    pub storage_class: Option<String>,
    pub metadata_directive: Option<String>,
    pub content_type: Option<String>,
    pub metadata: Option<HashMap<String, String>>,
}

impl CopyObjectRequest {
    pub fn new(
        source_bucket: impl Into<String>,
        source_key: impl Into<String>,
        bucket: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            source_bucket: source_bucket.into(),
            source_key: source_key.into(),
            bucket: bucket.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    /// `bucket/key` form of the copy source, URL-encoded for the
    /// `x-amz-copy-source` header
    pub fn copy_source(&self) -> String {
        format!(
            "{}/{}",
            utf8_percent_encode(&self.source_bucket, COPY_SOURCE),
            utf8_percent_encode(&self.source_key, COPY_SOURCE)
        )
    }
}

impl Bindable for CopyObjectRequest {
    const FIELDS: &'static [Binding<Self>] = &[
        Binding::new("acl", Setter::Str(|r, v| r.acl = Some(v))),
        Binding::new("storageClass", Setter::Str(|r, v| r.storage_class = Some(v))),
        Binding::new("metadataDirective", Setter::Str(|r, v| r.metadata_directive = Some(v))),
        Binding::new("contentType", Setter::Str(|r, v| r.content_type = Some(v))),
        Binding::new("metadata", Setter::Map(|r, v| r.metadata = Some(v))),
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateMultipartRequest {
    pub bucket: String,
    pub key: String,
    pub attributes: ObjectAttributes,
}

impl CreateMultipartRequest {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            attributes: ObjectAttributes::default(),
        }
    }
}

impl Bindable for CreateMultipartRequest {
    const FIELDS: &'static [Binding<Self>] = &[
        Binding::new("contentType", Setter::Str(|r, v| r.attributes.content_type = Some(v))),
        Binding::new("acl", Setter::Str(|r, v| r.attributes.acl = Some(v))),
        Binding::new("storageClass", Setter::Str(|r, v| r.attributes.storage_class = Some(v))),
        Binding::new("tagging", Setter::Str(|r, v| r.attributes.tagging = Some(v))),
        Binding::new(
            "serverSideEncryption",
            Setter::Str(|r, v| r.attributes.server_side_encryption = Some(v)),
        ),
        Binding::new("metadata", Setter::Map(|r, v| r.attributes.metadata = Some(v))),
    ];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadPartRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub part_number: i32,
    pub content_md5: Option<String>,
}

impl UploadPartRequest {
    pub fn new(
        bucket: impl Into<String>,
        key: impl Into<String>,
        upload_id: impl Into<String>,
        part_number: i32,
    ) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            upload_id: upload_id.into(),
            part_number,
            content_md5: None,
        }
    }
}

impl Bindable for UploadPartRequest {
    const FIELDS: &'static [Binding<Self>] =
        &[Binding::new("contentMD5", Setter::Str(|r, v| r.content_md5 = Some(v)))];
}

/// One uploaded part, as reported back to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: i32,
    pub etag: String,
}

impl CompletedPart {
    pub fn new(part_number: i32, etag: impl Into<String>) -> Self {
        Self {
            part_number,
            etag: etag.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteMultipartRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
    pub parts: Vec<CompletedPart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbortMultipartRequest {
    pub bucket: String,
    pub key: String,
    pub upload_id: String,
}

/// HTTP method a presigned URL is valid for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresignMethod {
    Get,
    Put,
}

impl PresignMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresignMethod::Get => "GET",
            PresignMethod::Put => "PUT",
        }
    }
}

impl fmt::Display for PresignMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PresignMethod {
    type Err = String;

    /// Case-insensitive; only GET and PUT are accepted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(PresignMethod::Get),
            "PUT" => Ok(PresignMethod::Put),
            other => Err(format!(
                "unsupported presign method '{}', expected GET or PUT",
                other
            )),
        }
    }
}

/// Caller-facing presign options, validated before a [`PresignRequest`] is built
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresignOptions {
    pub http_method: Option<String>,
    pub expiration_minutes: Option<i32>,
    pub version_id: Option<String>,
    pub response_content_type: Option<String>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

impl Bindable for PresignOptions {
    const FIELDS: &'static [Binding<Self>] = &[
        Binding::new("httpMethod", Setter::Str(|r, v| r.http_method = Some(v))),
        Binding::new("expirationMinutes", Setter::Int(|r, v| r.expiration_minutes = Some(v))),
        Binding::new("versionId", Setter::Str(|r, v| r.version_id = Some(v))),
        Binding::new(
            "responseContentType",
            Setter::Str(|r, v| r.response_content_type = Some(v)),
        ),
        Binding::new("contentType", Setter::Str(|r, v| r.content_type = Some(v))),
        Binding::new("contentDisposition", Setter::Str(|r, v| r.content_disposition = Some(v))),
    ];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresignRequest {
    pub bucket: String,
    pub key: String,
    pub method: PresignMethod,
    pub expires_in: Duration,
    pub version_id: Option<String>,
    pub response_content_type: Option<String>,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

/// Result of a put or a completed multipart upload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutObjectOutput {
    pub etag: Option<String>,
    pub version_id: Option<String>,
}

/// Bucket as listed by the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketEntry {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
}

/// Bucket enriched with its region
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BucketInfo {
    pub name: String,
    pub creation_date: Option<DateTime<Utc>>,
    /// Empty when the location lookup failed
    pub region: String,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub storage_class: Option<String>,
}

/// One page of a listing
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct ObjectListing {
    pub objects: Vec<ObjectSummary>,
    pub count: usize,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
    pub common_prefixes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub content_length: i64,
    pub content_type: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub storage_class: String,
    pub version_id: Option<String>,
    pub metadata: HashMap<String, String>,
}

/// Live object body
pub type ObjectBody = Box<dyn ChunkSource>;

/// Result of a get: metadata plus a live body
pub struct GetObjectOutput {
    pub metadata: ObjectMetadata,
    pub body: ObjectBody,
}

impl fmt::Debug for GetObjectOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetObjectOutput")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}
