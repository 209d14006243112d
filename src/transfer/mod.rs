//! Transfer orchestrator
//!
//! [`ObjectClient`] is the caller-facing surface. Each operation binds the
//! caller's [`Options`] onto a typed request, resolves the body, issues one
//! call against the configured [`ObjectStore`] and classifies any fault into
//! an [`AdaptorError`].
//!
//! # Example
//!
//! ```
//! use s3_adaptor::backend::memory::MemoryStore;
//! use s3_adaptor::binder::Options;
//! use s3_adaptor::transfer::{ObjectClient, TransferBody};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> s3_adaptor::error::Result<()> {
//! let client = ObjectClient::new(Arc::new(MemoryStore::new()));
//! client.create_bucket("reports", &Options::new()).await?;
//!
//! let options = Options::new().with("contentType", "text/csv");
//! client
//!     .put_object("reports", "q1.csv", TransferBody::from("a,b\n1,2\n"), &options)
//!     .await?;
//!
//! let mut reader = client.get_object("reports", "q1.csv", &Options::new()).await?;
//! assert_eq!(&reader.read_to_end().await?[..], b"a,b\n1,2\n");
//! # Ok(())
//! # }
//! ```
//!
//! # Tracing
//!
//! Every operation opens a span named `s3.<operation>` with `s3.bucket` and,
//! where relevant, `s3.key`. Results such as `s3.etag`, `s3.upload_id` and
//! `transfer.bytes` are recorded on the span once known.

use crate::backend::*;
use crate::binder::{bind, Bindable, Options};
use crate::config::Config;
use crate::error::{AdaptorError, ErrorKind, ErrorScope, Result, ServiceFault};
use crate::metrics;
use crate::s3::{CredentialsError, S3Store};
use crate::stream::{ChunkReader, ChunkSource};
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use std::fmt;
use std::future::Future;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn, Span};

/// Service code for an upload id the service no longer knows
const NO_SUCH_UPLOAD: &str = "NoSuchUpload";

mod download;
mod multipart;

pub use download::ObjectReader;
pub use multipart::{MultipartSession, MultipartState};

/// Minimum part size (5MB) - S3 requirement, except for the last part
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Maximum parts allowed
pub const MAX_PARTS: i32 = 10_000;

/// Longest presigned URL lifetime (7 days)
pub const MAX_PRESIGN_EXPIRATION_MINUTES: u32 = 7 * 24 * 60;

/// Transfer tuning resolved from configuration
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Region buckets are created in
    pub region: String,
    pub read_buffer_size: usize,
    pub download_chunk_size: usize,
    pub multipart_threshold: u64,
    pub part_size: usize,
    pub concurrent_parts: usize,
    pub bucket_wait_attempts: u32,
    pub bucket_wait_interval: Duration,
    pub default_expiration_minutes: u32,
    pub metrics_enabled: bool,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for TransferSettings {
    fn from(config: &Config) -> Self {
        let transfer = &config.transfer;
        Self {
            region: config.client.region.clone(),
            read_buffer_size: transfer.read_buffer_size,
            download_chunk_size: transfer.download_chunk_size,
            multipart_threshold: transfer.multipart_threshold,
            part_size: transfer.part_size,
            concurrent_parts: transfer.concurrent_parts,
            bucket_wait_attempts: transfer.bucket_wait_attempts,
            bucket_wait_interval: Duration::from_millis(transfer.bucket_wait_interval_ms),
            default_expiration_minutes: config.presign.default_expiration_minutes,
            metrics_enabled: config.metrics.enabled,
        }
    }
}

/// Upload body: exactly one of in-memory bytes, a file, or a chunk source
pub enum TransferBody {
    Bytes(Bytes),
    File(PathBuf),
    Stream(Box<dyn ChunkSource>),
}

impl TransferBody {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        TransferBody::File(path.into())
    }

    pub fn stream(source: impl ChunkSource + 'static) -> Self {
        TransferBody::Stream(Box::new(source))
    }
}

impl fmt::Debug for TransferBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferBody::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            TransferBody::File(path) => f.debug_tuple("File").field(path).finish(),
            TransferBody::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for TransferBody {
    fn from(bytes: Bytes) -> Self {
        TransferBody::Bytes(bytes)
    }
}

impl From<Vec<u8>> for TransferBody {
    fn from(bytes: Vec<u8>) -> Self {
        TransferBody::Bytes(Bytes::from(bytes))
    }
}

impl From<&'static str> for TransferBody {
    fn from(text: &'static str) -> Self {
        TransferBody::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

/// Object-storage client
///
/// Cheap to clone; clones share the store and settings.
#[derive(Clone)]
pub struct ObjectClient {
    store: Arc<dyn ObjectStore>,
    scope: ErrorScope,
    settings: Arc<TransferSettings>,
}

impl fmt::Debug for ObjectClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectClient")
            .field("store", &self.store.name())
            .field("namespace", &self.scope.namespace())
            .finish()
    }
}

impl ObjectClient {
    /// Client over `store` with default settings and namespace
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_settings(store, ErrorScope::default(), TransferSettings::default())
    }

    pub fn with_settings(
        store: Arc<dyn ObjectStore>,
        scope: ErrorScope,
        settings: TransferSettings,
    ) -> Self {
        Self {
            store,
            scope,
            settings: Arc::new(settings),
        }
    }

    /// S3-backed client built from configuration
    pub async fn from_config(config: &Config) -> std::result::Result<Self, CredentialsError> {
        let store = S3Store::from_config(&config.client).await?;
        Ok(Self::with_settings(
            Arc::new(store),
            ErrorScope::new(&config.errors.namespace),
            TransferSettings::from(config),
        ))
    }

    pub fn scope(&self) -> &ErrorScope {
        &self.scope
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Buckets
    // ------------------------------------------------------------------

    /// Create a bucket and wait until it is visible
    #[tracing::instrument(name = "s3.create_bucket", skip(self, options), fields(s3.bucket = %bucket), err)]
    pub async fn create_bucket(&self, bucket: &str, options: &Options) -> Result<()> {
        self.observe("create_bucket", async {
            self.require("bucket", bucket)?;
            let mut request = CreateBucketRequest::new(bucket);
            self.bind(&mut request, options)?;
            if self.settings.region != DEFAULT_REGION {
                request.location = Some(self.settings.region.clone());
            }

            self.store
                .create_bucket(request)
                .await
                .map_err(|f| self.scope.fault(f))?;
            self.wait_for_bucket(bucket).await?;

            info!(bucket = %bucket, region = %self.settings.region, "Bucket created");
            Ok(())
        })
        .await
    }

    #[tracing::instrument(name = "s3.delete_bucket", skip(self), fields(s3.bucket = %bucket), err)]
    pub async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.observe("delete_bucket", async {
            self.require("bucket", bucket)?;
            self.store
                .delete_bucket(bucket)
                .await
                .map_err(|f| self.scope.fault(f))?;
            info!(bucket = %bucket, "Bucket deleted");
            Ok(())
        })
        .await
    }

    /// List buckets with their regions
    ///
    /// A failed region lookup leaves that bucket's region empty instead of
    /// failing the listing.
    #[tracing::instrument(name = "s3.list_buckets", skip(self), err)]
    pub async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.observe("list_buckets", async {
            let entries = self
                .store
                .list_buckets()
                .await
                .map_err(|f| self.scope.fault(f))?;

            let lookups = entries.into_iter().map(|entry| async move {
                let region = match self.store.get_bucket_location(&entry.name).await {
                    Ok(Some(region)) if !region.is_empty() => region,
                    Ok(_) => DEFAULT_REGION.to_string(),
                    Err(fault) => {
                        warn!(bucket = %entry.name, error = %fault, "Bucket location lookup failed");
                        String::new()
                    }
                };
                BucketInfo {
                    name: entry.name,
                    creation_date: entry.creation_date,
                    region,
                }
            });
            Ok(futures::future::join_all(lookups).await)
        })
        .await
    }

    #[tracing::instrument(name = "s3.get_bucket_location", skip(self), fields(s3.bucket = %bucket), err)]
    pub async fn get_bucket_location(&self, bucket: &str) -> Result<String> {
        self.observe("get_bucket_location", async {
            self.require("bucket", bucket)?;
            let location = self
                .store
                .get_bucket_location(bucket)
                .await
                .map_err(|f| self.scope.fault(f))?;
            Ok(location
                .filter(|region| !region.is_empty())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()))
        })
        .await
    }

    // ------------------------------------------------------------------
    // Objects
    // ------------------------------------------------------------------

    /// Single-shot upload
    ///
    /// A stream body is buffered in full first, since the request needs its
    /// length up front. The source is closed whether or not the upload
    /// succeeds.
    #[tracing::instrument(
        name = "s3.put_object",
        skip(self, body, options),
        fields(
            s3.bucket = %bucket,
            s3.key = %key,
            s3.etag = tracing::field::Empty,
            transfer.bytes = tracing::field::Empty
        ),
        err
    )]
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: TransferBody,
        options: &Options,
    ) -> Result<()> {
        self.observe("put_object", async {
            let request = match self.prepare_put(bucket, key, options) {
                Ok(request) => request,
                Err(e) => {
                    self.release_body(body).await;
                    return Err(e);
                }
            };
            let payload = self.resolve_body(body).await?;
            let bytes = payload_len(&payload).await;

            let output = self
                .store
                .put_object(request, payload)
                .await
                .map_err(|f| self.scope.fault(f))?;

            let span = Span::current();
            if let Some(etag) = &output.etag {
                span.record("s3.etag", etag.as_str());
            }
            if let Some(bytes) = bytes {
                span.record("transfer.bytes", bytes);
                if self.settings.metrics_enabled {
                    metrics::record_upload_bytes(bytes);
                }
            }
            info!(etag = ?output.etag, bytes = ?bytes, "PutObject completed");
            Ok(())
        })
        .await
    }

    /// Single-shot download
    ///
    /// The returned reader holds the response open until it reaches the end,
    /// is closed, or is dropped.
    #[tracing::instrument(name = "s3.get_object", skip(self, options), fields(s3.bucket = %bucket, s3.key = %key), err)]
    pub async fn get_object(&self, bucket: &str, key: &str, options: &Options) -> Result<ObjectReader> {
        self.observe("get_object", async {
            self.require("bucket", bucket)?;
            self.require("key", key)?;
            let mut request = GetObjectRequest::new(bucket, key);
            self.bind(&mut request, options)?;

            let output = self
                .store
                .get_object(request)
                .await
                .map_err(|f| self.scope.fault(f))?;
            Ok(ObjectReader::new(
                output,
                self.scope.clone(),
                self.settings.download_chunk_size,
                self.settings.metrics_enabled,
            ))
        })
        .await
    }

    /// Delete an object; a missing object is not an error
    #[tracing::instrument(name = "s3.delete_object", skip(self, options), fields(s3.bucket = %bucket, s3.key = %key), err)]
    pub async fn delete_object(&self, bucket: &str, key: &str, options: &Options) -> Result<()> {
        self.observe("delete_object", async {
            self.require("bucket", bucket)?;
            self.require("key", key)?;
            let mut request = DeleteObjectRequest::new(bucket, key);
            self.bind(&mut request, options)?;

            match self.store.delete_object(request).await {
                Ok(()) => {
                    info!("Object deleted");
                    Ok(())
                }
                Err(fault) if fault.kind() == ErrorKind::ObjectNotFound => {
                    warn!(error = %fault, "Object already absent, treating delete as done");
                    Ok(())
                }
                Err(fault) => Err(self.scope.fault(fault)),
            }
        })
        .await
    }

    /// One page of a listing; no auto-pagination
    #[tracing::instrument(name = "s3.list_objects", skip(self, options), fields(s3.bucket = %bucket), err)]
    pub async fn list_objects(&self, bucket: &str, options: &Options) -> Result<ObjectListing> {
        self.observe("list_objects", async {
            self.require("bucket", bucket)?;
            let mut request = ListObjectsRequest::new(bucket);
            self.bind(&mut request, options)?;

            self.store
                .list_objects(request)
                .await
                .map_err(|f| self.scope.fault(f))
        })
        .await
    }

    #[tracing::instrument(name = "s3.head_object", skip(self, options), fields(s3.bucket = %bucket, s3.key = %key), err)]
    pub async fn head_object(
        &self,
        bucket: &str,
        key: &str,
        options: &Options,
    ) -> Result<ObjectMetadata> {
        self.observe("head_object", async {
            self.require("bucket", bucket)?;
            self.require("key", key)?;
            let mut request = HeadObjectRequest::new(bucket, key);
            self.bind(&mut request, options)?;

            self.store
                .head_object(request)
                .await
                .map_err(|f| self.scope.fault(f))
        })
        .await
    }

    #[tracing::instrument(
        name = "s3.copy_object",
        skip(self, options),
        fields(
            s3.source_bucket = %source_bucket,
            s3.source_key = %source_key,
            s3.bucket = %bucket,
            s3.key = %key
        ),
        err
    )]
    pub async fn copy_object(
        &self,
        source_bucket: &str,
        source_key: &str,
        bucket: &str,
        key: &str,
        options: &Options,
    ) -> Result<()> {
        self.observe("copy_object", async {
            self.require("source bucket", source_bucket)?;
            self.require("source key", source_key)?;
            self.require("bucket", bucket)?;
            self.require("key", key)?;
            let mut request = CopyObjectRequest::new(source_bucket, source_key, bucket, key);
            self.bind(&mut request, options)?;

            self.store
                .copy_object(request)
                .await
                .map_err(|f| self.scope.fault(f))?;
            info!("Object copied");
            Ok(())
        })
        .await
    }

    /// `false` only when the object is missing; other faults surface
    #[tracing::instrument(name = "s3.object_exists", skip(self), fields(s3.bucket = %bucket, s3.key = %key), err)]
    pub async fn object_exists(&self, bucket: &str, key: &str) -> Result<bool> {
        self.observe("object_exists", async {
            self.require("bucket", bucket)?;
            self.require("key", key)?;

            match self.store.head_object(HeadObjectRequest::new(bucket, key)).await {
                Ok(_) => Ok(true),
                Err(fault) if fault.kind() == ErrorKind::ObjectNotFound => Ok(false),
                Err(fault) => Err(self.scope.fault(fault)),
            }
        })
        .await
    }

    // ------------------------------------------------------------------
    // Multipart
    // ------------------------------------------------------------------

    /// Start a multipart upload and return its id
    #[tracing::instrument(
        name = "s3.initiate_multipart",
        skip(self, options),
        fields(s3.bucket = %bucket, s3.key = %key, s3.upload_id = tracing::field::Empty),
        err
    )]
    pub async fn initiate_multipart(
        &self,
        bucket: &str,
        key: &str,
        options: &Options,
    ) -> Result<String> {
        self.observe("initiate_multipart", async {
            self.require("bucket", bucket)?;
            self.require("key", key)?;
            let mut request = CreateMultipartRequest::new(bucket, key);
            self.bind(&mut request, options)?;

            let upload_id = self
                .store
                .create_multipart_upload(request)
                .await
                .map_err(|f| self.scope.fault(f))?;

            Span::current().record("s3.upload_id", upload_id.as_str());
            info!(upload_id = %upload_id, "Created multipart upload");
            Ok(upload_id)
        })
        .await
    }

    /// Start a multipart upload tracked by a [`MultipartSession`]
    pub async fn begin_multipart(
        &self,
        bucket: &str,
        key: &str,
        options: &Options,
    ) -> Result<MultipartSession> {
        let upload_id = self.initiate_multipart(bucket, key, options).await?;
        Ok(MultipartSession::new(
            self.clone(),
            bucket.to_string(),
            key.to_string(),
            upload_id,
        ))
    }

    /// Upload one part and return its ETag
    #[tracing::instrument(
        name = "s3.upload_part",
        skip(self, body, options),
        fields(
            s3.bucket = %bucket,
            s3.key = %key,
            s3.upload_id = %upload_id,
            s3.part_number = part_number,
            s3.etag = tracing::field::Empty,
            transfer.bytes = tracing::field::Empty
        ),
        err
    )]
    pub async fn upload_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: TransferBody,
        options: &Options,
    ) -> Result<String> {
        self.observe("upload_part", async {
            let request = match self.prepare_part(bucket, key, upload_id, part_number, options) {
                Ok(request) => request,
                Err(e) => {
                    self.release_body(body).await;
                    return Err(e);
                }
            };
            let bytes = match self.resolve_body(body).await? {
                Payload::Bytes(bytes) => bytes,
                Payload::File(path) => tokio::fs::read(&path).await.map(Bytes::from).map_err(|e| {
                    self.scope.fault(ServiceFault::uncoded(format!(
                        "failed to read {}: {}",
                        path.display(),
                        e
                    )))
                })?,
            };
            let len = bytes.len() as u64;

            let etag = self
                .store
                .upload_part(request, bytes)
                .await
                .map_err(|f| self.scope.fault(f))?;

            let span = Span::current();
            span.record("s3.etag", etag.as_str());
            span.record("transfer.bytes", len);
            if self.settings.metrics_enabled {
                metrics::record_upload_bytes(len);
            }
            debug!(part_number, size = len, "Uploaded part");
            Ok(etag)
        })
        .await
    }

    /// Assemble the listed parts into the final object
    ///
    /// `parts` must be non-empty and in ascending part-number order.
    #[tracing::instrument(
        name = "s3.complete_multipart",
        skip(self, parts),
        fields(
            s3.bucket = %bucket,
            s3.key = %key,
            s3.upload_id = %upload_id,
            parts_count = parts.len(),
            s3.etag = tracing::field::Empty
        ),
        err
    )]
    pub async fn complete_multipart(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        parts: Vec<CompletedPart>,
    ) -> Result<()> {
        self.observe("complete_multipart", async {
            self.require_upload(bucket, key, upload_id)?;
            if parts.is_empty() {
                return Err(self
                    .scope
                    .validation("cannot complete a multipart upload without parts"));
            }
            let parts_count = parts.len();
            let request = CompleteMultipartRequest {
                bucket: bucket.to_string(),
                key: key.to_string(),
                upload_id: upload_id.to_string(),
                parts,
            };

            match self.store.complete_multipart_upload(request).await {
                Ok(output) => {
                    if let Some(etag) = &output.etag {
                        Span::current().record("s3.etag", etag.as_str());
                    }
                    if self.settings.metrics_enabled {
                        metrics::record_multipart_completed(parts_count);
                    }
                    info!(parts = parts_count, etag = ?output.etag, "Completed multipart upload");
                    Ok(())
                }
                Err(fault) => {
                    if self.settings.metrics_enabled {
                        metrics::record_multipart_failed();
                    }
                    Err(self.scope.fault(fault))
                }
            }
        })
        .await
    }

    #[tracing::instrument(
        name = "s3.abort_multipart",
        skip(self),
        fields(s3.bucket = %bucket, s3.key = %key, s3.upload_id = %upload_id),
        err
    )]
    pub async fn abort_multipart(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.observe("abort_multipart", async {
            self.require_upload(bucket, key, upload_id)?;
            let result = self
                .store
                .abort_multipart_upload(AbortMultipartRequest {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    upload_id: upload_id.to_string(),
                })
                .await;

            match result {
                Ok(()) => {
                    if self.settings.metrics_enabled {
                        metrics::record_multipart_aborted();
                    }
                    info!("Aborted multipart upload");
                    Ok(())
                }
                Err(fault) if fault.code.as_deref() == Some(NO_SUCH_UPLOAD) => {
                    warn!(error = %fault, "Upload already gone, treating abort as done");
                    Ok(())
                }
                Err(fault) => Err(self.scope.fault(fault)),
            }
        })
        .await
    }

    /// Upload a file, switching to multipart above the configured threshold
    ///
    /// Multipart parts are uploaded up to `concurrent_parts` at a time. Any
    /// part failure aborts the upload.
    #[tracing::instrument(
        name = "s3.upload_file",
        skip(self, path, options),
        fields(s3.bucket = %bucket, s3.key = %key, transfer.bytes = tracing::field::Empty),
        err
    )]
    pub async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        options: &Options,
    ) -> Result<()> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| {
                self.scope.fault(ServiceFault::uncoded(format!(
                    "failed to stat {}: {}",
                    path.display(),
                    e
                )))
            })?
            .len();
        Span::current().record("transfer.bytes", size);

        if size <= self.settings.multipart_threshold {
            return self
                .put_object(bucket, key, TransferBody::file(path), options)
                .await;
        }

        let part_size = self.settings.part_size.max(MIN_PART_SIZE) as u64;
        let part_count = size.div_ceil(part_size);
        if part_count > MAX_PARTS as u64 {
            return Err(self.scope.validation(format!(
                "{} bytes needs {} parts of {} bytes, more than the {} allowed",
                size, part_count, part_size, MAX_PARTS
            )));
        }

        let session = self.begin_multipart(bucket, key, options).await?;
        let uploads = futures::stream::iter(1..=part_count)
            .map(|number| {
                let session = &session;
                async move {
                    let offset = (number - 1) * part_size;
                    let len = part_size.min(size - offset);
                    let chunk = self.read_file_range(path, offset, len as usize).await?;
                    session.upload_part(number as i32, TransferBody::Bytes(chunk)).await
                }
            })
            .buffer_unordered(self.settings.concurrent_parts.max(1))
            .try_collect::<Vec<_>>()
            .await;

        if let Err(e) = uploads {
            if let Err(abort_err) = session.abort().await {
                warn!(error = %abort_err, upload_id = %session.upload_id(), "Abort after failed part upload also failed");
            }
            return Err(e);
        }

        session.complete_recorded().await
    }

    // ------------------------------------------------------------------
    // Presigning
    // ------------------------------------------------------------------

    /// Presigned URL for GET or PUT
    ///
    /// `expiration_minutes` defaults to the configured value.
    pub async fn presign(
        &self,
        bucket: &str,
        key: &str,
        method: &str,
        expiration_minutes: Option<i32>,
    ) -> Result<String> {
        let options = PresignOptions {
            http_method: Some(method.to_string()).filter(|m| !m.is_empty()),
            expiration_minutes,
            ..Default::default()
        };
        self.issue_presign(bucket, key, options).await
    }

    /// Presigned URL with `httpMethod`, `expirationMinutes` and response
    /// overrides taken from `options`
    pub async fn presign_with_options(
        &self,
        bucket: &str,
        key: &str,
        options: &Options,
    ) -> Result<String> {
        let mut presign = PresignOptions::default();
        self.bind(&mut presign, options)?;
        self.issue_presign(bucket, key, presign).await
    }

    #[tracing::instrument(name = "s3.presign", skip(self, options), fields(s3.bucket = %bucket, s3.key = %key), err)]
    async fn issue_presign(&self, bucket: &str, key: &str, options: PresignOptions) -> Result<String> {
        self.observe("presign", async {
            let request = self.build_presign(bucket, key, options)?;
            self.store
                .presign(request)
                .await
                .map_err(|f| self.scope.fault(f))
        })
        .await
    }

    fn build_presign(&self, bucket: &str, key: &str, options: PresignOptions) -> Result<PresignRequest> {
        self.require("bucket", bucket)?;
        self.require("key", key)?;

        let method = match options.http_method.as_deref() {
            Some(method) => method
                .parse::<PresignMethod>()
                .map_err(|e| self.scope.validation(e))?,
            None => PresignMethod::Get,
        };

        let minutes = options
            .expiration_minutes
            .map(i64::from)
            .unwrap_or_else(|| i64::from(self.settings.default_expiration_minutes));
        if minutes <= 0 || minutes > i64::from(MAX_PRESIGN_EXPIRATION_MINUTES) {
            return Err(self.scope.validation(format!(
                "expirationMinutes must be between 1 and {}, got {}",
                MAX_PRESIGN_EXPIRATION_MINUTES, minutes
            )));
        }

        Ok(PresignRequest {
            bucket: bucket.to_string(),
            key: key.to_string(),
            method,
            expires_in: Duration::from_secs(minutes as u64 * 60),
            version_id: options.version_id,
            response_content_type: options.response_content_type,
            content_type: options.content_type,
            content_disposition: options.content_disposition,
        })
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    /// Run an operation, recording its outcome when metrics are enabled
    async fn observe<T, F>(&self, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = fut.await;
        if self.settings.metrics_enabled {
            metrics::record_operation(operation, result.is_ok(), start.elapsed().as_secs_f64());
            if let Err(e) = &result {
                metrics::record_error(e.kind().label());
            }
        }
        result
    }

    fn require(&self, field: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(self.scope.validation(format!("{} cannot be empty", field)));
        }
        Ok(())
    }

    fn require_upload(&self, bucket: &str, key: &str, upload_id: &str) -> Result<()> {
        self.require("bucket", bucket)?;
        self.require("key", key)?;
        self.require("upload id", upload_id)
    }

    fn bind<B: Bindable>(&self, target: &mut B, options: &Options) -> Result<()> {
        bind(target, options).map_err(|e| self.scope.validation(e.to_string()))
    }

    fn prepare_put(&self, bucket: &str, key: &str, options: &Options) -> Result<PutObjectRequest> {
        self.require("bucket", bucket)?;
        self.require("key", key)?;
        let mut request = PutObjectRequest::new(bucket, key);
        self.bind(&mut request, options)?;
        Ok(request)
    }

    fn prepare_part(
        &self,
        bucket: &str,
        key: &str,
        upload_id: &str,
        part_number: i32,
        options: &Options,
    ) -> Result<UploadPartRequest> {
        self.require_upload(bucket, key, upload_id)?;
        if !(1..=MAX_PARTS).contains(&part_number) {
            return Err(self.scope.validation(format!(
                "part number must be between 1 and {}, got {}",
                MAX_PARTS, part_number
            )));
        }
        let mut request = UploadPartRequest::new(bucket, key, upload_id, part_number);
        self.bind(&mut request, options)?;
        Ok(request)
    }

    /// Turn a body into a store payload, draining and closing stream sources
    async fn resolve_body(&self, body: TransferBody) -> Result<Payload> {
        match body {
            TransferBody::Bytes(bytes) => Ok(Payload::Bytes(bytes)),
            TransferBody::File(path) => Ok(Payload::File(path)),
            TransferBody::Stream(source) => {
                let mut reader = ChunkReader::new(source, self.scope.clone());
                let buffered = reader.read_to_end(self.settings.read_buffer_size).await;
                let closed = reader.close().await;
                let bytes = buffered?;
                closed?;
                debug!(bytes = bytes.len(), "Buffered stream body");
                Ok(Payload::Bytes(bytes))
            }
        }
    }

    /// Close a stream body that will not be sent
    async fn release_body(&self, body: TransferBody) {
        if let TransferBody::Stream(source) = body {
            let mut reader = ChunkReader::new(source, self.scope.clone());
            if let Err(e) = reader.close().await {
                warn!(error = %e, "Failed to release unused stream body");
            }
        }
    }

    async fn read_file_range(&self, path: &Path, offset: u64, len: usize) -> Result<Bytes> {
        let io_error = |e: std::io::Error| -> AdaptorError {
            self.scope.fault(ServiceFault::uncoded(format!(
                "failed to read {} at offset {}: {}",
                path.display(),
                offset,
                e
            )))
        };

        let mut file = tokio::fs::File::open(path).await.map_err(io_error)?;
        file.seek(SeekFrom::Start(offset)).await.map_err(io_error)?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf).await.map_err(io_error)?;
        Ok(Bytes::from(buf))
    }

    /// Poll until a freshly created bucket is visible
    async fn wait_for_bucket(&self, bucket: &str) -> Result<()> {
        let attempts = self.settings.bucket_wait_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.store.head_bucket(bucket).await {
                Ok(()) => return Ok(()),
                Err(fault) if fault.kind() == ErrorKind::BucketNotFound && attempt < attempts => {
                    debug!(attempt, "Bucket not visible yet");
                    tokio::time::sleep(self.settings.bucket_wait_interval).await;
                    attempt += 1;
                }
                Err(fault) => return Err(self.scope.fault(fault)),
            }
        }
    }
}

async fn payload_len(payload: &Payload) -> Option<u64> {
    match payload {
        Payload::Bytes(bytes) => Some(bytes.len() as u64),
        Payload::File(path) => tokio::fs::metadata(path).await.ok().map(|m| m.len()),
    }
}
