//! S3 backend
//!
//! [`S3Store`] implements [`ObjectStore`] on top of `aws-sdk-s3`. It is a thin
//! translation layer: typed requests become SDK fluent builders, SDK outputs
//! become the crate's model types, and SDK errors become [`ServiceFault`]s
//! carrying the service error code.
//!
//! # Example
//!
//! ```no_run
//! use s3_adaptor::config::ClientConfig;
//! use s3_adaptor::s3::S3Store;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClientConfig {
//!     region: "us-east-1".to_string(),
//!     endpoint: Some("http://localhost:9000".to_string()),
//!     force_path_style: true,
//!     auth: None,
//! };
//! let store = S3Store::from_config(&config).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Not-found normalisation
//!
//! HEAD responses carry no body, so the SDK reports a 404 as the modelled
//! `NotFound` error. Those are rewritten to `NoSuchKey` (head object) and
//! `NoSuchBucket` (head bucket) before they leave this module.

use crate::backend::*;
use crate::config::ClientConfig;
use crate::error::ServiceFault;
use crate::stream::{ChunkSource, SourceError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::{ByteStream, DateTime as SdkDateTime};
use aws_sdk_s3::types::{
    BucketCannedAcl, BucketLocationConstraint, CompletedMultipartUpload,
    CompletedPart as SdkCompletedPart, CreateBucketConfiguration, MetadataDirective,
    ObjectCannedAcl, ObjectOwnership, ServerSideEncryption, StorageClass,
};
use aws_sdk_s3::Client;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tracing::debug;

mod credentials;

pub use credentials::{Credentials, CredentialsError, CredentialsProvider};

/// Convert any SDK error into a service fault
///
/// Service errors keep their code and message; transport, timeout and
/// construction failures become uncoded faults.
fn sdk_fault<E, R>(err: SdkError<E, R>) -> ServiceFault
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match err.as_service_error() {
        Some(service) => {
            let message = service
                .message()
                .map(str::to_string)
                .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
            ServiceFault::new(service.code(), message)
        }
        None => ServiceFault::uncoded(DisplayErrorContext(&err).to_string()),
    }
}

fn to_chrono(dt: &SdkDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
}

fn to_sdk_time(dt: DateTime<Utc>) -> SdkDateTime {
    SdkDateTime::from_secs_and_nanos(dt.timestamp(), dt.timestamp_subsec_nanos())
}

/// Live response body as a chunk source
struct ByteStreamSource {
    inner: ByteStream,
}

#[async_trait]
impl ChunkSource for ByteStreamSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError> {
        match self.inner.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(SourceError::new(e.to_string())),
            None => Ok(None),
        }
    }
}

/// `aws-sdk-s3` backed object store
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Build a store from client configuration
    pub async fn from_config(config: &ClientConfig) -> Result<Self, CredentialsError> {
        let region = Region::new(config.region.clone());

        let mut builder = match CredentialsProvider::from_config(config.auth.as_ref())? {
            Some(provider) => aws_sdk_s3::Config::builder()
                .behavior_version(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(provider),
            None => {
                let shared = aws_config::defaults(BehaviorVersion::latest())
                    .region(region)
                    .load()
                    .await;
                aws_sdk_s3::config::Builder::from(&shared)
            }
        };

        // Custom endpoint for MinIO and other S3-compatible services
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        builder = builder.force_path_style(config.force_path_style);

        debug!(
            region = %config.region,
            endpoint = %config.endpoint(),
            "S3 client configured"
        );
        Ok(Self::from_client(Client::from_conf(builder.build())))
    }

    /// Wrap an already configured SDK client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn create_bucket(&self, request: CreateBucketRequest) -> StoreResult<()> {
        let configuration = request.location.as_deref().map(|location| {
            CreateBucketConfiguration::builder()
                .location_constraint(BucketLocationConstraint::from(location))
                .build()
        });

        self.client
            .create_bucket()
            .bucket(&request.bucket)
            .set_create_bucket_configuration(configuration)
            .set_acl(request.acl.as_deref().map(BucketCannedAcl::from))
            .set_object_ownership(request.object_ownership.as_deref().map(ObjectOwnership::from))
            .set_object_lock_enabled_for_bucket(request.object_lock_enabled)
            .send()
            .await
            .map(|_| ())
            .map_err(sdk_fault)
    }

    async fn head_bucket(&self, bucket: &str) -> StoreResult<()> {
        match self.client.head_bucket().bucket(bucket).send().await {
            Ok(_) => Ok(()),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Err(
                ServiceFault::coded("NoSuchBucket", format!("bucket {} does not exist", bucket)),
            ),
            Err(err) => Err(sdk_fault(err)),
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> StoreResult<()> {
        self.client
            .delete_bucket()
            .bucket(bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(sdk_fault)
    }

    async fn list_buckets(&self) -> StoreResult<Vec<BucketEntry>> {
        let output = self.client.list_buckets().send().await.map_err(sdk_fault)?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|bucket| {
                Some(BucketEntry {
                    name: bucket.name()?.to_string(),
                    creation_date: bucket.creation_date().and_then(to_chrono),
                })
            })
            .collect())
    }

    async fn get_bucket_location(&self, bucket: &str) -> StoreResult<Option<String>> {
        let output = self
            .client
            .get_bucket_location()
            .bucket(bucket)
            .send()
            .await
            .map_err(sdk_fault)?;
        Ok(output
            .location_constraint()
            .map(|constraint| constraint.as_str().to_string()))
    }

    async fn put_object(
        &self,
        request: PutObjectRequest,
        body: Payload,
    ) -> StoreResult<PutObjectOutput> {
        let body = match body {
            Payload::Bytes(bytes) => ByteStream::from(bytes),
            Payload::File(path) => ByteStream::from_path(&path).await.map_err(|e| {
                ServiceFault::uncoded(format!("failed to open {}: {}", path.display(), e))
            })?,
        };
        let attributes = request.attributes;

        let output = self
            .client
            .put_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .body(body)
            .set_content_type(attributes.content_type)
            .set_acl(attributes.acl.as_deref().map(ObjectCannedAcl::from))
            .set_storage_class(attributes.storage_class.as_deref().map(StorageClass::from))
            .set_cache_control(attributes.cache_control)
            .set_content_disposition(attributes.content_disposition)
            .set_content_encoding(attributes.content_encoding)
            .set_content_language(attributes.content_language)
            .set_tagging(attributes.tagging)
            .set_server_side_encryption(
                attributes
                    .server_side_encryption
                    .as_deref()
                    .map(ServerSideEncryption::from),
            )
            .set_metadata(attributes.metadata)
            .send()
            .await
            .map_err(sdk_fault)?;

        Ok(PutObjectOutput {
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
        })
    }

    async fn get_object(&self, request: GetObjectRequest) -> StoreResult<GetObjectOutput> {
        let output = self
            .client
            .get_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .set_version_id(request.version_id)
            .set_range(request.range)
            .set_if_match(request.if_match)
            .set_if_none_match(request.if_none_match)
            .set_if_modified_since(request.if_modified_since.map(to_sdk_time))
            .set_if_unmodified_since(request.if_unmodified_since.map(to_sdk_time))
            .set_part_number(request.part_number)
            .send()
            .await
            .map_err(sdk_fault)?;

        let metadata = ObjectMetadata {
            key: request.key,
            content_length: output.content_length().unwrap_or(0),
            content_type: output.content_type().map(str::to_string),
            etag: output.e_tag().map(str::to_string),
            last_modified: output.last_modified().and_then(to_chrono),
            storage_class: output
                .storage_class()
                .map(|class| class.as_str().to_string())
                .unwrap_or_else(|| DEFAULT_STORAGE_CLASS.to_string()),
            version_id: output.version_id().map(str::to_string),
            metadata: output.metadata().cloned().unwrap_or_default(),
        };

        Ok(GetObjectOutput {
            metadata,
            body: Box::new(ByteStreamSource { inner: output.body }),
        })
    }

    async fn delete_object(&self, request: DeleteObjectRequest) -> StoreResult<()> {
        self.client
            .delete_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .set_version_id(request.version_id)
            .set_mfa(request.mfa)
            .set_bypass_governance_retention(request.bypass_governance_retention)
            .send()
            .await
            .map(|_| ())
            .map_err(sdk_fault)
    }

    async fn list_objects(&self, request: ListObjectsRequest) -> StoreResult<ObjectListing> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&request.bucket)
            .set_prefix(request.prefix)
            .set_delimiter(request.delimiter)
            .set_max_keys(request.max_keys)
            .set_continuation_token(request.continuation_token)
            .set_start_after(request.start_after)
            .set_fetch_owner(request.fetch_owner)
            .send()
            .await
            .map_err(sdk_fault)?;

        let objects: Vec<ObjectSummary> = output
            .contents()
            .iter()
            .map(|object| ObjectSummary {
                key: object.key().unwrap_or_default().to_string(),
                size: object.size().unwrap_or(0),
                last_modified: object.last_modified().and_then(to_chrono),
                etag: object.e_tag().map(str::to_string),
                storage_class: object.storage_class().map(|c| c.as_str().to_string()),
            })
            .collect();

        Ok(ObjectListing {
            count: objects.len(),
            objects,
            is_truncated: output.is_truncated().unwrap_or(false),
            next_continuation_token: output.next_continuation_token().map(str::to_string),
            common_prefixes: output
                .common_prefixes()
                .iter()
                .filter_map(|p| p.prefix().map(str::to_string))
                .collect(),
        })
    }

    async fn head_object(&self, request: HeadObjectRequest) -> StoreResult<ObjectMetadata> {
        let result = self
            .client
            .head_object()
            .bucket(&request.bucket)
            .key(&request.key)
            .set_version_id(request.version_id)
            .set_part_number(request.part_number)
            .send()
            .await;

        let output = match result {
            Ok(output) => output,
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => {
                return Err(ServiceFault::coded(
                    "NoSuchKey",
                    format!("object {} does not exist", request.key),
                ));
            }
            Err(err) => return Err(sdk_fault(err)),
        };

        Ok(ObjectMetadata {
            key: request.key,
            content_length: output.content_length().unwrap_or(0),
            content_type: output.content_type().map(str::to_string),
            etag: output.e_tag().map(str::to_string),
            last_modified: output.last_modified().and_then(to_chrono),
            storage_class: output
                .storage_class()
                .map(|class| class.as_str().to_string())
                .unwrap_or_else(|| DEFAULT_STORAGE_CLASS.to_string()),
            version_id: output.version_id().map(str::to_string),
            metadata: output.metadata().cloned().unwrap_or_default(),
        })
    }

    async fn copy_object(&self, request: CopyObjectRequest) -> StoreResult<()> {
        self.client
            .copy_object()
            .copy_source(request.copy_source())
            .bucket(&request.bucket)
            .key(&request.key)
            .set_acl(request.acl.as_deref().map(ObjectCannedAcl::from))
            .set_storage_class(request.storage_class.as_deref().map(StorageClass::from))
            .set_metadata_directive(
                request
                    .metadata_directive
                    .as_deref()
                    .map(MetadataDirective::from),
            )
            .set_content_type(request.content_type)
            .set_metadata(request.metadata)
            .send()
            .await
            .map(|_| ())
            .map_err(sdk_fault)
    }

    async fn create_multipart_upload(
        &self,
        request: CreateMultipartRequest,
    ) -> StoreResult<String> {
        let attributes = request.attributes;
        let output = self
            .client
            .create_multipart_upload()
            .bucket(&request.bucket)
            .key(&request.key)
            .set_content_type(attributes.content_type)
            .set_acl(attributes.acl.as_deref().map(ObjectCannedAcl::from))
            .set_storage_class(attributes.storage_class.as_deref().map(StorageClass::from))
            .set_tagging(attributes.tagging)
            .set_server_side_encryption(
                attributes
                    .server_side_encryption
                    .as_deref()
                    .map(ServerSideEncryption::from),
            )
            .set_metadata(attributes.metadata)
            .send()
            .await
            .map_err(sdk_fault)?;

        output
            .upload_id()
            .map(str::to_string)
            .ok_or_else(|| ServiceFault::uncoded("CreateMultipartUpload response has no UploadId"))
    }

    async fn upload_part(&self, request: UploadPartRequest, body: Bytes) -> StoreResult<String> {
        let output = self
            .client
            .upload_part()
            .bucket(&request.bucket)
            .key(&request.key)
            .upload_id(&request.upload_id)
            .part_number(request.part_number)
            .set_content_md5(request.content_md5)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(sdk_fault)?;

        output
            .e_tag()
            .map(str::to_string)
            .ok_or_else(|| ServiceFault::uncoded("UploadPart response has no ETag"))
    }

    async fn complete_multipart_upload(
        &self,
        request: CompleteMultipartRequest,
    ) -> StoreResult<PutObjectOutput> {
        let parts = request
            .parts
            .iter()
            .map(|part| {
                SdkCompletedPart::builder()
                    .part_number(part.part_number)
                    .e_tag(&part.etag)
                    .build()
            })
            .collect();
        let upload = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();

        let output = self
            .client
            .complete_multipart_upload()
            .bucket(&request.bucket)
            .key(&request.key)
            .upload_id(&request.upload_id)
            .multipart_upload(upload)
            .send()
            .await
            .map_err(sdk_fault)?;

        Ok(PutObjectOutput {
            etag: output.e_tag().map(str::to_string),
            version_id: output.version_id().map(str::to_string),
        })
    }

    async fn abort_multipart_upload(&self, request: AbortMultipartRequest) -> StoreResult<()> {
        self.client
            .abort_multipart_upload()
            .bucket(&request.bucket)
            .key(&request.key)
            .upload_id(&request.upload_id)
            .send()
            .await
            .map(|_| ())
            .map_err(sdk_fault)
    }

    async fn presign(&self, request: PresignRequest) -> StoreResult<String> {
        let config = PresigningConfig::expires_in(request.expires_in)
            .map_err(|e| ServiceFault::uncoded(format!("invalid presign expiry: {}", e)))?;

        let presigned = match request.method {
            PresignMethod::Get => self
                .client
                .get_object()
                .bucket(&request.bucket)
                .key(&request.key)
                .set_version_id(request.version_id)
                .set_response_content_type(request.response_content_type)
                .presigned(config)
                .await
                .map_err(sdk_fault)?,
            PresignMethod::Put => self
                .client
                .put_object()
                .bucket(&request.bucket)
                .key(&request.key)
                .set_content_type(request.content_type)
                .set_content_disposition(request.content_disposition)
                .presigned(config)
                .await
                .map_err(sdk_fault)?,
        };

        Ok(presigned.uri().to_string())
    }
}
