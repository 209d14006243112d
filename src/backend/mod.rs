//! Storage backend seam
//!
//! [`ObjectStore`] is the boundary between the transfer orchestrator and a
//! concrete object-storage service. Implementations report failures as raw
//! [`ServiceFault`]s; classification happens above this layer.
//!
//! Two implementations ship with the crate:
//!
//! - [`crate::s3::S3Store`] talks to S3 (or an S3-compatible service) through
//!   `aws-sdk-s3`
//! - [`memory::MemoryStore`] keeps everything in process and mimics S3's
//!   service codes, for tests and local experiments

use crate::error::ServiceFault;
use async_trait::async_trait;
use bytes::Bytes;

pub mod memory;
mod model;

pub use model::*;

/// Result type for store calls
pub type StoreResult<T> = Result<T, ServiceFault>;

/// Object-storage service operations
///
/// Every call is one request/response exchange. Stores do not retry.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    async fn create_bucket(&self, request: CreateBucketRequest) -> StoreResult<()>;

    /// Succeeds when the bucket exists and is accessible
    async fn head_bucket(&self, bucket: &str) -> StoreResult<()>;

    async fn delete_bucket(&self, bucket: &str) -> StoreResult<()>;

    async fn list_buckets(&self) -> StoreResult<Vec<BucketEntry>>;

    /// Raw location constraint; `None` or empty means the default region
    async fn get_bucket_location(&self, bucket: &str) -> StoreResult<Option<String>>;

    async fn put_object(
        &self,
        request: PutObjectRequest,
        body: Payload,
    ) -> StoreResult<PutObjectOutput>;

    async fn get_object(&self, request: GetObjectRequest) -> StoreResult<GetObjectOutput>;

    async fn delete_object(&self, request: DeleteObjectRequest) -> StoreResult<()>;

    async fn list_objects(&self, request: ListObjectsRequest) -> StoreResult<ObjectListing>;

    async fn head_object(&self, request: HeadObjectRequest) -> StoreResult<ObjectMetadata>;

    async fn copy_object(&self, request: CopyObjectRequest) -> StoreResult<()>;

    /// Returns the upload id
    async fn create_multipart_upload(&self, request: CreateMultipartRequest)
        -> StoreResult<String>;

    /// Returns the part's ETag
    async fn upload_part(&self, request: UploadPartRequest, body: Bytes) -> StoreResult<String>;

    async fn complete_multipart_upload(
        &self,
        request: CompleteMultipartRequest,
    ) -> StoreResult<PutObjectOutput>;

    async fn abort_multipart_upload(&self, request: AbortMultipartRequest) -> StoreResult<()>;

    /// Presigned URL; local computation, no request is sent
    async fn presign(&self, request: PresignRequest) -> StoreResult<String>;
}
