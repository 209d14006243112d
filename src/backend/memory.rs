//! In-process object store
//!
//! Mirrors the S3 service codes the adaptor cares about (`NoSuchBucket`,
//! `NoSuchKey`, `BucketNotEmpty`, `NoSuchUpload`, `InvalidPart`, ...) so the
//! orchestrator can be exercised without a network. Failures can be injected
//! per operation with [`MemoryStore::fail_operation`].

use super::*;
use crate::stream::StreamSource;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use tracing::debug;

/// Size of the chunks a memory body is served in
const BODY_CHUNK_SIZE: usize = 64 * 1024;

const DEFAULT_MAX_KEYS: i32 = 1000;

const MAX_PART_NUMBER: i32 = 10_000;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    etag: String,
    last_modified: DateTime<Utc>,
    attributes: ObjectAttributes,
}

#[derive(Debug)]
struct StoredBucket {
    created: DateTime<Utc>,
    location: Option<String>,
    objects: BTreeMap<String, StoredObject>,
}

#[derive(Debug)]
struct PendingUpload {
    bucket: String,
    key: String,
    attributes: ObjectAttributes,
    parts: BTreeMap<i32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct Inner {
    buckets: BTreeMap<String, StoredBucket>,
    uploads: HashMap<String, PendingUpload>,
    failures: HashMap<&'static str, ServiceFault>,
}

/// Object store held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn quoted_md5(data: &[u8]) -> String {
    format!("\"{:x}\"", md5::compute(data))
}

fn unquote(etag: &str) -> &str {
    etag.trim_matches('"')
}

fn no_such_bucket(bucket: &str) -> ServiceFault {
    ServiceFault::coded(
        "NoSuchBucket",
        format!("The specified bucket does not exist: {}", bucket),
    )
}

fn no_such_key(key: &str) -> ServiceFault {
    ServiceFault::coded(
        "NoSuchKey",
        format!("The specified key does not exist: {}", key),
    )
}

fn no_such_upload(upload_id: &str) -> ServiceFault {
    ServiceFault::coded(
        "NoSuchUpload",
        format!("The specified upload does not exist: {}", upload_id),
    )
}

/// Resolve a `bytes=` range header against an object length
fn resolve_range(range: &str, len: usize) -> Option<(usize, usize)> {
    let spec = range.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    if len == 0 {
        return None;
    }
    let (start, end) = match (start.trim(), end.trim()) {
        ("", suffix) => {
            let n: usize = suffix.parse().ok()?;
            if n == 0 {
                return None;
            }
            (len.saturating_sub(n), len - 1)
        }
        (start, "") => (start.parse().ok()?, len - 1),
        (start, end) => {
            let end: usize = end.parse().ok()?;
            (start.parse().ok()?, end.min(len - 1))
        }
    };
    if start > end || start >= len {
        return None;
    }
    Some((start, end + 1))
}

fn memory_body(data: Bytes) -> ObjectBody {
    let chunks: Vec<Result<Bytes, Infallible>> = data
        .chunks(BODY_CHUNK_SIZE)
        .map(|chunk| Ok(data.slice_ref(chunk)))
        .collect();
    Box::new(StreamSource::new(futures::stream::iter(chunks)))
}

enum ListEntry {
    Object(String),
    Prefix(String),
}

impl ListEntry {
    fn marker(&self) -> &str {
        match self {
            ListEntry::Object(key) | ListEntry::Prefix(key) => key,
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `operation` fail with `fault` until cleared
    ///
    /// Operation names match the [`ObjectStore`] method names.
    pub fn fail_operation(&self, operation: &'static str, fault: ServiceFault) {
        self.inner.lock().failures.insert(operation, fault);
    }

    pub fn clear_failures(&self) {
        self.inner.lock().failures.clear();
    }

    /// Multipart uploads initiated but neither completed nor aborted
    pub fn pending_uploads(&self) -> usize {
        self.inner.lock().uploads.len()
    }

    /// Parts recorded so far for a pending upload
    pub fn uploaded_parts(&self, upload_id: &str) -> Vec<i32> {
        self.inner
            .lock()
            .uploads
            .get(upload_id)
            .map(|upload| upload.parts.keys().copied().collect())
            .unwrap_or_default()
    }

    fn check(inner: &Inner, operation: &'static str) -> StoreResult<()> {
        match inner.failures.get(operation) {
            Some(fault) => Err(fault.clone()),
            None => Ok(()),
        }
    }

    fn metadata_for(key: &str, object: &StoredObject, content_length: usize) -> ObjectMetadata {
        ObjectMetadata {
            key: key.to_string(),
            content_length: content_length as i64,
            content_type: object.attributes.content_type.clone(),
            etag: Some(object.etag.clone()),
            last_modified: Some(object.last_modified),
            storage_class: object
                .attributes
                .storage_class
                .clone()
                .unwrap_or_else(|| DEFAULT_STORAGE_CLASS.to_string()),
            version_id: None,
            metadata: object.attributes.metadata.clone().unwrap_or_default(),
        }
    }

    fn check_conditions(request: &GetObjectRequest, object: &StoredObject) -> StoreResult<()> {
        if let Some(expected) = &request.if_match {
            if unquote(expected) != unquote(&object.etag) {
                return Err(ServiceFault::coded(
                    "PreconditionFailed",
                    "At least one of the pre-conditions you specified did not hold",
                ));
            }
        }
        if let Some(unwanted) = &request.if_none_match {
            if unquote(unwanted) == unquote(&object.etag) {
                return Err(ServiceFault::coded("NotModified", "Not Modified"));
            }
        }
        if let Some(since) = request.if_modified_since {
            if object.last_modified <= since {
                return Err(ServiceFault::coded("NotModified", "Not Modified"));
            }
        }
        if let Some(since) = request.if_unmodified_since {
            if object.last_modified > since {
                return Err(ServiceFault::coded(
                    "PreconditionFailed",
                    "At least one of the pre-conditions you specified did not hold",
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create_bucket(&self, request: CreateBucketRequest) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::check(&inner, "create_bucket")?;
        if inner.buckets.contains_key(&request.bucket) {
            return Err(ServiceFault::coded(
                "BucketAlreadyOwnedByYou",
                "Your previous request to create the named bucket succeeded and you already own it",
            ));
        }
        inner.buckets.insert(
            request.bucket.clone(),
            StoredBucket {
                created: Utc::now(),
                location: request.location,
                objects: BTreeMap::new(),
            },
        );
        debug!(bucket = %request.bucket, "Memory bucket created");
        Ok(())
    }

    async fn head_bucket(&self, bucket: &str) -> StoreResult<()> {
        let inner = self.inner.lock();
        Self::check(&inner, "head_bucket")?;
        if inner.buckets.contains_key(bucket) {
            Ok(())
        } else {
            Err(no_such_bucket(bucket))
        }
    }

    async fn delete_bucket(&self, bucket: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::check(&inner, "delete_bucket")?;
        let stored = inner.buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        if !stored.objects.is_empty() {
            return Err(ServiceFault::coded(
                "BucketNotEmpty",
                "The bucket you tried to delete is not empty",
            ));
        }
        inner.buckets.remove(bucket);
        Ok(())
    }

    async fn list_buckets(&self) -> StoreResult<Vec<BucketEntry>> {
        let inner = self.inner.lock();
        Self::check(&inner, "list_buckets")?;
        Ok(inner
            .buckets
            .iter()
            .map(|(name, bucket)| BucketEntry {
                name: name.clone(),
                creation_date: Some(bucket.created),
            })
            .collect())
    }

    async fn get_bucket_location(&self, bucket: &str) -> StoreResult<Option<String>> {
        let inner = self.inner.lock();
        Self::check(&inner, "get_bucket_location")?;
        inner
            .buckets
            .get(bucket)
            .map(|stored| stored.location.clone())
            .ok_or_else(|| no_such_bucket(bucket))
    }

    async fn put_object(
        &self,
        request: PutObjectRequest,
        body: Payload,
    ) -> StoreResult<PutObjectOutput> {
        let data = match body {
            Payload::Bytes(bytes) => bytes,
            Payload::File(path) => tokio::fs::read(&path)
                .await
                .map(Bytes::from)
                .map_err(|e| {
                    ServiceFault::uncoded(format!("failed to read {}: {}", path.display(), e))
                })?,
        };

        let mut inner = self.inner.lock();
        Self::check(&inner, "put_object")?;
        let stored = inner
            .buckets
            .get_mut(&request.bucket)
            .ok_or_else(|| no_such_bucket(&request.bucket))?;

        let etag = quoted_md5(&data);
        stored.objects.insert(
            request.key,
            StoredObject {
                data,
                etag: etag.clone(),
                last_modified: Utc::now(),
                attributes: request.attributes,
            },
        );
        Ok(PutObjectOutput {
            etag: Some(etag),
            version_id: None,
        })
    }

    async fn get_object(&self, request: GetObjectRequest) -> StoreResult<GetObjectOutput> {
        let inner = self.inner.lock();
        Self::check(&inner, "get_object")?;
        let object = inner
            .buckets
            .get(&request.bucket)
            .ok_or_else(|| no_such_bucket(&request.bucket))?
            .objects
            .get(&request.key)
            .ok_or_else(|| no_such_key(&request.key))?;

        Self::check_conditions(&request, object)?;

        let data = match &request.range {
            Some(range) => {
                let (start, end) = resolve_range(range, object.data.len()).ok_or_else(|| {
                    ServiceFault::coded("InvalidRange", "The requested range is not satisfiable")
                })?;
                object.data.slice(start..end)
            }
            None => object.data.clone(),
        };

        Ok(GetObjectOutput {
            metadata: Self::metadata_for(&request.key, object, data.len()),
            body: memory_body(data),
        })
    }

    async fn delete_object(&self, request: DeleteObjectRequest) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::check(&inner, "delete_object")?;
        let stored = inner
            .buckets
            .get_mut(&request.bucket)
            .ok_or_else(|| no_such_bucket(&request.bucket))?;
        stored
            .objects
            .remove(&request.key)
            .map(|_| ())
            .ok_or_else(|| no_such_key(&request.key))
    }

    async fn list_objects(&self, request: ListObjectsRequest) -> StoreResult<ObjectListing> {
        let inner = self.inner.lock();
        Self::check(&inner, "list_objects")?;
        let stored = inner
            .buckets
            .get(&request.bucket)
            .ok_or_else(|| no_such_bucket(&request.bucket))?;

        let max_keys = request.max_keys.unwrap_or(DEFAULT_MAX_KEYS);
        if max_keys < 0 {
            return Err(ServiceFault::coded(
                "InvalidArgument",
                "maxKeys must be non-negative",
            ));
        }
        let marker = match &request.continuation_token {
            Some(token) => {
                let decoded = STANDARD
                    .decode(token)
                    .ok()
                    .and_then(|raw| String::from_utf8(raw).ok())
                    .ok_or_else(|| {
                        ServiceFault::coded(
                            "InvalidArgument",
                            "The continuation token provided is incorrect",
                        )
                    })?;
                Some(decoded)
            }
            None => request.start_after.clone(),
        };
        let prefix = request.prefix.as_deref().unwrap_or("");

        let mut entries: Vec<ListEntry> = Vec::new();
        for key in stored.objects.keys() {
            if !key.starts_with(prefix) {
                continue;
            }
            let entry = match request.delimiter.as_deref().filter(|d| !d.is_empty()) {
                Some(delimiter) => match key[prefix.len()..].find(delimiter) {
                    Some(pos) => {
                        ListEntry::Prefix(key[..prefix.len() + pos + delimiter.len()].to_string())
                    }
                    None => ListEntry::Object(key.clone()),
                },
                None => ListEntry::Object(key.clone()),
            };
            if let Some(marker) = &marker {
                if entry.marker() <= marker.as_str() || key.as_str() <= marker.as_str() {
                    continue;
                }
            }
            if let (Some(ListEntry::Prefix(last)), ListEntry::Prefix(current)) =
                (entries.last(), &entry)
            {
                if last == current {
                    continue;
                }
            }
            entries.push(entry);
        }

        let is_truncated = entries.len() > max_keys as usize;
        entries.truncate(max_keys as usize);
        let next_continuation_token = match entries.last() {
            Some(last) if is_truncated => Some(STANDARD.encode(last.marker())),
            _ => None,
        };

        let mut listing = ObjectListing {
            is_truncated,
            next_continuation_token,
            ..Default::default()
        };
        for entry in entries {
            match entry {
                ListEntry::Object(key) => {
                    let object = &stored.objects[&key];
                    listing.objects.push(ObjectSummary {
                        size: object.data.len() as i64,
                        last_modified: Some(object.last_modified),
                        etag: Some(object.etag.clone()),
                        storage_class: Some(
                            object
                                .attributes
                                .storage_class
                                .clone()
                                .unwrap_or_else(|| DEFAULT_STORAGE_CLASS.to_string()),
                        ),
                        key,
                    });
                }
                ListEntry::Prefix(prefix) => listing.common_prefixes.push(prefix),
            }
        }
        listing.count = listing.objects.len();
        Ok(listing)
    }

    async fn head_object(&self, request: HeadObjectRequest) -> StoreResult<ObjectMetadata> {
        let inner = self.inner.lock();
        Self::check(&inner, "head_object")?;
        let object = inner
            .buckets
            .get(&request.bucket)
            .ok_or_else(|| no_such_bucket(&request.bucket))?
            .objects
            .get(&request.key)
            .ok_or_else(|| no_such_key(&request.key))?;
        Ok(Self::metadata_for(&request.key, object, object.data.len()))
    }

    async fn copy_object(&self, request: CopyObjectRequest) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::check(&inner, "copy_object")?;
        let source = inner
            .buckets
            .get(&request.source_bucket)
            .ok_or_else(|| no_such_bucket(&request.source_bucket))?
            .objects
            .get(&request.source_key)
            .ok_or_else(|| no_such_key(&request.source_key))?
            .clone();

        let mut attributes = source.attributes;
        if request.metadata_directive.as_deref() == Some("REPLACE") {
            attributes.content_type = request.content_type;
            attributes.metadata = request.metadata;
        }
        if request.storage_class.is_some() {
            attributes.storage_class = request.storage_class;
        }
        if request.acl.is_some() {
            attributes.acl = request.acl;
        }

        let target = inner
            .buckets
            .get_mut(&request.bucket)
            .ok_or_else(|| no_such_bucket(&request.bucket))?;
        target.objects.insert(
            request.key,
            StoredObject {
                data: source.data,
                etag: source.etag,
                last_modified: Utc::now(),
                attributes,
            },
        );
        Ok(())
    }

    async fn create_multipart_upload(
        &self,
        request: CreateMultipartRequest,
    ) -> StoreResult<String> {
        let mut inner = self.inner.lock();
        Self::check(&inner, "create_multipart_upload")?;
        if !inner.buckets.contains_key(&request.bucket) {
            return Err(no_such_bucket(&request.bucket));
        }
        let upload_id = uuid::Uuid::new_v4().simple().to_string();
        inner.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                bucket: request.bucket,
                key: request.key,
                attributes: request.attributes,
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(&self, request: UploadPartRequest, body: Bytes) -> StoreResult<String> {
        let mut inner = self.inner.lock();
        Self::check(&inner, "upload_part")?;
        if !(1..=MAX_PART_NUMBER).contains(&request.part_number) {
            return Err(ServiceFault::coded(
                "InvalidArgument",
                format!(
                    "Part number must be an integer between 1 and {}",
                    MAX_PART_NUMBER
                ),
            ));
        }
        let upload = inner
            .uploads
            .get_mut(&request.upload_id)
            .ok_or_else(|| no_such_upload(&request.upload_id))?;

        let etag = quoted_md5(&body);
        upload
            .parts
            .insert(request.part_number, (etag.clone(), body));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        request: CompleteMultipartRequest,
    ) -> StoreResult<PutObjectOutput> {
        let mut inner = self.inner.lock();
        Self::check(&inner, "complete_multipart_upload")?;
        let upload = inner
            .uploads
            .get(&request.upload_id)
            .ok_or_else(|| no_such_upload(&request.upload_id))?;

        if request.parts.is_empty() {
            return Err(ServiceFault::coded(
                "MalformedXML",
                "You must specify at least one part",
            ));
        }
        if request
            .parts
            .windows(2)
            .any(|pair| pair[0].part_number >= pair[1].part_number)
        {
            return Err(ServiceFault::coded(
                "InvalidPartOrder",
                "The list of parts was not in ascending order",
            ));
        }

        let mut data = Vec::new();
        let mut digests = Vec::with_capacity(request.parts.len() * 16);
        for part in &request.parts {
            let (etag, bytes) = upload
                .parts
                .get(&part.part_number)
                .filter(|(etag, _)| unquote(etag) == unquote(&part.etag))
                .ok_or_else(|| {
                    ServiceFault::coded(
                        "InvalidPart",
                        format!(
                            "One or more of the specified parts could not be found: part {}",
                            part.part_number
                        ),
                    )
                })?;
            let raw = hex::decode(unquote(etag)).map_err(|e| {
                ServiceFault::uncoded(format!("corrupt part etag {}: {}", etag, e))
            })?;
            digests.extend_from_slice(&raw);
            data.extend_from_slice(bytes);
        }

        let etag = format!(
            "\"{:x}-{}\"",
            md5::compute(&digests),
            request.parts.len()
        );
        let (bucket, key, attributes) = (
            upload.bucket.clone(),
            upload.key.clone(),
            upload.attributes.clone(),
        );
        let stored = inner
            .buckets
            .get_mut(&bucket)
            .ok_or_else(|| no_such_bucket(&bucket))?;
        stored.objects.insert(
            key,
            StoredObject {
                data: Bytes::from(data),
                etag: etag.clone(),
                last_modified: Utc::now(),
                attributes,
            },
        );
        inner.uploads.remove(&request.upload_id);

        Ok(PutObjectOutput {
            etag: Some(etag),
            version_id: None,
        })
    }

    async fn abort_multipart_upload(&self, request: AbortMultipartRequest) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        Self::check(&inner, "abort_multipart_upload")?;
        inner
            .uploads
            .remove(&request.upload_id)
            .map(|_| ())
            .ok_or_else(|| no_such_upload(&request.upload_id))
    }

    async fn presign(&self, request: PresignRequest) -> StoreResult<String> {
        let inner = self.inner.lock();
        Self::check(&inner, "presign")?;
        Ok(format!(
            "memory://{}/{}?X-Amz-Method={}&X-Amz-Expires={}",
            request.bucket,
            request.key,
            request.method,
            request.expires_in.as_secs()
        ))
    }
}
