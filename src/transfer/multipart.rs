//! Multipart upload session
//!
//! Tracks one upload id from initiation to completion or abort, recording
//! the ETag of every uploaded part.
//!
//! ```text
//! Initiated --upload_part--> Uploading --complete--> Completed
//!     |                          |   \--rejected--> Failed --abort--> Aborted
//!     \----------abort-----------+------------------------------> Aborted
//! ```

use super::{ObjectClient, TransferBody};
use crate::backend::CompletedPart;
use crate::binder::Options;
use crate::error::Result;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Multipart upload state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MultipartState {
    Initiated,
    Uploading,
    Completed,
    Aborted,
    /// Completion was rejected; the upload can still be aborted
    Failed,
}

impl MultipartState {
    fn accepts_parts(self) -> bool {
        matches!(self, MultipartState::Initiated | MultipartState::Uploading)
    }
}

#[derive(Debug)]
struct SessionInner {
    state: MultipartState,
    parts: BTreeMap<i32, String>,
}

/// Handle on an initiated multipart upload
///
/// Parts may be uploaded concurrently through a shared reference.
/// Re-uploading a part number replaces its recorded ETag.
#[derive(Debug)]
pub struct MultipartSession {
    client: ObjectClient,
    bucket: String,
    key: String,
    upload_id: String,
    inner: Mutex<SessionInner>,
}

impl MultipartSession {
    pub(crate) fn new(client: ObjectClient, bucket: String, key: String, upload_id: String) -> Self {
        Self {
            client,
            bucket,
            key,
            upload_id,
            inner: Mutex::new(SessionInner {
                state: MultipartState::Initiated,
                parts: BTreeMap::new(),
            }),
        }
    }

    pub fn upload_id(&self) -> &str {
        &self.upload_id
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> MultipartState {
        self.inner.lock().state
    }

    /// Recorded parts in ascending part-number order
    pub fn recorded_parts(&self) -> Vec<CompletedPart> {
        self.inner
            .lock()
            .parts
            .iter()
            .map(|(number, etag)| CompletedPart::new(*number, etag.clone()))
            .collect()
    }

    /// Upload a part and record its ETag
    pub async fn upload_part(&self, part_number: i32, body: TransferBody) -> Result<String> {
        self.ensure_open("upload a part to")?;

        let etag = self
            .client
            .upload_part(
                &self.bucket,
                &self.key,
                &self.upload_id,
                part_number,
                body,
                &Options::new(),
            )
            .await?;

        let mut inner = self.inner.lock();
        if inner.state.accepts_parts() {
            inner.state = MultipartState::Uploading;
            inner.parts.insert(part_number, etag.clone());
        }
        Ok(etag)
    }

    /// Complete with an explicit part list
    pub async fn complete(&self, parts: Vec<CompletedPart>) -> Result<()> {
        self.ensure_open("complete")?;

        let result = self
            .client
            .complete_multipart(&self.bucket, &self.key, &self.upload_id, parts)
            .await;

        match &result {
            Ok(()) => self.set_state(MultipartState::Completed),
            // a local validation failure leaves the upload untouched
            Err(e) if e.kind() == crate::error::ErrorKind::Validation => {}
            Err(_) => self.set_state(MultipartState::Failed),
        }
        result
    }

    /// Complete with every recorded part
    pub async fn complete_recorded(&self) -> Result<()> {
        let parts = self.recorded_parts();
        self.complete(parts).await
    }

    /// Complete as a zero-length object
    ///
    /// Uploads a single empty part, since completion needs at least one.
    pub async fn complete_empty(&self) -> Result<()> {
        self.ensure_open("complete")?;
        if !self.inner.lock().parts.is_empty() {
            return Err(self
                .client
                .scope()
                .validation("upload already has parts, complete it with its part list"));
        }

        let etag = self.upload_part(1, TransferBody::Bytes(Bytes::new())).await?;
        debug!(upload_id = %self.upload_id, "Uploaded empty part for zero-length object");
        self.complete(vec![CompletedPart::new(1, etag)]).await
    }

    /// Abort the upload; a second abort is a no-op
    pub async fn abort(&self) -> Result<()> {
        match self.state() {
            MultipartState::Aborted => return Ok(()),
            MultipartState::Completed => {
                return Err(self
                    .client
                    .scope()
                    .validation(format!("upload {} is already completed", self.upload_id)))
            }
            _ => {}
        }

        self.client
            .abort_multipart(&self.bucket, &self.key, &self.upload_id)
            .await?;
        self.set_state(MultipartState::Aborted);
        info!(upload_id = %self.upload_id, "Multipart session aborted");
        Ok(())
    }

    fn ensure_open(&self, action: &str) -> Result<()> {
        let state = self.state();
        if state.accepts_parts() {
            return Ok(());
        }
        Err(self.client.scope().validation(format!(
            "cannot {} upload {} in state {:?}",
            action, self.upload_id, state
        )))
    }

    fn set_state(&self, state: MultipartState) {
        self.inner.lock().state = state;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::MemoryStore;
    use crate::error::{ErrorKind, ServiceFault};
    use std::sync::Arc;

    async fn session() -> (Arc<MemoryStore>, MultipartSession) {
        let store = Arc::new(MemoryStore::new());
        let client = ObjectClient::new(store.clone());
        client.create_bucket("b", &Options::new()).await.unwrap();
        let session = client.begin_multipart("b", "big.bin", &Options::new()).await.unwrap();
        (store, session)
    }

    #[tokio::test]
    async fn test_lifecycle_completes() {
        let (store, session) = session().await;
        assert_eq!(session.state(), MultipartState::Initiated);

        session.upload_part(2, TransferBody::from("world")).await.unwrap();
        session.upload_part(1, TransferBody::from("hello ")).await.unwrap();
        assert_eq!(session.state(), MultipartState::Uploading);

        let numbers: Vec<i32> = session.recorded_parts().iter().map(|p| p.part_number).collect();
        assert_eq!(numbers, vec![1, 2]);

        session.complete_recorded().await.unwrap();
        assert_eq!(session.state(), MultipartState::Completed);
        assert_eq!(store.pending_uploads(), 0);

        let err = session.upload_part(3, TransferBody::from("x")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = session.abort().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_complete_without_parts_is_validation() {
        let (_store, session) = session().await;
        let err = session.complete(vec![]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(session.state(), MultipartState::Initiated);
    }

    #[tokio::test]
    async fn test_rejected_completion_marks_failed_then_abort() {
        let (store, session) = session().await;
        session.upload_part(1, TransferBody::from("a")).await.unwrap();

        let err = session
            .complete(vec![CompletedPart::new(1, "\"wrong\"")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("InvalidPart"));
        assert_eq!(session.state(), MultipartState::Failed);

        session.abort().await.unwrap();
        session.abort().await.unwrap();
        assert_eq!(session.state(), MultipartState::Aborted);
        assert_eq!(store.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_complete_empty() {
        let (store, session) = session().await;
        session.complete_empty().await.unwrap();
        assert_eq!(session.state(), MultipartState::Completed);
        assert_eq!(store.pending_uploads(), 0);
    }

    #[tokio::test]
    async fn test_failed_part_upload_keeps_session_open() {
        let (store, session) = session().await;
        store.fail_operation("upload_part", ServiceFault::coded("SlowDown", "reduce rate"));
        assert!(session.upload_part(1, TransferBody::from("a")).await.is_err());
        assert_eq!(session.state(), MultipartState::Initiated);

        store.clear_failures();
        session.upload_part(1, TransferBody::from("a")).await.unwrap();
        assert_eq!(session.state(), MultipartState::Uploading);
    }
}
