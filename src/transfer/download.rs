//! Streaming download reader

use crate::backend::{GetObjectOutput, ObjectBody, ObjectMetadata};
use crate::error::{ErrorScope, Result};
use crate::metrics;
use crate::stream::ChunkReader;
use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

/// Body of a downloaded object, read in bounded chunks
///
/// The response is released as soon as the body ends, a read fails or the
/// reader is closed. Reads after that return `None`.
pub struct ObjectReader {
    metadata: ObjectMetadata,
    reader: Option<ChunkReader<ObjectBody>>,
    chunk_size: usize,
    delivered: u64,
    metrics_enabled: bool,
}

impl std::fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectReader")
            .field("key", &self.metadata.key)
            .field("delivered", &self.delivered)
            .field("open", &self.reader.is_some())
            .finish()
    }
}

impl ObjectReader {
    pub(crate) fn new(
        output: GetObjectOutput,
        scope: ErrorScope,
        chunk_size: usize,
        metrics_enabled: bool,
    ) -> Self {
        Self {
            metadata: output.metadata,
            reader: Some(ChunkReader::new(output.body, scope)),
            chunk_size: chunk_size.max(1),
            delivered: 0,
            metrics_enabled,
        }
    }

    /// Metadata returned with the object
    pub fn metadata(&self) -> &ObjectMetadata {
        &self.metadata
    }

    /// Bytes handed out so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn is_closed(&self) -> bool {
        self.reader.is_none()
    }

    /// Next chunk of at most the configured chunk size, `None` at the end
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(None);
        };

        let outcome = match reader.read(self.chunk_size).await {
            Ok(outcome) => outcome,
            Err(err) => {
                self.abandon().await;
                return Err(err);
            }
        };
        if outcome.ended {
            self.finish();
            return Ok(None);
        }
        self.delivered += outcome.bytes.len() as u64;
        Ok(Some(outcome.bytes))
    }

    /// Drain the remaining body
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await? {
            buf.extend_from_slice(&chunk);
        }
        Ok(buf.freeze())
    }

    /// Release the response early; idempotent
    pub async fn close(&mut self) -> Result<()> {
        match self.reader.take() {
            Some(mut reader) => {
                self.record();
                reader.close().await
            }
            None => Ok(()),
        }
    }

    async fn abandon(&mut self) {
        if let Some(mut reader) = self.reader.take() {
            self.record();
            if let Err(close_err) = reader.close().await {
                warn!(key = %self.metadata.key, error = %close_err, "Closing failed download body also failed");
            }
        }
    }

    fn finish(&mut self) {
        if self.reader.take().is_some() {
            self.record();
        }
    }

    fn record(&self) {
        debug!(key = %self.metadata.key, bytes = self.delivered, "Download finished");
        if self.metrics_enabled {
            metrics::record_download_bytes(self.delivered);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::stream::StreamSource;
    use std::collections::HashMap;

    fn reader(chunks: Vec<&'static str>, chunk_size: usize) -> ObjectReader {
        let items = chunks.into_iter().map(|c| Ok(Bytes::from(c))).collect();
        reader_from(items, chunk_size)
    }

    fn reader_from(
        items: Vec<std::result::Result<Bytes, std::io::Error>>,
        chunk_size: usize,
    ) -> ObjectReader {
        let output = GetObjectOutput {
            metadata: ObjectMetadata {
                key: "k".into(),
                content_length: 0,
                content_type: None,
                etag: None,
                last_modified: None,
                storage_class: "STANDARD".into(),
                version_id: None,
                metadata: HashMap::new(),
            },
            body: Box::new(StreamSource::new(futures::stream::iter(items))),
        };
        ObjectReader::new(output, ErrorScope::default(), chunk_size, false)
    }

    #[tokio::test]
    async fn test_chunks_bounded_by_chunk_size() {
        let mut reader = reader(vec!["abcdef", "gh"], 4);
        assert_eq!(reader.next_chunk().await.unwrap().unwrap(), "abcd");
        assert_eq!(reader.next_chunk().await.unwrap().unwrap(), "ef");
        assert_eq!(reader.next_chunk().await.unwrap().unwrap(), "gh");
        assert!(reader.next_chunk().await.unwrap().is_none());
        assert!(reader.is_closed());
        assert!(reader.next_chunk().await.unwrap().is_none());
        assert_eq!(reader.delivered(), 8);
    }

    #[tokio::test]
    async fn test_close_then_read_returns_none() {
        let mut reader = reader(vec!["abc"], 16);
        reader.close().await.unwrap();
        reader.close().await.unwrap();
        assert!(reader.next_chunk().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_to_end() {
        let mut reader = reader(vec!["hello ", "", "world"], 3);
        assert_eq!(&reader.read_to_end().await.unwrap()[..], b"hello world");
    }

    #[tokio::test]
    async fn test_body_error_releases_response() {
        let mut reader = reader_from(
            vec![
                Ok(Bytes::from("abc")),
                Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer")),
                Ok(Bytes::from("never")),
            ],
            16,
        );
        assert_eq!(reader.next_chunk().await.unwrap().unwrap(), "abc");

        let err = reader.next_chunk().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert!(err.message().contains("reset by peer"));
        assert!(reader.is_closed());

        assert!(reader.next_chunk().await.unwrap().is_none());
        assert_eq!(reader.delivered(), 3);
    }
}
