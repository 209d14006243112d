//! Chunk sources and the pull bridge
//!
//! A [`ChunkSource`] is an externally driven producer of byte chunks that may
//! suspend between chunks. [`ChunkReader`] turns one into a bounded,
//! pull-on-demand byte reader that holds at most one chunk in memory.
//!
//! Three adapters cover the usual producers:
//!
//! - [`StreamSource`] wraps any `futures::Stream` of byte results
//! - [`ChannelSource`] is fed through a bounded channel by another task, and
//!   can be released (closing the channel)
//! - [`ReaderSource`] slices an `AsyncRead` (a file, stdin) into chunks

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

mod bridge;

pub use bridge::{BridgeState, ChunkReader, ReadOutcome};

/// Failure reported by a chunk source
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SourceError {
    message: String,
}

impl SourceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Externally driven producer of byte chunks
///
/// `next_chunk` may suspend. `Ok(None)` means the source is exhausted; an
/// empty chunk does not. Release is optional: sources that support it return
/// `true` from `can_release`, and the bridge calls `release` at most once.
#[async_trait]
pub trait ChunkSource: Send {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError>;

    fn can_release(&self) -> bool {
        false
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        Ok(())
    }
}

#[async_trait]
impl<S: ChunkSource + ?Sized> ChunkSource for Box<S> {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError> {
        (**self).next_chunk().await
    }

    fn can_release(&self) -> bool {
        (**self).can_release()
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        (**self).release().await
    }
}

/// Source backed by a `futures::Stream`
pub struct StreamSource<St> {
    inner: Pin<Box<St>>,
}

impl<St, E> StreamSource<St>
where
    St: Stream<Item = Result<Bytes, E>> + Send,
    E: fmt::Display,
{
    pub fn new(stream: St) -> Self {
        Self {
            inner: Box::pin(stream),
        }
    }
}

#[async_trait]
impl<St, E> ChunkSource for StreamSource<St>
where
    St: Stream<Item = Result<Bytes, E>> + Send,
    E: fmt::Display,
{
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError> {
        match self.inner.next().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(SourceError::new(e.to_string())),
            None => Ok(None),
        }
    }
}

/// Sending half paired with a [`ChannelSource`]
pub type ChunkSender = mpsc::Sender<Result<Bytes, SourceError>>;

/// Source fed by another task through a bounded channel
///
/// The producer ends the sequence by dropping its sender. Releasing the
/// source closes the channel, so further sends by the producer fail.
pub struct ChannelSource {
    rx: mpsc::Receiver<Result<Bytes, SourceError>>,
}

impl ChannelSource {
    /// Create a connected sender/source pair
    pub fn channel(capacity: usize) -> (ChunkSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }
}

#[async_trait]
impl ChunkSource for ChannelSource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError> {
        self.rx.recv().await.transpose()
    }

    fn can_release(&self) -> bool {
        true
    }

    async fn release(&mut self) -> Result<(), SourceError> {
        self.rx.close();
        Ok(())
    }
}

/// Source reading fixed-size chunks from an `AsyncRead`
pub struct ReaderSource<R> {
    reader: R,
    chunk_size: usize,
}

impl<R: AsyncRead + Send + Unpin> ReaderSource<R> {
    pub fn new(reader: R, chunk_size: usize) -> Self {
        Self {
            reader,
            chunk_size: chunk_size.max(1),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Send + Unpin> ChunkSource for ReaderSource<R> {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>, SourceError> {
        let mut buf = BytesMut::with_capacity(self.chunk_size);
        let n = self.reader.read_buf(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf.freeze()))
    }
}
