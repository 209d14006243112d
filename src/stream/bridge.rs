//! Pull bridge over a [`ChunkSource`]

use super::ChunkSource;
use crate::error::{ErrorScope, Result};
use bytes::{Bytes, BytesMut};
use tracing::{debug, trace, warn};

/// Observable bridge state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    Empty,
    HasData,
    Ended,
    /// The source faulted; every later read repeats the fault
    Failed,
    Closed,
}

/// Result of a single [`ChunkReader::read`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOutcome {
    pub bytes: Bytes,
    /// No more data will ever be returned
    pub ended: bool,
}

impl ReadOutcome {
    fn data(bytes: Bytes) -> Self {
        Self {
            bytes,
            ended: false,
        }
    }

    fn nothing() -> Self {
        Self::data(Bytes::new())
    }

    fn end() -> Self {
        Self {
            bytes: Bytes::new(),
            ended: true,
        }
    }
}

struct BufferedChunk {
    bytes: Bytes,
    cursor: usize,
}

impl BufferedChunk {
    fn new(bytes: Bytes) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn take(&mut self, max_bytes: usize) -> Bytes {
        let end = self.bytes.len().min(self.cursor + max_bytes);
        let out = self.bytes.slice(self.cursor..end);
        self.cursor = end;
        out
    }

    fn is_exhausted(&self) -> bool {
        self.cursor >= self.bytes.len()
    }
}

enum State {
    Empty,
    HasData(BufferedChunk),
    Ended,
    Failed(String),
    Closed,
}

/// Bounded byte reader over a chunk source
///
/// Holds at most one chunk and only pulls from the source when a read finds
/// nothing buffered. A source fault surfaces as a `Connectivity` error and
/// is terminal: the source is never pulled again and later reads return the
/// same error until the reader is closed.
pub struct ChunkReader<S> {
    source: S,
    state: State,
    scope: ErrorScope,
    delivered: u64,
}

impl<S: ChunkSource> ChunkReader<S> {
    pub fn new(source: S, scope: ErrorScope) -> Self {
        Self {
            source,
            state: State::Empty,
            scope,
            delivered: 0,
        }
    }

    pub fn state(&self) -> BridgeState {
        match self.state {
            State::Empty => BridgeState::Empty,
            State::HasData(_) => BridgeState::HasData,
            State::Ended => BridgeState::Ended,
            State::Failed(_) => BridgeState::Failed,
            State::Closed => BridgeState::Closed,
        }
    }

    /// Total bytes handed to the caller so far
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Read up to `max_bytes`
    ///
    /// Returns `ended = true` with no bytes once the source is exhausted or
    /// the reader is closed. A `max_bytes` of zero never pulls. After a
    /// source fault every read returns that fault.
    pub async fn read(&mut self, max_bytes: usize) -> Result<ReadOutcome> {
        loop {
            match &mut self.state {
                State::Ended | State::Closed => return Ok(ReadOutcome::end()),
                State::Failed(message) => {
                    return Err(self.scope.connectivity(message.clone()));
                }
                State::Empty => {
                    if max_bytes == 0 {
                        return Ok(ReadOutcome::nothing());
                    }
                    match self.source.next_chunk().await {
                        Ok(Some(chunk)) if chunk.is_empty() => {
                            trace!("Empty chunk from source, pulling again");
                        }
                        Ok(Some(chunk)) => {
                            debug!(chunk_len = chunk.len(), "Bridge Empty -> HasData");
                            self.state = State::HasData(BufferedChunk::new(chunk));
                        }
                        Ok(None) => {
                            debug!(delivered = self.delivered, "Bridge Empty -> Ended");
                            self.state = State::Ended;
                            return Ok(ReadOutcome::end());
                        }
                        Err(e) => {
                            let message = format!("error reading from chunk source: {}", e);
                            warn!(error = %e, delivered = self.delivered, "Bridge Empty -> Failed");
                            self.state = State::Failed(message.clone());
                            return Err(self.scope.connectivity(message));
                        }
                    }
                }
                State::HasData(chunk) => {
                    if max_bytes == 0 {
                        return Ok(ReadOutcome::nothing());
                    }
                    let bytes = chunk.take(max_bytes);
                    if chunk.is_exhausted() {
                        trace!("Bridge HasData -> Empty");
                        self.state = State::Empty;
                    }
                    self.delivered += bytes.len() as u64;
                    return Ok(ReadOutcome::data(bytes));
                }
            }
        }
    }

    /// Copy up to `buf.len()` bytes into `buf`
    pub async fn read_into(&mut self, buf: &mut [u8]) -> Result<(usize, bool)> {
        let outcome = self.read(buf.len()).await?;
        let n = outcome.bytes.len();
        buf[..n].copy_from_slice(&outcome.bytes);
        Ok((n, outcome.ended))
    }

    /// Drain the source into one contiguous buffer
    pub async fn read_to_end(&mut self, read_size: usize) -> Result<Bytes> {
        let read_size = read_size.max(1);
        let mut out = BytesMut::new();
        loop {
            let outcome = self.read(read_size).await?;
            if outcome.ended {
                return Ok(out.freeze());
            }
            out.extend_from_slice(&outcome.bytes);
        }
    }

    /// Close the reader, releasing the source if it supports release
    ///
    /// Idempotent. The reader is Closed afterwards even when release fails.
    pub async fn close(&mut self) -> Result<()> {
        if matches!(self.state, State::Closed) {
            return Ok(());
        }
        debug!(delivered = self.delivered, "Bridge -> Closed");
        self.state = State::Closed;

        if !self.source.can_release() {
            return Ok(());
        }
        self.source.release().await.map_err(|e| {
            warn!(error = %e, "Chunk source release failed");
            self.scope
                .connectivity(format!("error closing chunk source: {}", e))
        })
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::stream::SourceError;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    struct Scripted {
        items: VecDeque<std::result::Result<Option<Bytes>, SourceError>>,
        pulls: usize,
        releasable: bool,
        releases: usize,
    }

    impl Scripted {
        fn new(items: Vec<std::result::Result<Option<Bytes>, SourceError>>) -> Self {
            Self {
                items: items.into(),
                pulls: 0,
                releasable: false,
                releases: 0,
            }
        }

        fn chunks(chunks: &[&'static str]) -> Self {
            Self::new(
                chunks
                    .iter()
                    .map(|c| Ok(Some(Bytes::from_static(c.as_bytes()))))
                    .collect(),
            )
        }
    }

    #[async_trait]
    impl ChunkSource for Scripted {
        async fn next_chunk(&mut self) -> std::result::Result<Option<Bytes>, SourceError> {
            self.pulls += 1;
            self.items.pop_front().unwrap_or(Ok(None))
        }

        fn can_release(&self) -> bool {
            self.releasable
        }

        async fn release(&mut self) -> std::result::Result<(), SourceError> {
            self.releases += 1;
            Ok(())
        }
    }

    fn reader(source: Scripted) -> ChunkReader<Scripted> {
        ChunkReader::new(source, ErrorScope::default())
    }

    async fn drain(reader: &mut ChunkReader<Scripted>, max: usize) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let outcome = reader.read(max).await.unwrap();
            if outcome.ended {
                return out;
            }
            assert!(outcome.bytes.len() <= max);
            out.extend_from_slice(&outcome.bytes);
        }
    }

    #[tokio::test]
    async fn test_concatenation_across_read_sizes() {
        for max in [1, 2, 3, 5, 64] {
            let mut r = reader(Scripted::chunks(&["abc", "de"]));
            assert_eq!(drain(&mut r, max).await, b"abcde", "max {}", max);
            assert_eq!(r.delivered(), 5);
        }
    }

    #[tokio::test]
    async fn test_reads_within_one_chunk() {
        let mut r = reader(Scripted::chunks(&["abc", "de"]));

        let first = r.read(2).await.unwrap();
        assert_eq!(first.bytes, Bytes::from("ab"));
        assert!(!first.ended);
        assert_eq!(r.state(), BridgeState::HasData);

        let second = r.read(10).await.unwrap();
        assert_eq!(second.bytes, Bytes::from("c"));
        assert_eq!(r.state(), BridgeState::Empty);

        let third = r.read(10).await.unwrap();
        assert_eq!(third.bytes, Bytes::from("de"));

        let fourth = r.read(10).await.unwrap();
        assert!(fourth.ended);
        assert!(fourth.bytes.is_empty());
        assert_eq!(r.state(), BridgeState::Ended);
    }

    #[tokio::test]
    async fn test_empty_chunks_are_not_end_of_data() {
        let mut r = reader(Scripted::chunks(&["", "", "x"]));
        let outcome = r.read(4).await.unwrap();
        assert_eq!(outcome.bytes, Bytes::from("x"));
        assert!(!outcome.ended);
    }

    #[tokio::test]
    async fn test_immediate_end() {
        let mut r = reader(Scripted::new(vec![]));
        let outcome = r.read(16).await.unwrap();
        assert!(outcome.ended);

        // Idempotent once ended
        assert!(r.read(16).await.unwrap().ended);
        assert_eq!(r.into_inner().pulls, 1);
    }

    #[tokio::test]
    async fn test_zero_max_bytes_does_not_pull() {
        let mut r = reader(Scripted::chunks(&["abc"]));
        let outcome = r.read(0).await.unwrap();
        assert!(outcome.bytes.is_empty());
        assert!(!outcome.ended);
        assert_eq!(r.into_inner().pulls, 0);
    }

    #[tokio::test]
    async fn test_source_fault_is_connectivity() {
        let mut r = reader(Scripted::new(vec![
            Ok(Some(Bytes::from("ok"))),
            Err(SourceError::new("producer crashed")),
        ]));

        assert_eq!(r.read(8).await.unwrap().bytes, Bytes::from("ok"));
        let err = r.read(8).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Connectivity);
        assert!(err.message().contains("producer crashed"));
        assert_eq!(r.state(), BridgeState::Failed);

        // terminal: the chunk queued after the fault is never pulled
        let again = r.read(8).await.unwrap_err();
        assert_eq!(again.kind(), ErrorKind::Connectivity);
        assert_eq!(again.message(), err.message());
        assert!(r.read_to_end(8).await.is_err());
        assert_eq!(r.into_inner().pulls, 2);
    }

    #[tokio::test]
    async fn test_close_after_fault() {
        let mut source = Scripted::new(vec![
            Err(SourceError::new("producer crashed")),
            Ok(Some(Bytes::from("late"))),
        ]);
        source.releasable = true;
        let mut r = reader(source);

        assert!(r.read(8).await.is_err());
        r.close().await.unwrap();
        assert_eq!(r.state(), BridgeState::Closed);
        assert!(r.read(8).await.unwrap().ended);

        let source = r.into_inner();
        assert_eq!(source.releases, 1);
        assert_eq!(source.pulls, 1);
    }

    #[tokio::test]
    async fn test_close_releases_once() {
        let mut source = Scripted::chunks(&["abc"]);
        source.releasable = true;
        let mut r = reader(source);

        r.read(1).await.unwrap();
        r.close().await.unwrap();
        r.close().await.unwrap();

        let outcome = r.read(8).await.unwrap();
        assert!(outcome.ended);
        assert_eq!(r.state(), BridgeState::Closed);
        assert_eq!(r.into_inner().releases, 1);
    }

    #[tokio::test]
    async fn test_close_without_release_capability() {
        let mut r = reader(Scripted::chunks(&["abc"]));
        r.close().await.unwrap();
        assert_eq!(r.state(), BridgeState::Closed);
        assert_eq!(r.into_inner().releases, 0);
    }

    #[tokio::test]
    async fn test_read_to_end_and_read_into() {
        let mut r = reader(Scripted::chunks(&["hello ", "", "world"]));
        assert_eq!(r.read_to_end(4).await.unwrap(), Bytes::from("hello world"));

        let mut r = reader(Scripted::chunks(&["xyz"]));
        let mut buf = [0u8; 2];
        let (n, ended) = r.read_into(&mut buf).await.unwrap();
        assert_eq!((n, ended), (2, false));
        assert_eq!(&buf, b"xy");
    }
}
