//! In-memory byte source for pre-recorded chunks

use bytes::Bytes;
use std::collections::VecDeque;
use std::time::Duration;

use crate::Result;
use crate::source::ByteSource;

/// Byte source that replays a fixed list of chunks.
///
/// Useful for tests and tooling that already hold capture bytes. By default
/// the source closes after the last chunk; [`MemorySource::keep_open`] makes it
/// behave like a live link that simply went quiet.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    chunks: VecDeque<Bytes>,
    pacing: Option<Duration>,
    keep_open: bool,
}

impl MemorySource {
    /// Create a source from explicit chunks, delivered in order.
    pub fn from_chunks<I, B>(chunks: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        Self { chunks: chunks.into_iter().map(Into::into).collect(), ..Self::default() }
    }

    /// Split a contiguous capture into fixed-size chunks.
    pub fn chunked(bytes: &[u8], chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self::from_chunks(bytes.chunks(chunk_size).map(Bytes::copy_from_slice).collect::<Vec<_>>())
    }

    /// Wait this long before delivering each chunk.
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = Some(pacing);
        self
    }

    /// Never report the source as closed once chunks run out.
    pub fn keep_open(mut self) -> Self {
        self.keep_open = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.chunks.len()
    }
}

#[async_trait::async_trait]
impl ByteSource for MemorySource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        if let Some(pacing) = self.pacing {
            tokio::time::sleep(pacing).await;
        }
        match self.chunks.pop_front() {
            Some(chunk) => Ok(Some(chunk)),
            None if self.keep_open => std::future::pending().await,
            None => Ok(None),
        }
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
