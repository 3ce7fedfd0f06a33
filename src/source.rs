//! Byte source trait for telemetry transports

use bytes::Bytes;

use crate::Result;

/// Trait for raw telemetry byte sources
///
/// Sources abstract over transports (UDP, capture replay, in-memory) and
/// deliver bytes in whatever chunks the transport produces. Chunks are not
/// expected to align with frame boundaries.
#[async_trait::async_trait]
pub trait ByteSource: Send + 'static {
    /// Get the next chunk of bytes
    ///
    /// Returns:
    /// - `Ok(Some(bytes))` - More data available
    /// - `Ok(None)` - Source closed (normal termination)
    /// - `Err(e)` - Transient read error; the caller may retry
    async fn next_chunk(&mut self) -> Result<Option<Bytes>>;

    /// Short human-readable description used in logs and link notices
    fn describe(&self) -> String;
}

#[async_trait::async_trait]
impl ByteSource for Box<dyn ByteSource> {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        (**self).next_chunk().await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}
