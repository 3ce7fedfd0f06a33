//! Replay source for raw MAVLink capture files

use bytes::Bytes;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::time::{Duration, Interval, MissedTickBehavior, interval};
use tracing::{debug, info, trace};

use crate::source::ByteSource;
use crate::{RelayError, Result};

/// Replay source that reads a raw capture file in paced chunks
///
/// The file is treated as an opaque byte stream, exactly as it came off the
/// wire. Telemetry logs that interleave timestamps with frames (`.tlog`) also
/// replay, since the decoder skips bytes between frames.
pub struct ReplaySource {
    /// Open capture file
    file: File,

    /// Path for log context
    path: PathBuf,

    /// Bytes read per chunk
    chunk_size: usize,

    /// Chunk pacing interval
    interval: Interval,

    /// Total bytes delivered so far
    bytes_read: u64,

    /// File length at open time
    total_bytes: u64,
}

impl ReplaySource {
    /// Open a capture file for replay
    pub async fn open<P: AsRef<Path>>(
        path: P,
        chunk_size: usize,
        chunk_interval: Duration,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file =
            File::open(&path).await.map_err(|e| RelayError::file_error(path.clone(), e))?;
        let total_bytes = file
            .metadata()
            .await
            .map_err(|e| RelayError::file_error(path.clone(), e))?
            .len();

        let mut interval = interval(chunk_interval.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Opened capture file: {} ({} bytes)", path.display(), total_bytes);

        Ok(Self { file, path, chunk_size: chunk_size.max(1), interval, bytes_read: 0, total_bytes })
    }

    /// Fraction of the file delivered so far, in [0, 1]
    pub fn progress(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_read as f64 / self.total_bytes as f64).min(1.0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait::async_trait]
impl ByteSource for ReplaySource {
    async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        self.interval.tick().await;

        let mut buf = vec![0u8; self.chunk_size];
        let n = self.file.read(&mut buf).await.map_err(|e| {
            RelayError::source_failed_with(
                format!("failed reading {}", self.path.display()),
                Box::new(e),
            )
        })?;

        if n == 0 {
            debug!("Reached end of capture after {} bytes", self.bytes_read);
            return Ok(None);
        }

        buf.truncate(n);
        self.bytes_read += n as u64;
        trace!(bytes = n, progress = self.progress(), "Replay chunk");

        Ok(Some(Bytes::from(buf)))
    }

    fn describe(&self) -> String {
        format!("replay:{}", self.path.display())
    }
}
