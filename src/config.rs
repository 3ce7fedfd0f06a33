//! Relay configuration.
//!
//! Every key is optional; missing keys fall back to the defaults below.
//!
//! ```yaml
//! udp_bind: 0.0.0.0:14550
//! subscriber_queue: 64
//! link_timeout_secs: 5
//! ```

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::log_event::DEFAULT_LOG_HISTORY;
use crate::{RelayError, Result};

/// Conventional ground-station port for MAVLink over UDP.
pub const DEFAULT_UDP_PORT: u16 = 14550;

/// Runtime configuration for a [`crate::Relay`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// UDP listen address for [`crate::Relay::attach_udp`]
    pub udp_bind: SocketAddr,
    /// Per-subscriber queue capacity
    pub subscriber_queue: usize,
    /// Capacity of the ingest → aggregator channel
    pub ingest_queue: usize,
    /// Flight-time recompute cadence
    pub flight_timer_interval_ms: u64,
    /// Mark the link lost after this long without telemetry
    pub link_timeout_secs: Option<u64>,
    /// Bytes per read when replaying a capture
    pub replay_chunk_size: usize,
    /// Delay between replay reads
    pub replay_chunk_interval_ms: u64,
    /// Entries kept by log history consumers
    pub log_history: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            udp_bind: SocketAddr::from(([0, 0, 0, 0], DEFAULT_UDP_PORT)),
            subscriber_queue: 64,
            ingest_queue: 256,
            flight_timer_interval_ms: 1000,
            link_timeout_secs: None,
            replay_chunk_size: 512,
            replay_chunk_interval_ms: 10,
            log_history: DEFAULT_LOG_HISTORY,
        }
    }
}

impl RelayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: RelayConfig = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| RelayError::file_error(path.to_path_buf(), e))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn with_udp_bind(mut self, addr: SocketAddr) -> Self {
        self.udp_bind = addr;
        self
    }

    pub fn with_subscriber_queue(mut self, capacity: usize) -> Self {
        self.subscriber_queue = capacity;
        self
    }

    pub fn with_link_timeout(mut self, timeout: Duration) -> Self {
        self.link_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    /// Sub-millisecond parts are dropped; intervals beyond `u64::MAX` ms saturate.
    pub fn with_flight_timer_interval(mut self, interval: Duration) -> Self {
        self.flight_timer_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Reject values that would stall or disable the relay.
    pub fn validate(&self) -> Result<()> {
        let checks: [(&str, u64); 6] = [
            ("subscriber_queue", self.subscriber_queue as u64),
            ("ingest_queue", self.ingest_queue as u64),
            ("flight_timer_interval_ms", self.flight_timer_interval_ms),
            ("replay_chunk_size", self.replay_chunk_size as u64),
            ("replay_chunk_interval_ms", self.replay_chunk_interval_ms),
            ("log_history", self.log_history as u64),
        ];
        if let Some((key, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(RelayError::config(format!("{key} must be greater than zero")));
        }
        if self.link_timeout_secs == Some(0) {
            return Err(RelayError::config("link_timeout_secs must be greater than zero"));
        }
        Ok(())
    }

    pub fn flight_timer_interval(&self) -> Duration {
        Duration::from_millis(self.flight_timer_interval_ms)
    }

    pub fn link_timeout(&self) -> Option<Duration> {
        self.link_timeout_secs.map(Duration::from_secs)
    }

    pub fn replay_chunk_interval(&self) -> Duration {
        Duration::from_millis(self.replay_chunk_interval_ms)
    }
}
