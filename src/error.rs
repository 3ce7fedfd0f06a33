//! Error types for the telemetry relay.
//!
//! Very little in the relay is allowed to fail loudly. Framing errors, unknown
//! message ids and subscriber hiccups are absorbed where they happen. What is
//! left surfaces here:
//!
//! - **Source errors**: a byte source could not be opened, bound or read
//! - **Config errors**: a configuration file is unreadable or invalid
//! - **Channel errors**: the relay's background tasks have already stopped
//!
//! ```rust
//! use groundlink::RelayError;
//!
//! let error = RelayError::source_failed("udp socket closed by peer");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for relay operations.
pub type Result<T, E = RelayError> = std::result::Result<T, E>;

/// Main error type for relay operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RelayError {
    #[error("Byte source failed: {reason}")]
    Source {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Failed to bind UDP socket on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Capture file error: {path}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {details}")]
    Config { details: String },

    #[error("Relay channel closed: {context}")]
    ChannelClosed { context: String },
}

impl RelayError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            RelayError::Source { .. } => true,
            RelayError::Bind { .. } => true,
            RelayError::File { .. } => false,
            RelayError::Config { .. } => false,
            RelayError::ChannelClosed { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RelayError::Source { .. } => vec![
                "Check the vehicle or companion computer is still transmitting",
                "Verify the network link (VPN, radio modem) is up",
                "Attach a fresh source to resume the session",
            ],
            RelayError::Bind { .. } => vec![
                "Ensure no other ground station is bound to the same port",
                "Choose a different udp_bind address in the configuration",
                "Check permissions for the requested port",
            ],
            RelayError::File { .. } => vec![
                "Check the capture file exists and is readable",
                "Verify the file contains raw MAVLink bytes",
            ],
            RelayError::Config { .. } => vec![
                "Check the YAML syntax of the configuration file",
                "Compare field names against the documented defaults",
                "Make sure queue sizes and intervals are non-zero",
            ],
            RelayError::ChannelClosed { .. } => {
                vec!["Start a new relay; the previous one has shut down"]
            }
        }
    }

    /// Helper constructor for source errors.
    pub fn source_failed(reason: impl Into<String>) -> Self {
        RelayError::Source { reason: reason.into(), source: None }
    }

    /// Helper constructor for source errors with an underlying cause.
    pub fn source_failed_with(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        RelayError::Source { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for capture file errors with path context.
    pub fn file_error(path: PathBuf, source: std::io::Error) -> Self {
        RelayError::File { path, source }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        RelayError::Config { details: details.into() }
    }

    /// Helper constructor for closed relay channels.
    pub fn channel_closed(context: impl Into<String>) -> Self {
        RelayError::ChannelClosed { context: context.into() }
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Source { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}

impl From<serde_yaml_ng::Error> for RelayError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        RelayError::Config { details: err.to_string() }
    }
}
