//! Common error types for mutebridge.
//!
//! Each stage of the connection lifecycle has its own error type so the
//! connection manager can pick a recovery path by matching on it. The
//! crate-wide [`Error`] wraps them all for callers that only need to report.

use std::io;
use thiserror::Error;

/// No device matching the configured identity could be located.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Enumeration worked but nothing matched.
    #[error("no device found with VID {vid} and PID {pid}")]
    NotFound { vid: String, pid: String },

    /// The enumeration tool or API itself failed.
    #[error("device enumeration failed: {0}")]
    Enumeration(String),
}

/// A discovered port could not be opened.
#[derive(Error, Debug)]
pub enum OpenError {
    /// Another process holds the port, or we lack permission to take it.
    #[error("serial port {port} is busy: {reason}")]
    PortBusy { port: String, reason: String },

    #[error("failed to open serial port {port}: {source}")]
    Failed {
        port: String,
        #[source]
        source: tokio_serial::Error,
    },
}

/// Failure on an open line transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Peripheral sent more than the configured maximum without a newline.
    /// The line was dropped; the transport is still usable.
    #[error("line exceeds maximum length")]
    LineTooLong,

    /// The read side reached end of stream.
    #[error("device disconnected")]
    Disconnected,
}

/// The connected device did not prove it runs the expected firmware.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("no identification response within {0:?}")]
    Timeout(std::time::Duration),

    #[error("unexpected identification response {0:?}")]
    UnexpectedResponse(String),

    #[error("transport failed during identification: {0}")]
    Io(#[from] TransportError),
}

/// Microphone backend query or update failure.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to query microphone state: {0}")]
    Query(String),

    #[error("failed to set microphone state: {0}")]
    Set(String),
}

/// Invalid configuration value.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid USB identifier {0:?} (expected 0xNNNN)")]
    InvalidUsbId(String),

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

/// Main error type for mutebridge operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Convenience type alias for Results using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
