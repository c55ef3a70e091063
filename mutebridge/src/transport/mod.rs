//! Physical transport to the peripheral.
//!
//! This module finds the peripheral's serial port, opens it and wraps the
//! byte stream in a newline-delimited [`Transport`]. It knows nothing about
//! the command vocabulary; see [`crate::protocol`] for that.

pub mod arduino_cli;
pub mod codec;
pub mod discovery;
pub mod serial;

pub use arduino_cli::ArduinoCliEnumerator;
pub use discovery::{DeviceEnumerator, DeviceIdentity, NativeEnumerator, PortHandle};
pub use serial::{PortOpener, SerialPortOpener};

use futures::SinkExt;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio_stream::StreamExt;
use tokio_util::codec::{FramedRead, FramedWrite};

use codec::{Line, LineCodec};

use crate::error::TransportError;
use crate::tracing::prelude::*;

/// Anything a [`Transport`] can run over: a serial stream in production,
/// an in-memory duplex pipe in tests.
pub trait SerialLink: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> SerialLink for T {}

type Link = Box<dyn SerialLink>;

/// Open, line-oriented duplex channel to one device.
///
/// Reads yield one line at a time with the `\n` (and any `\r`) stripped.
/// Invalid UTF-8 is replaced rather than rejected. Writes append a single
/// `\n`. The transport is exclusively owned by
/// whoever holds it; dropping or [closing](Transport::close) it releases the
/// port.
pub struct Transport {
    port: String,
    reader: FramedRead<ReadHalf<Link>, LineCodec>,
    writer: FramedWrite<WriteHalf<Link>, LineCodec>,
}

impl Transport {
    /// Wrap an open link. Lines longer than `max_line_length` bytes are
    /// dropped and reported as [`TransportError::LineTooLong`]; the
    /// transport stays usable afterwards.
    pub fn new<L>(port: impl Into<String>, link: L, max_line_length: usize) -> Self
    where
        L: SerialLink + 'static,
    {
        let link: Link = Box::new(link);
        let (reader, writer) = tokio::io::split(link);
        Self {
            port: port.into(),
            reader: FramedRead::new(reader, LineCodec::new(max_line_length)),
            writer: FramedWrite::new(writer, LineCodec::new(max_line_length)),
        }
    }

    /// Port address this transport was opened on.
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Wait for the next line.
    ///
    /// Cancel safe: if the returned future is dropped before completing, no
    /// line is lost from the stream.
    pub async fn read_line(&mut self) -> Result<String, TransportError> {
        match self.reader.next().await {
            Some(Ok(Line::Text(line))) => {
                trace!(port = %self.port, line = %line, "Read line.");
                Ok(line)
            }
            Some(Ok(Line::Overlong)) => Err(TransportError::LineTooLong),
            Some(Err(e)) => Err(TransportError::Io(e)),
            None => Err(TransportError::Disconnected),
        }
    }

    /// Write `line` followed by `\n` and flush.
    pub async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        trace!(port = %self.port, line = %line, "Writing line.");
        self.writer.send(line).await.map_err(TransportError::Io)
    }

    /// Shut down the write side and release the port.
    pub async fn close(mut self) {
        if let Err(e) = SinkExt::<&str>::close(&mut self.writer).await {
            debug!(port = %self.port, error = %e, "Error while closing transport.");
        }
        debug!(port = %self.port, "Transport closed.");
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport").field("port", &self.port).finish()
    }
}
