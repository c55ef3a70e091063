//! Opening serial ports.

use async_trait::async_trait;
use std::io;
use tokio_serial::{DataBits, ErrorKind, FlowControl, Parity, SerialPortBuilderExt, StopBits};

use super::{PortHandle, Transport};
use crate::config::SerialSettings;
use crate::error::OpenError;
use crate::tracing::prelude::*;

/// Turns a discovered [`PortHandle`] into an open [`Transport`].
#[async_trait]
pub trait PortOpener: Send + Sync {
    async fn open(&self, port: &PortHandle) -> Result<Transport, OpenError>;
}

/// Opens real serial ports at 8N1 with the configured baud rate.
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    settings: SerialSettings,
    max_line_length: usize,
}

impl SerialPortOpener {
    pub fn new(settings: SerialSettings, max_line_length: usize) -> Self {
        Self {
            settings,
            max_line_length,
        }
    }
}

#[async_trait]
impl PortOpener for SerialPortOpener {
    async fn open(&self, port: &PortHandle) -> Result<Transport, OpenError> {
        debug!(port = %port, baud = self.settings.baud_rate, "Opening serial port.");
        let stream = tokio_serial::new(port.address.as_str(), self.settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()
            .map_err(|e| classify_open_error(&port.address, e))?;
        Ok(Transport::new(port.address.clone(), stream, self.max_line_length))
    }
}

// The serial layer reports EBUSY as an unknown error with a "busy"
// description, so both the kind and the text are checked.
fn classify_open_error(port: &str, e: tokio_serial::Error) -> OpenError {
    let busy = matches!(
        e.kind,
        ErrorKind::Io(io::ErrorKind::PermissionDenied) | ErrorKind::Io(io::ErrorKind::AddrInUse)
    ) || e.description.to_ascii_lowercase().contains("busy");

    if busy {
        OpenError::PortBusy {
            port: port.to_string(),
            reason: e.description,
        }
    } else {
        OpenError::Failed {
            port: port.to_string(),
            source: e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_port_is_distinct() {
        let err = classify_open_error(
            "/dev/ttyACM0",
            tokio_serial::Error::new(ErrorKind::Unknown, "Device or resource busy"),
        );
        assert!(matches!(err, OpenError::PortBusy { .. }));

        let err = classify_open_error(
            "/dev/ttyACM0",
            tokio_serial::Error::new(ErrorKind::Io(io::ErrorKind::PermissionDenied), "Permission denied"),
        );
        assert!(matches!(err, OpenError::PortBusy { .. }));
    }

    #[test]
    fn test_missing_port_is_generic_failure() {
        let err = classify_open_error(
            "/dev/ttyACM9",
            tokio_serial::Error::new(ErrorKind::NoDevice, "No such file or directory"),
        );
        assert!(matches!(err, OpenError::Failed { .. }));
    }
}
