//! Locating the peripheral among the host's serial devices.
//!
//! Discovery only matches on USB vendor and product ID. Plenty of generic
//! boards share those, so a match here is a candidate, not proof; the
//! handshake decides whether the firmware is really ours.

use async_trait::async_trait;
use std::fmt;
use tokio_serial::{SerialPortInfo, SerialPortType};

use crate::error::{ConfigError, DiscoveryError};
use crate::tracing::prelude::*;

/// USB vendor and product ID of the peripheral class we accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceIdentity {
    vid: u16,
    pid: u16,
}

impl DeviceIdentity {
    pub const fn new(vid: u16, pid: u16) -> Self {
        Self { vid, pid }
    }

    /// Parse IDs written as `0xNNNN`.
    pub fn parse(vid: &str, pid: &str) -> Result<Self, ConfigError> {
        Ok(Self::new(parse_id(vid)?, parse_id(pid)?))
    }

    pub fn vid(&self) -> u16 {
        self.vid
    }

    pub fn pid(&self) -> u16 {
        self.pid
    }

    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }

    pub(crate) fn not_found(&self) -> DiscoveryError {
        DiscoveryError::NotFound {
            vid: format!("{:#06x}", self.vid),
            pid: format!("{:#06x}", self.pid),
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}:{:#06x}", self.vid, self.pid)
    }
}

/// Parse a single USB ID written as `0xNNNN`.
pub fn parse_id(text: &str) -> Result<u16, ConfigError> {
    parse_usb_id(text).ok_or_else(|| ConfigError::InvalidUsbId(text.to_string()))
}

/// Parse a `0x`-prefixed hexadecimal USB ID of one to four digits.
pub(crate) fn parse_usb_id(text: &str) -> Option<u16> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))?;
    if digits.is_empty() || digits.len() > 4 {
        return None;
    }
    u16::from_str_radix(digits, 16).ok()
}

/// A discovered serial endpoint that has not been opened yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortHandle {
    /// OS path of the port, e.g. `/dev/cu.usbmodem1101`.
    pub address: String,
    /// Board name reported by the enumerator, if any.
    pub board: Option<String>,
}

impl PortHandle {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            board: None,
        }
    }
}

impl fmt::Display for PortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

/// Finds the port of a device with a given identity.
#[async_trait]
pub trait DeviceEnumerator: Send + Sync {
    async fn find_port(&self, identity: &DeviceIdentity) -> Result<PortHandle, DiscoveryError>;
}

/// One USB serial port as seen by an enumerator.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub address: String,
    pub vid: u16,
    pub pid: u16,
    pub board: Option<String>,
}

/// First candidate matching `identity`, in enumeration order.
pub(crate) fn select_port<I>(candidates: I, identity: &DeviceIdentity) -> Result<PortHandle, DiscoveryError>
where
    I: IntoIterator<Item = Candidate>,
{
    candidates
        .into_iter()
        .find(|c| identity.matches(c.vid, c.pid))
        .map(|c| {
            info!(
                board = c.board.as_deref().unwrap_or("Unknown Board"),
                identity = %identity,
                port = %c.address,
                "Found candidate device."
            );
            PortHandle {
                address: c.address,
                board: c.board,
            }
        })
        .ok_or_else(|| identity.not_found())
}

/// Enumerates ports through the OS serial port API.
#[derive(Debug, Default, Clone)]
pub struct NativeEnumerator;

impl NativeEnumerator {
    pub fn new() -> Self {
        Self
    }
}

fn usb_candidates(ports: Vec<SerialPortInfo>) -> impl Iterator<Item = Candidate> {
    ports.into_iter().filter_map(|port| match port.port_type {
        SerialPortType::UsbPort(usb) => Some(Candidate {
            address: port.port_name,
            vid: usb.vid,
            pid: usb.pid,
            board: usb.product,
        }),
        _ => None,
    })
}

#[async_trait]
impl DeviceEnumerator for NativeEnumerator {
    async fn find_port(&self, identity: &DeviceIdentity) -> Result<PortHandle, DiscoveryError> {
        let ports = tokio::task::spawn_blocking(tokio_serial::available_ports)
            .await
            .map_err(|e| DiscoveryError::Enumeration(e.to_string()))?
            .map_err(|e| DiscoveryError::Enumeration(e.to_string()))?;
        debug!(count = ports.len(), "Enumerated serial ports.");
        select_port(usb_candidates(ports), identity)
    }
}
