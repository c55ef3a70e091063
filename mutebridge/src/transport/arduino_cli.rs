//! Device discovery through `arduino-cli board list`.
//!
//! The CLI knows which ports belong to Arduino boards and reports their
//! USB IDs as `0xNNNN` strings:
//!
//! ```json
//! {
//!   "detected_ports": [
//!     {
//!       "matching_boards": [{ "name": "Arduino UNO R4 WiFi", "fqbn": "arduino:renesas_uno:unor4wifi" }],
//!       "port": {
//!         "address": "/dev/cu.usbmodem1101",
//!         "protocol": "serial",
//!         "properties": { "pid": "0x1002", "vid": "0x2341", "serialNumber": "..." }
//!       }
//!     }
//!   ]
//! }
//! ```
//!
//! Ports without properties (Bluetooth, debug consoles) are skipped.

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;

use super::discovery::{parse_usb_id, select_port, Candidate, DeviceEnumerator, DeviceIdentity, PortHandle};
use crate::error::DiscoveryError;
use crate::tracing::prelude::*;

#[derive(Debug, Deserialize)]
struct BoardList {
    #[serde(default)]
    detected_ports: Vec<DetectedPort>,
}

#[derive(Debug, Deserialize)]
struct DetectedPort {
    #[serde(default)]
    matching_boards: Vec<MatchingBoard>,
    port: PortEntry,
}

#[derive(Debug, Deserialize)]
struct MatchingBoard {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PortEntry {
    address: String,
    #[serde(default)]
    properties: Option<PortProperties>,
}

#[derive(Debug, Deserialize)]
struct PortProperties {
    vid: Option<String>,
    pid: Option<String>,
}

/// Runs `arduino-cli` and picks the first port with a matching VID/PID.
#[derive(Debug, Clone)]
pub struct ArduinoCliEnumerator {
    program: String,
}

impl ArduinoCliEnumerator {
    pub fn new() -> Self {
        Self::with_program("arduino-cli")
    }

    /// Use a specific `arduino-cli` executable.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ArduinoCliEnumerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the CLI's JSON into candidates. Entries with missing or malformed
/// IDs are dropped.
fn parse_board_list(json: &[u8]) -> Result<Vec<Candidate>, DiscoveryError> {
    let list: BoardList = serde_json::from_slice(json)
        .map_err(|e| DiscoveryError::Enumeration(format!("malformed arduino-cli output: {e}")))?;
    debug!(count = list.detected_ports.len(), "arduino-cli detected ports.");

    Ok(list
        .detected_ports
        .into_iter()
        .filter_map(|item| {
            let properties = item.port.properties?;
            let vid = parse_usb_id(properties.vid.as_deref()?)?;
            let pid = parse_usb_id(properties.pid.as_deref()?)?;
            Some(Candidate {
                address: item.port.address,
                vid,
                pid,
                board: item.matching_boards.into_iter().next().map(|b| b.name),
            })
        })
        .collect())
}

#[async_trait]
impl DeviceEnumerator for ArduinoCliEnumerator {
    async fn find_port(&self, identity: &DeviceIdentity) -> Result<PortHandle, DiscoveryError> {
        debug!(program = %self.program, "Searching for device with arduino-cli.");
        let output = Command::new(&self.program)
            .args(["board", "list", "--format", "json"])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                DiscoveryError::Enumeration(format!("failed to run {}: {e}", self.program))
            })?;

        if !output.status.success() {
            return Err(DiscoveryError::Enumeration(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        select_port(parse_board_list(&output.stdout)?, identity)
    }
}
