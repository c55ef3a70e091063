//! Connection supervisor.
//!
//! The manager is the process-wide control loop. Each cycle discovers the
//! device, opens its port and runs one [`Session`] to completion. Every
//! cycle ends in exactly one [`CycleOutcome`], and every outcome maps to
//! exactly one backoff before the next cycle:
//!
//! | Outcome                      | Next cycle after      |
//! |------------------------------|-----------------------|
//! | device not found             | `discovery_backoff`   |
//! | port could not be opened     | `discovery_backoff`   |
//! | handshake failed / link lost | `session_backoff`     |
//! | shutdown                     | never                 |
//!
//! Sessions run inline, so a new discovery cannot start while a session is
//! alive.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{DiscoveryError, OpenError};
use crate::microphone::MicrophoneBackend;
use crate::session::{Session, SessionEnd};
use crate::tracing::prelude::*;
use crate::transport::{DeviceEnumerator, PortOpener};

/// What the manager is doing right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// Looking for the device.
    Searching,
    /// Opening the discovered port.
    Connecting { port: String },
    /// A session owns the port.
    Connected { port: String, session: u64 },
    /// Waiting before the next cycle.
    Backoff { delay: Duration },
    /// The manager has exited.
    Stopped,
}

/// How one discover-open-session cycle ended.
#[derive(Debug)]
pub enum CycleOutcome {
    DiscoveryFailed(DiscoveryError),
    OpenFailed(OpenError),
    Session(SessionEnd),
    Shutdown,
}

impl CycleOutcome {
    /// Delay before the next cycle, or `None` to stop.
    pub fn backoff(&self, config: &Config) -> Option<Duration> {
        match self {
            CycleOutcome::DiscoveryFailed(_) | CycleOutcome::OpenFailed(_) => {
                Some(config.discovery_backoff)
            }
            CycleOutcome::Session(SessionEnd::Shutdown) | CycleOutcome::Shutdown => None,
            CycleOutcome::Session(_) => Some(config.session_backoff),
        }
    }
}

/// Finds, connects to and supervises the peripheral.
pub struct ConnectionManager {
    config: Config,
    enumerator: Arc<dyn DeviceEnumerator>,
    opener: Arc<dyn PortOpener>,
    backend: Arc<dyn MicrophoneBackend>,
    status: watch::Sender<LinkStatus>,
}

impl ConnectionManager {
    pub fn new(
        config: Config,
        enumerator: Arc<dyn DeviceEnumerator>,
        opener: Arc<dyn PortOpener>,
        backend: Arc<dyn MicrophoneBackend>,
    ) -> Self {
        let (status, _) = watch::channel(LinkStatus::Searching);
        Self {
            config,
            enumerator,
            opener,
            backend,
            status,
        }
    }

    /// Follow the manager's status.
    pub fn subscribe(&self) -> watch::Receiver<LinkStatus> {
        self.status.subscribe()
    }

    /// Run cycles until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) {
        info!(identity = %self.config.identity, "Connection manager started.");

        loop {
            let outcome = self.cycle(&shutdown).await;
            let Some(delay) = outcome.backoff(&self.config) else {
                break;
            };

            self.status.send_replace(LinkStatus::Backoff { delay });
            debug!(delay_ms = delay.as_millis() as u64, "Waiting before next attempt.");
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = time::sleep(delay) => {}
            }
        }

        self.status.send_replace(LinkStatus::Stopped);
        info!("Connection manager stopped.");
    }

    /// One discover, open, session pass.
    pub async fn cycle(&self, shutdown: &CancellationToken) -> CycleOutcome {
        self.status.send_replace(LinkStatus::Searching);
        let found = tokio::select! {
            _ = shutdown.cancelled() => return CycleOutcome::Shutdown,
            found = self.enumerator.find_port(&self.config.identity) => found,
        };
        let port = match found {
            Ok(port) => port,
            Err(e) => {
                warn!(
                    error = %e,
                    retry_secs = self.config.discovery_backoff.as_secs(),
                    "Device not found."
                );
                return CycleOutcome::DiscoveryFailed(e);
            }
        };

        self.status.send_replace(LinkStatus::Connecting {
            port: port.address.clone(),
        });
        let transport = match self.opener.open(&port).await {
            Ok(transport) => transport,
            Err(e) => {
                match &e {
                    OpenError::PortBusy { .. } => warn!(
                        port = %port,
                        error = %e,
                        retry_secs = self.config.discovery_backoff.as_secs(),
                        "Port held by another process."
                    ),
                    OpenError::Failed { .. } => warn!(
                        port = %port,
                        error = %e,
                        retry_secs = self.config.discovery_backoff.as_secs(),
                        "Failed to open port."
                    ),
                }
                return CycleOutcome::OpenFailed(e);
            }
        };
        info!(port = %port, baud = self.config.serial.baud_rate, "Serial port opened.");

        let session = Session::new(transport, self.backend.clone(), self.config.identify_timeout);
        self.status.send_replace(LinkStatus::Connected {
            port: port.address.clone(),
            session: session.id(),
        });

        let end = session.run(shutdown).await;
        match &end {
            SessionEnd::HandshakeFailed(_) | SessionEnd::LinkLost(_) => info!(
                port = %port,
                retry_secs = self.config.session_backoff.as_secs(),
                "Session ended, reconnecting."
            ),
            SessionEnd::Shutdown => {}
        }
        CycleOutcome::Session(end)
    }
}
