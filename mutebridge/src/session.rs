//! One connection to the peripheral, from handshake to teardown.
//!
//! A [`Session`] owns its transport and walks a fixed sequence of states:
//!
//! ```text
//! Opened -> Identifying -> Syncing -> Active -> Closed
//!                |                                ^
//!                +--------- handshake failed -----+
//! ```
//!
//! - **Identifying**: run the [handshake](crate::handshake). Failure closes
//!   the session without touching the microphone; the device was never
//!   trusted.
//! - **Syncing**: read the real mute state and send it so the LED matches.
//!   A backend failure here is logged and skipped.
//! - **Active**: answer one command per line until the link fails or the
//!   session is told to shut down.
//!
//! Once identified, every way out of the session funnels through a single
//! teardown that unmutes the microphone. A button that has gone away must
//! never leave the user silently muted.
//!
//! `Closed` is terminal. The connection manager builds a new session for
//! every connection.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use strum::Display;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{HandshakeError, TransportError};
use crate::handshake;
use crate::microphone::MicrophoneBackend;
use crate::protocol::{Command, Message, Response};
use crate::tracing::prelude::*;
use crate::transport::Transport;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SessionState {
    Opened,
    Identifying,
    Syncing,
    Active,
    Closed,
}

/// Why a session ended.
#[derive(Debug)]
pub enum SessionEnd {
    /// The device did not identify itself. The microphone was not touched.
    HandshakeFailed(HandshakeError),
    /// Read or write failed on an identified session. Fail-safe ran.
    LinkLost(TransportError),
    /// Shutdown was requested. Fail-safe ran if the session was identified.
    Shutdown,
}

#[derive(Debug, Default, Clone, Copy)]
struct SessionStats {
    commands: u64,
    unknown: u64,
    backend_errors: u64,
}

/// A live connection to the peripheral.
pub struct Session {
    id: u64,
    transport: Transport,
    backend: Arc<dyn MicrophoneBackend>,
    identify_timeout: Duration,
    identified: bool,
    state: watch::Sender<SessionState>,
    stats: SessionStats,
}

impl Session {
    /// Take ownership of a freshly opened transport.
    pub fn new(
        transport: Transport,
        backend: Arc<dyn MicrophoneBackend>,
        identify_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Opened);
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            transport,
            backend,
            identify_timeout,
            identified: false,
            state,
            stats: SessionStats::default(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn port(&self) -> &str {
        self.transport.port()
    }

    /// Follow this session's state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn transition(&self, to: SessionState) {
        let from = *self.state.borrow();
        debug!(session = self.id, %from, %to, "Session state change.");
        self.state.send_replace(to);
    }

    /// Drive the session to completion and close the transport.
    pub async fn run(mut self, shutdown: &CancellationToken) -> SessionEnd {
        info!(session = self.id, port = %self.port(), "Session opened.");

        self.transition(SessionState::Identifying);
        let identified = tokio::select! {
            _ = shutdown.cancelled() => None,
            result = handshake::identify(&mut self.transport, self.identify_timeout) => Some(result),
        };
        match identified {
            None => return self.close(SessionEnd::Shutdown).await,
            Some(Err(e)) => {
                warn!(session = self.id, port = %self.port(), error = %e, "Identification failed.");
                return self.close(SessionEnd::HandshakeFailed(e)).await;
            }
            Some(Ok(())) => self.identified = true,
        }

        self.transition(SessionState::Syncing);
        let end = match self.sync().await {
            Ok(()) => {
                self.transition(SessionState::Active);
                self.serve(shutdown).await
            }
            Err(e) => SessionEnd::LinkLost(e),
        };
        self.close(end).await
    }

    // Push the real mute state to the LED. Only transport errors are fatal.
    async fn sync(&mut self) -> Result<(), TransportError> {
        match self.backend.get_muted().await {
            Ok(muted) => {
                let report = Response::for_state(muted);
                self.transport
                    .write_line(Message::from(report).encode())
                    .await?;
                info!(session = self.id, state = %report, "Initial microphone state sent.");
            }
            Err(e) => {
                warn!(
                    session = self.id,
                    error = %e,
                    "Could not read microphone state, skipping initial sync."
                );
            }
        }
        Ok(())
    }

    async fn serve(&mut self, shutdown: &CancellationToken) -> SessionEnd {
        loop {
            let line = tokio::select! {
                _ = shutdown.cancelled() => return SessionEnd::Shutdown,
                line = self.transport.read_line() => line,
            };
            let message = match line {
                Ok(line) => {
                    debug!(session = self.id, command = %line.trim(), "Command received.");
                    Message::decode(&line)
                }
                // Dropped by the transport, but still owed an answer.
                Err(TransportError::LineTooLong) => {
                    debug!(session = self.id, "Overlong line received.");
                    Message::Unrecognized(String::new())
                }
                Err(e) => return SessionEnd::LinkLost(e),
            };

            let response = respond(self.backend.as_ref(), &message).await;

            self.stats.commands += 1;
            match response {
                Response::UnknownCommand => self.stats.unknown += 1,
                Response::Error => self.stats.backend_errors += 1,
                _ => {}
            }

            if let Err(e) = self
                .transport
                .write_line(Message::from(response).encode())
                .await
            {
                return SessionEnd::LinkLost(e);
            }
            debug!(session = self.id, response = %response, "Response sent.");
        }
    }

    // Single exit path. Runs the fail-safe for identified sessions, then
    // releases the port.
    async fn close(self, end: SessionEnd) -> SessionEnd {
        if self.identified {
            match &end {
                SessionEnd::LinkLost(e) => warn!(
                    session = self.id,
                    port = %self.port(),
                    error = %e,
                    "Link to device lost, unmuting microphone."
                ),
                _ => info!(session = self.id, "Session shutting down, unmuting microphone."),
            }
            fail_safe_unmute(self.backend.as_ref()).await;
        }

        self.transition(SessionState::Closed);
        info!(
            session = self.id,
            commands = self.stats.commands,
            unknown = self.stats.unknown,
            backend_errors = self.stats.backend_errors,
            "Session closed."
        );
        self.transport.close().await;
        end
    }
}

/// Answer one decoded line from the peripheral.
///
/// Backend failures become `ERROR`; anything that is not a peripheral
/// request becomes `UNKNOWN_COMMAND`. The state reported back always comes
/// from the backend, never from what was last requested.
pub async fn respond(backend: &dyn MicrophoneBackend, message: &Message) -> Response {
    match message {
        Message::Command(Command::Mute) => set_state(backend, true).await,
        Message::Command(Command::Unmute) => set_state(backend, false).await,
        Message::Command(Command::GetState) => match backend.get_muted().await {
            Ok(muted) => Response::for_state(muted),
            Err(e) => {
                warn!(error = %e, "Failed to query microphone state.");
                Response::Error
            }
        },
        other => {
            warn!(command = %other, "Unknown command received.");
            Response::UnknownCommand
        }
    }
}

async fn set_state(backend: &dyn MicrophoneBackend, muted: bool) -> Response {
    match backend.set_muted(muted).await {
        Ok(()) => {
            info!(muted, "Microphone state changed.");
            Response::for_state(muted)
        }
        Err(e) => {
            warn!(muted, error = %e, "Failed to change microphone state.");
            Response::Error
        }
    }
}

async fn fail_safe_unmute(backend: &dyn MicrophoneBackend) {
    match backend.set_muted(false).await {
        Ok(()) => info!("Microphone unmuted after device disconnect."),
        Err(e) => error!(error = %e, "Failed to unmute microphone after device disconnect."),
    }
}
