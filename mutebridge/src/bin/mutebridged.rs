//! Mute bridge daemon.
//!
//! Configuration comes from `MUTEBRIDGE_*` environment variables; see
//! [`mutebridge::config`].

use std::sync::Arc;

use anyhow::Context;
use tokio::signal::unix::{self, SignalKind};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use mutebridge::config::{Config, EnumeratorKind};
use mutebridge::manager::ConnectionManager;
use mutebridge::microphone::OsaScriptBackend;
use mutebridge::tracing::{self, prelude::*};
use mutebridge::transport::{
    ArduinoCliEnumerator, DeviceEnumerator, NativeEnumerator, SerialPortOpener,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init_journald_or_stdout();

    let config = Config::from_env().context("invalid configuration")?;
    info!(
        identity = %config.identity,
        baud = config.serial.baud_rate,
        enumerator = %config.enumerator,
        "Starting."
    );

    let enumerator: Arc<dyn DeviceEnumerator> = match config.enumerator {
        EnumeratorKind::ArduinoCli => Arc::new(ArduinoCliEnumerator::new()),
        EnumeratorKind::Native => Arc::new(NativeEnumerator::new()),
    };
    let opener = Arc::new(SerialPortOpener::new(config.serial, config.max_line_length));
    let backend = Arc::new(OsaScriptBackend::new(config.unmute_volume));
    let manager = ConnectionManager::new(config, enumerator, opener, backend);

    let running = CancellationToken::new();
    let tracker = TaskTracker::new();
    tracker.spawn(manager.run(running.clone()));
    tracker.close();

    let mut sigint = unix::signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    let mut sigterm = unix::signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    tokio::select! {
        _ = sigint.recv() => {},
        _ = sigterm.recv() => {},
    }

    trace!("Shutting down.");
    running.cancel();

    tracker.wait().await;
    info!("Exiting.");
    Ok(())
}
