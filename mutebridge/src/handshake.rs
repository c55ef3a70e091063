//! Identification handshake.
//!
//! USB IDs only say what kind of board is attached, not what it runs. Before
//! trusting a port, the host sends `IDENTIFY_ARDUINO` and requires the very
//! next line to be `IDENTIFY_ACK` within a deadline.
//!
//! On any failure the transport must be thrown away. A late reply may still
//! be in flight, and reusing the port would feed it to whoever reads next.

use std::time::Duration;
use tokio::time;

use crate::error::HandshakeError;
use crate::protocol::{Command, Message, Response};
use crate::tracing::prelude::*;
use crate::transport::Transport;

/// Ask the device to identify itself and wait up to `timeout` for its acknowledgment.
pub async fn identify(transport: &mut Transport, timeout: Duration) -> Result<(), HandshakeError> {
    debug!(port = %transport.port(), "Sending identification request.");
    transport
        .write_line(Message::from(Command::Identify).encode())
        .await?;

    // Whichever finishes first wins. On timeout the pending read is dropped
    // and its line, if it ever arrives, stays in a transport nobody reads.
    let line = time::timeout(timeout, transport.read_line())
        .await
        .map_err(|_| HandshakeError::Timeout(timeout))??;

    match Message::decode(&line) {
        Message::Response(Response::IdentifyAck) => {
            info!(port = %transport.port(), "Device identified.");
            Ok(())
        }
        _ => Err(HandshakeError::UnexpectedResponse(line)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransportError;
    use crate::test_support::peripheral_pair as pair;
    use futures::SinkExt;
    use tokio_stream::StreamExt;

    const TIMEOUT: Duration = Duration::from_secs(3);

    #[tokio::test]
    async fn test_ack_identifies() {
        let (mut transport, mut device) = pair();
        let peripheral = tokio::spawn(async move {
            let request = device.next().await.unwrap().unwrap();
            device.send(" identify_ack\r").await.unwrap();
            request
        });

        identify(&mut transport, TIMEOUT).await.unwrap();
        assert_eq!(peripheral.await.unwrap(), "IDENTIFY_ARDUINO");
    }

    #[tokio::test]
    async fn test_other_reply_is_rejected() {
        let (mut transport, mut device) = pair();
        tokio::spawn(async move {
            let _ = device.next().await;
            device.send("GET_STATE").await.unwrap();
            // Keep the link open until the host is done.
            let _ = device.next().await;
        });

        let err = identify(&mut transport, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, HandshakeError::UnexpectedResponse(ref line) if line == "GET_STATE"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silence_times_out() {
        let (mut transport, mut device) = pair();
        let peripheral = tokio::spawn(async move {
            let _ = device.next().await;
            time::sleep(Duration::from_secs(4)).await;
            // Too late; the host has given up by now.
            let _ = device.send("IDENTIFY_ACK").await;
            device
        });

        let err = identify(&mut transport, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Timeout(t) if t == TIMEOUT));
        drop(transport);
        drop(peripheral.await.unwrap());
    }

    #[tokio::test]
    async fn test_hangup_is_io_error() {
        let (mut transport, mut device) = pair();
        tokio::spawn(async move {
            let _ = device.next().await;
            drop(device);
        });

        let err = identify(&mut transport, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Io(TransportError::Disconnected)));
    }
}
