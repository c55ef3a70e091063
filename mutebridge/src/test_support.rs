//! Test doubles for the bridge's collaborators.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Mutex,
};
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec};

use crate::error::{BackendError, DiscoveryError, OpenError};
use crate::microphone::MicrophoneBackend;
use crate::transport::{DeviceEnumerator, DeviceIdentity, PortHandle, PortOpener, Transport};

/// Device side of a simulated serial link.
pub(crate) type Peripheral = Framed<DuplexStream, LinesCodec>;

pub(crate) fn peripheral_pair() -> (Transport, Peripheral) {
    let (host, device) = tokio::io::duplex(1024);
    (
        Transport::new("sim", host, 256),
        Framed::new(device, LinesCodec::new()),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BackendCall {
    GetMuted,
    SetMuted(bool),
}

/// In-memory microphone that records every call.
#[derive(Debug, Default)]
pub(crate) struct MockBackend {
    muted: AtomicBool,
    fail_queries: AtomicBool,
    fail_sets: AtomicBool,
    calls: Mutex<Vec<BackendCall>>,
}

impl MockBackend {
    pub fn new(muted: bool) -> Self {
        Self {
            muted: AtomicBool::new(muted),
            ..Default::default()
        }
    }

    pub fn fail_queries(&self, fail: bool) {
        self.fail_queries.store(fail, Ordering::SeqCst);
    }

    pub fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    /// Change the state as another program would.
    pub fn set_state(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    pub fn is_muted(&self) -> bool {
        self.muted.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl MicrophoneBackend for MockBackend {
    async fn get_muted(&self) -> Result<bool, BackendError> {
        self.record(BackendCall::GetMuted);
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(BackendError::Query("simulated query failure".into()));
        }
        Ok(self.is_muted())
    }

    async fn set_muted(&self, muted: bool) -> Result<(), BackendError> {
        self.record(BackendCall::SetMuted(muted));
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(BackendError::Set("simulated set failure".into()));
        }
        self.set_state(muted);
        Ok(())
    }
}

/// Enumerator that finds the device only when a port has been queued.
#[derive(Debug, Default)]
pub(crate) struct ScriptedEnumerator {
    ports: Mutex<VecDeque<PortHandle>>,
    calls: AtomicUsize,
}

impl ScriptedEnumerator {
    pub fn push(&self, port: PortHandle) {
        self.ports.lock().unwrap().push_back(port);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceEnumerator for ScriptedEnumerator {
    async fn find_port(&self, identity: &DeviceIdentity) -> Result<PortHandle, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ports
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| identity.not_found())
    }
}

/// Opener that hands the device end of each link to the test.
pub(crate) struct SimOpener {
    peripherals: mpsc::UnboundedSender<Peripheral>,
    busy: AtomicBool,
}

impl SimOpener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Peripheral>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                peripherals: tx,
                busy: AtomicBool::new(false),
            },
            rx,
        )
    }

    pub fn set_busy(&self, busy: bool) {
        self.busy.store(busy, Ordering::SeqCst);
    }
}

#[async_trait]
impl PortOpener for SimOpener {
    async fn open(&self, port: &PortHandle) -> Result<Transport, OpenError> {
        if self.busy.load(Ordering::SeqCst) {
            return Err(OpenError::PortBusy {
                port: port.address.clone(),
                reason: "simulated".into(),
            });
        }
        let (transport, peripheral) = peripheral_pair();
        let _ = self.peripherals.send(peripheral);
        Ok(transport)
    }
}
