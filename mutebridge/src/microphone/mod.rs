//! Host microphone control.
//!
//! The bridge only needs two operations from the OS: read the current mute
//! state and change it. Callers must treat [`MicrophoneBackend::get_muted`]
//! as the only source of truth. Other programs can change the state at any
//! time, so nothing here caches it.

pub mod osascript;

pub use osascript::OsaScriptBackend;

use async_trait::async_trait;

use crate::error::BackendError;

/// Query and set the system microphone mute state.
#[async_trait]
pub trait MicrophoneBackend: Send + Sync {
    /// Whether the microphone is currently muted.
    async fn get_muted(&self) -> Result<bool, BackendError>;

    /// Mute (`true`) or unmute (`false`) the microphone.
    async fn set_muted(&self, muted: bool) -> Result<(), BackendError>;
}
