//! macOS backend driven through `osascript`.
//!
//! AppleScript has no input mute flag, only an input volume. Mute is volume
//! 0 and unmute restores a configured level. Reading goes the other way:
//! an input volume of exactly 0 is reported as muted. That is a heuristic.
//! Anything else that drops the input volume to 0 will read back as muted.

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use tokio::process::Command;

use super::MicrophoneBackend;
use crate::error::BackendError;
use crate::tracing::prelude::*;

static INPUT_VOLUME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"input volume:\s*(\d+)").expect("valid regex"));

/// Microphone control via `osascript -e`.
#[derive(Debug, Clone)]
pub struct OsaScriptBackend {
    unmute_volume: u8,
}

impl OsaScriptBackend {
    /// `unmute_volume` is the input level (1-100) restored on unmute.
    pub fn new(unmute_volume: u8) -> Self {
        Self { unmute_volume }
    }

    fn set_script(&self, muted: bool) -> String {
        let volume = if muted { 0 } else { self.unmute_volume };
        format!("set volume input volume {volume}")
    }
}

/// Run one AppleScript statement, returning trimmed stdout.
async fn osascript(script: &str) -> Result<String, String> {
    let output = Command::new("osascript")
        .args(["-e", script])
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| format!("failed to run osascript: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "osascript exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Pull the input volume out of `get volume settings` output, e.g.
/// `output volume:40, input volume:100, alert volume:100, output muted:false`.
fn parse_input_volume(settings: &str) -> Result<u32, BackendError> {
    let captures = INPUT_VOLUME.captures(settings).ok_or_else(|| {
        BackendError::Query(format!("no input volume in volume settings {settings:?}"))
    })?;
    captures[1]
        .parse()
        .map_err(|e| BackendError::Query(format!("bad input volume {:?}: {e}", &captures[1])))
}

#[async_trait]
impl MicrophoneBackend for OsaScriptBackend {
    async fn get_muted(&self) -> Result<bool, BackendError> {
        let settings = osascript("get volume settings")
            .await
            .map_err(BackendError::Query)?;
        trace!(settings = %settings, "Volume settings.");
        Ok(parse_input_volume(&settings)? == 0)
    }

    async fn set_muted(&self, muted: bool) -> Result<(), BackendError> {
        osascript(&self.set_script(muted))
            .await
            .map_err(BackendError::Set)?;
        debug!(muted, "Microphone state set.");
        Ok(())
    }
}
