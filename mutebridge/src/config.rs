//! Configuration for the bridge.
//!
//! A [`Config`] is built once at startup and handed to the connection
//! manager, which never consults ambient state afterwards. Defaults match the
//! stock firmware on an Arduino Uno R4 WiFi; any field can be overridden
//! through `MUTEBRIDGE_*` environment variables.

use std::{env, str::FromStr, time::Duration};
use strum::{Display, EnumString};

use crate::error::{self, ConfigError};
use crate::transport::discovery::parse_id;
use crate::transport::DeviceIdentity;

/// Arduino SA vendor ID.
pub const DEFAULT_VID: u16 = 0x2341;
/// Uno R4 WiFi product ID.
pub const DEFAULT_PID: u16 = 0x1002;

/// Firmware runs its UART at this rate; both ends must agree.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Line-level serial parameters. Always 8 data bits, no parity, one stop
/// bit; only the rate is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerialSettings {
    pub baud_rate: u32,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

/// How to locate the peripheral's serial port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum EnumeratorKind {
    /// Ask `arduino-cli board list`.
    ArduinoCli,
    /// Walk the OS serial port list directly.
    Native,
}

/// Immutable bridge configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Which USB device to look for.
    pub identity: DeviceIdentity,

    pub serial: SerialSettings,

    /// How long to wait for `IDENTIFY_ACK`.
    pub identify_timeout: Duration,

    /// Delay after a failed discovery or open.
    pub discovery_backoff: Duration,

    /// Delay after a failed handshake or a lost session. Shorter than the
    /// discovery delay so a USB re-enumeration is picked up quickly.
    pub session_backoff: Duration,

    /// Longest line accepted from the peripheral, in bytes.
    pub max_line_length: usize,

    pub enumerator: EnumeratorKind,

    /// Input volume (0-100) written when unmuting.
    pub unmute_volume: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::new(DEFAULT_VID, DEFAULT_PID),
            serial: SerialSettings::default(),
            identify_timeout: Duration::from_secs(3),
            discovery_backoff: Duration::from_secs(5),
            session_backoff: Duration::from_secs(1),
            max_line_length: 256,
            enumerator: EnumeratorKind::ArduinoCli,
            unmute_volume: 100,
        }
    }
}

impl Config {
    /// Defaults overlaid with whatever `MUTEBRIDGE_*` variables are set.
    pub fn from_env() -> error::Result<Self> {
        Ok(Self::from_lookup(|key| env::var(key).ok())?)
    }

    /// Same as [`Config::from_env`] but reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(vid) = lookup("MUTEBRIDGE_VID") {
            config.identity = DeviceIdentity::new(parse_id(&vid)?, config.identity.pid());
        }
        if let Some(pid) = lookup("MUTEBRIDGE_PID") {
            config.identity = DeviceIdentity::new(config.identity.vid(), parse_id(&pid)?);
        }

        if let Some(baud) = lookup("MUTEBRIDGE_BAUD") {
            config.serial.baud_rate = parse_value("MUTEBRIDGE_BAUD", &baud)?;
        }
        if let Some(kind) = lookup("MUTEBRIDGE_ENUMERATOR") {
            config.enumerator = parse_value("MUTEBRIDGE_ENUMERATOR", &kind)?;
        }
        if let Some(ms) = lookup("MUTEBRIDGE_IDENTIFY_TIMEOUT_MS") {
            config.identify_timeout =
                Duration::from_millis(parse_value("MUTEBRIDGE_IDENTIFY_TIMEOUT_MS", &ms)?);
        }
        if let Some(secs) = lookup("MUTEBRIDGE_DISCOVERY_BACKOFF_SECS") {
            config.discovery_backoff =
                Duration::from_secs(parse_value("MUTEBRIDGE_DISCOVERY_BACKOFF_SECS", &secs)?);
        }
        if let Some(secs) = lookup("MUTEBRIDGE_SESSION_BACKOFF_SECS") {
            config.session_backoff =
                Duration::from_secs(parse_value("MUTEBRIDGE_SESSION_BACKOFF_SECS", &secs)?);
        }
        if let Some(volume) = lookup("MUTEBRIDGE_UNMUTE_VOLUME") {
            let parsed: u8 = parse_value("MUTEBRIDGE_UNMUTE_VOLUME", &volume)?;
            if parsed == 0 || parsed > 100 {
                return Err(ConfigError::InvalidValue {
                    key: "MUTEBRIDGE_UNMUTE_VOLUME",
                    value: volume,
                });
            }
            config.unmute_volume = parsed;
        }

        Ok(config)
    }
}

fn parse_value<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.identity.to_string(), "0x2341:0x1002");
        assert_eq!(config.serial.baud_rate, 9600);
        assert_eq!(config.identify_timeout, Duration::from_secs(3));
        assert_eq!(config.discovery_backoff, Duration::from_secs(5));
        assert_eq!(config.session_backoff, Duration::from_secs(1));
        assert_eq!(config.enumerator, EnumeratorKind::ArduinoCli);
        assert_eq!(config.unmute_volume, 100);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("MUTEBRIDGE_PID", "0x0043"),
            ("MUTEBRIDGE_ENUMERATOR", "native"),
            ("MUTEBRIDGE_IDENTIFY_TIMEOUT_MS", "1500"),
            ("MUTEBRIDGE_SESSION_BACKOFF_SECS", "2"),
            ("MUTEBRIDGE_UNMUTE_VOLUME", "75"),
        ]))
        .unwrap();

        assert_eq!(config.identity, DeviceIdentity::new(DEFAULT_VID, 0x0043));
        assert_eq!(config.enumerator, EnumeratorKind::Native);
        assert_eq!(config.identify_timeout, Duration::from_millis(1500));
        assert_eq!(config.session_backoff, Duration::from_secs(2));
        assert_eq!(config.discovery_backoff, Duration::from_secs(5));
        assert_eq!(config.unmute_volume, 75);
    }

    #[test]
    fn test_vid_override_keeps_default_pid() {
        let config = Config::from_lookup(lookup_from(&[("MUTEBRIDGE_VID", "0x2A03")])).unwrap();
        assert_eq!(config.identity.vid(), 0x2a03);
        assert_eq!(config.identity.pid(), DEFAULT_PID);
    }

    #[test]
    fn test_config_error_converts_to_crate_error() {
        let err = Config::from_lookup(lookup_from(&[("MUTEBRIDGE_PID", "1002")])).unwrap_err();
        let err = error::Error::from(err);
        assert!(matches!(err, error::Error::Config(ConfigError::InvalidUsbId(_))));
        assert_eq!(
            err.to_string(),
            "configuration error: invalid USB identifier \"1002\" (expected 0xNNNN)"
        );
    }

    #[test]
    fn test_rejects_malformed_values() {
        let err = Config::from_lookup(lookup_from(&[("MUTEBRIDGE_VID", "2341")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidUsbId(_)));

        let err = Config::from_lookup(lookup_from(&[("MUTEBRIDGE_BAUD", "fast")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "MUTEBRIDGE_BAUD", .. }));

        let err =
            Config::from_lookup(lookup_from(&[("MUTEBRIDGE_ENUMERATOR", "udev")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err =
            Config::from_lookup(lookup_from(&[("MUTEBRIDGE_UNMUTE_VOLUME", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
