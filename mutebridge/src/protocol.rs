//! Line protocol spoken with the mute button peripheral.
//!
//! Every message is a single ASCII token on its own line. Tokens are written
//! in canonical upper case and matched case-insensitively after trimming
//! surrounding whitespace.
//!
//! ```text
//! peripheral -> host   MUTE | UNMUTE | GET_STATE | IDENTIFY_ACK
//! host -> peripheral   IDENTIFY_ARDUINO | MUTED | UNMUTED | ERROR | UNKNOWN_COMMAND
//! ```
//!
//! Decoding never fails. Anything outside the vocabulary comes back as
//! [`Message::Unrecognized`] carrying the raw text, and it is up to the
//! session to answer with [`Response::UnknownCommand`].

use std::fmt;
use std::str::FromStr;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// Requests. `Identify` is sent by the host; the rest originate at the
/// peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Command {
    Mute,
    Unmute,
    GetState,
    #[strum(to_string = "IDENTIFY_ARDUINO")]
    Identify,
}

/// Results. `IdentifyAck` is the peripheral's answer to `Identify`; the
/// rest are sent by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString, IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Response {
    Muted,
    Unmuted,
    Error,
    UnknownCommand,
    IdentifyAck,
}

impl Response {
    /// State report for a microphone mute flag.
    pub fn for_state(muted: bool) -> Self {
        if muted {
            Response::Muted
        } else {
            Response::Unmuted
        }
    }
}

/// One decoded line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Command(Command),
    Response(Response),
    Unrecognized(String),
}

impl Message {
    /// Canonical wire form, without the line terminator.
    ///
    /// `Unrecognized` encodes back to its raw text.
    pub fn encode(&self) -> &str {
        match self {
            Message::Command(command) => <&'static str>::from(command),
            Message::Response(response) => <&'static str>::from(response),
            Message::Unrecognized(raw) => raw,
        }
    }

    /// Decode one line. Surrounding whitespace (including a trailing `\r`
    /// or `\n`) is ignored, as is letter case.
    pub fn decode(line: &str) -> Self {
        let token = line.trim();
        if let Ok(command) = Command::from_str(token) {
            return Message::Command(command);
        }
        if let Ok(response) = Response::from_str(token) {
            return Message::Response(response);
        }
        Message::Unrecognized(line.to_string())
    }
}

impl From<Command> for Message {
    fn from(command: Command) -> Self {
        Message::Command(command)
    }
}

impl From<Response> for Message {
    fn from(response: Response) -> Self {
        Message::Response(response)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.encode())
    }
}
