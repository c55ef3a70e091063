//! Host side of a serial mute button.
//!
//! A small USB peripheral with a button and an LED asks the host to mute or
//! unmute the microphone, and shows the result. This crate finds the
//! peripheral, proves it runs the right firmware, keeps the LED in step with
//! the real microphone state and, whenever the link drops, unmutes the
//! microphone so a lost button never leaves the user muted.

pub mod config;
pub mod error;
pub mod handshake;
pub mod manager;
pub mod microphone;
pub mod protocol;
pub mod session;
pub mod tracing;
pub mod transport;

#[cfg(test)]
mod test_support;
