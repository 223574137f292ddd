//! Error types shared by the codec, the profile decoders and the session
//! controller.
//!
//! Decode-time errors never cross the session boundary: the controller logs
//! them and bumps the session's reject counter. Lifecycle and transport errors
//! are returned to the caller of [`crate::controller::SessionController`].

use thiserror::Error;
use uuid::Uuid;

use crate::types::SessionState;

/// A notification payload that could not be turned into samples.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The payload is shorter than the field or frame being read.
    #[error("payload truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    /// The payload is not one of the lengths the profile declares.
    #[error("unexpected payload length {actual} (expected {expected})")]
    UnexpectedLength { expected: usize, actual: usize },
    /// Field widths are limited to 1..=4 bytes.
    #[error("unsupported field width {0}")]
    UnsupportedWidth(usize),
}

/// Misuse of the median reducer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
}

/// Failure reported by a [`crate::transport::PeripheralTransport`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("peripheral {0} is not known to the adapter")]
    UnknownPeripheral(String),
    #[error("peripheral {0} is not connected")]
    NotConnected(String),
    #[error("characteristic {characteristic} not found in service {service}")]
    CharacteristicNotFound { service: Uuid, characteristic: Uuid },
    #[error("transport operation timed out after {0} s")]
    Timeout(u64),
    #[error("BLE backend error: {0}")]
    Backend(String),
}

/// Lifecycle errors surfaced by the session controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// `start()` while a session is starting or recording.
    #[error("a session is already recording")]
    AlreadyRecording,
    /// An operation that needs a live session was called without one.
    #[error("no session is recording")]
    NotRecording,
    /// Another controller holds the same peripheral/service pair.
    #[error("peripheral {peripheral_id} service {service} is owned by another session")]
    Busy { peripheral_id: String, service: Uuid },
    /// `start()` raced with a teardown that is still in flight.
    #[error("cannot start while the session is {0:?}")]
    InvalidState(SessionState),
    /// `stop()` arrived while `start()` was still subscribing.
    #[error("session start was cancelled by stop()")]
    Cancelled,
    /// No session has been started yet, so there is nothing to read.
    #[error("no session data available")]
    NoSession,
    #[error("unknown channel {0:?}")]
    UnknownChannel(String),
    #[error("{0} is not supported by the {1} profile")]
    Unsupported(&'static str, &'static str),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl From<btleplug::Error> for TransportError {
    fn from(e: btleplug::Error) -> Self {
        TransportError::Backend(e.to_string())
    }
}

/// Failure loading or saving a [`crate::config::SessionConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot access config file {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed config: {0}")]
    Parse(String),
}
