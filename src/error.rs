// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the smarthome long-polling client.
//!
//! The hierarchy follows the failure classes of a live session:
//! transport failures and poll timeouts are retried, protocol and session
//! failures end the connection, and data errors are reported but leave the
//! connection untouched.

use std::time::Duration;

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// A request could not be delivered or timed out.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The gateway answered with something that cannot be interpreted.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The session ended, either on the server side or because the
    /// connection gave up after too many consecutive failures.
    #[error("session error: {0}")]
    Session(#[from] SessionError),

    /// An update referenced data the registry does not know about.
    #[error("data error: {0}")]
    Data(#[from] DataError),

    /// The topology snapshot could not be extracted.
    #[error("topology error: {0}")]
    Topology(#[from] TopologyError),

    /// A value was rejected before it was sent to the gateway.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// No device matched the given key.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The connection has been disconnected.
    #[error("connection is not connected")]
    NotConnected,
}

impl Error {
    /// Returns `true` if this error terminates the connection.
    ///
    /// Protocol and session errors are fatal, everything else is either
    /// retried by the poll loop or only reported.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Protocol(_) | Self::Session(_))
    }

    /// Returns a copy of this error for broadcasting.
    ///
    /// Sources that cannot be cloned are kept as their message.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        match self {
            Self::Transport(e) => Self::Transport(e.snapshot()),
            Self::Protocol(e) => Self::Protocol(e.snapshot()),
            Self::Session(e) => Self::Session(e.clone()),
            Self::Data(e) => Self::Data(e.clone()),
            Self::Topology(e) => Self::Topology(e.snapshot()),
            Self::Value(e) => Self::Value(e.clone()),
            Self::DeviceNotFound(key) => Self::DeviceNotFound(key.clone()),
            Self::NotConnected => Self::NotConnected,
        }
    }
}

fn json_snapshot(error: &serde_json::Error) -> serde_json::Error {
    <serde_json::Error as serde::de::Error>::custom(error)
}

/// Failures while talking to the gateway.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request exceeded its deadline.
    #[error("request timed out after {} ms", .0.as_millis())]
    Timeout(Duration),

    /// The gateway refused or could not accept the connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// HTTP client failure not covered by the other variants.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// Any other transport failure.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` for deadline failures.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Returns `true` for connection-refused class failures.
    #[must_use]
    pub fn is_connection_refused(&self) -> bool {
        matches!(self, Self::ConnectionRefused(_))
    }

    fn snapshot(&self) -> Self {
        match self {
            Self::Timeout(timeout) => Self::Timeout(*timeout),
            Self::ConnectionRefused(message) => Self::ConnectionRefused(message.clone()),
            #[cfg(feature = "http")]
            Self::Http(e) => Self::Other(e.to_string()),
            Self::Other(message) => Self::Other(message.clone()),
        }
    }
}

/// Errors raised when a response body or status cannot be interpreted.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The body is not valid JSON or does not have the expected shape.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The gateway answered with a status other than 200.
    #[error("unexpected HTTP status {status}")]
    UnexpectedStatus {
        /// The HTTP status code.
        status: u16,
        /// The response body, kept for diagnostics.
        body: String,
    },

    /// The body parsed but is missing required content.
    #[error("malformed response: {0}")]
    MalformedBody(String),
}

impl ProtocolError {
    fn snapshot(&self) -> Self {
        match self {
            Self::Json(e) => Self::Json(json_snapshot(e)),
            Self::UnexpectedStatus { status, body } => Self::UnexpectedStatus {
                status: *status,
                body: body.clone(),
            },
            Self::MalformedBody(message) => Self::MalformedBody(message.clone()),
        }
    }
}

/// Errors that end a session.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The gateway reported the session as invalid.
    #[error("session terminated by gateway: {0}")]
    Terminated(String),

    /// The poll loop gave up after consecutive timeouts.
    #[error("too many ({0}) consecutive long polling timeouts")]
    TooManyTimeouts(u32),

    /// The poll loop gave up after consecutive connection failures.
    #[error("too many ({0}) consecutive connection errors")]
    TooManyConnectionErrors(u32),
}

/// Recoverable data inconsistencies in gateway updates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DataError {
    /// An update referenced a device id that is not in the registry.
    #[error("received update for unknown device {0}")]
    UnknownDevice(String),

    /// A change item carried neither an id nor a message.
    #[error("change item without device id")]
    MissingId,

    /// A change item could not be read; carries the decoder message.
    #[error("unreadable change item: {0}")]
    InvalidChange(String),
}

/// Errors raised while extracting the topology from the initial document.
#[derive(Debug, Error)]
pub enum TopologyError {
    /// No session identifier was found in the document.
    #[error("session id not found in document")]
    MissingSessionId,

    /// No long polling timeout constant was found in the document.
    #[error("long polling timeout not found in document")]
    MissingPollTimeout,

    /// An embedded JSON payload was not found.
    #[error("embedded {0} payload not found in document")]
    MissingPayload(&'static str),

    /// An embedded JSON payload could not be parsed.
    #[error("invalid embedded JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Two descriptors share the same id.
    #[error("duplicate device id {0}")]
    DuplicateDevice(String),
}

impl TopologyError {
    fn snapshot(&self) -> Self {
        match self {
            Self::MissingSessionId => Self::MissingSessionId,
            Self::MissingPollTimeout => Self::MissingPollTimeout,
            Self::MissingPayload(payload) => Self::MissingPayload(payload),
            Self::Json(e) => Self::Json(json_snapshot(e)),
            Self::DuplicateDevice(id) => Self::DuplicateDevice(id.clone()),
        }
    }
}

/// Errors related to values written to actuators.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValueError {
    /// Values can only be written to actuators.
    #[error("{0} is not an actuator")]
    NotAnActuator(String),

    /// Toggle requires a boolean actuator.
    #[error("{0} cannot be toggled")]
    NotToggleable(String),

    /// The value is not known yet, or an unresolved value was to be written.
    #[error("value of {0} is unresolved")]
    Unresolved(String),

    /// A numeric value is NaN or infinite.
    #[error("{0} cannot take a non-finite value")]
    NotFinite(String),

    /// A numeric value is outside the range advertised by the device.
    #[error("value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        /// The rejected value.
        value: f64,
        /// Minimum allowed value.
        min: f64,
        /// Maximum allowed value.
        max: f64,
    },
}

/// A specialized Result type for this library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_classification() {
        let protocol: Error = ProtocolError::MalformedBody("no changes".into()).into();
        let session: Error = SessionError::TooManyTimeouts(5).into();
        let data: Error = DataError::UnknownDevice("abc".into()).into();
        let transport: Error = TransportError::Other("reset".into()).into();

        assert!(protocol.is_fatal());
        assert!(session.is_fatal());
        assert!(!data.is_fatal());
        assert!(!transport.is_fatal());
    }

    #[test]
    fn snapshot_keeps_variant_and_message() {
        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let original: Error = ProtocolError::Json(json).into();
        let copy = original.snapshot();
        assert!(matches!(copy, Error::Protocol(ProtocolError::Json(_))));
        assert!(copy.is_fatal());

        let original: Error = TransportError::Timeout(Duration::from_secs(2)).into();
        assert!(matches!(
            original.snapshot(),
            Error::Transport(TransportError::Timeout(d)) if d == Duration::from_secs(2)
        ));
    }

    #[test]
    fn transport_error_classification() {
        assert!(TransportError::Timeout(Duration::from_secs(1)).is_timeout());
        assert!(TransportError::ConnectionRefused("x".into()).is_connection_refused());
        assert!(!TransportError::Other("x".into()).is_timeout());
    }

    #[test]
    fn timeout_display() {
        let err = TransportError::Timeout(Duration::from_millis(35_000));
        assert_eq!(err.to_string(), "request timed out after 35000 ms");
    }

    #[test]
    fn session_error_display() {
        let err = SessionError::TooManyTimeouts(5);
        assert_eq!(
            err.to_string(),
            "too many (5) consecutive long polling timeouts"
        );
    }

    #[test]
    fn value_error_display() {
        let err = ValueError::OutOfRange {
            value: 40.0,
            min: 6.0,
            max: 30.0,
        };
        assert_eq!(err.to_string(), "value 40 is out of range [6, 30]");
    }
}
