// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire protocol of the gateway's web interface.
//!
//! Every call is a GET request against one of four endpoints, carrying its
//! arguments as query parameters and a cache-busting `_` timestamp. The
//! [`Transport`] trait is the authenticated request function a connection
//! is built on; [`HttpTransport`] implements it with `reqwest`.

#[cfg(feature = "http")]
mod http;
mod timestamp;

#[cfg(feature = "http")]
pub use http::{GatewayConfig, HttpTransport};
pub use timestamp::TimestampGenerator;

use std::future::Future;
use std::time::Duration;

use crate::error::TransportError;
use crate::types::Value;

/// Gateway endpoints used by a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Long polling for changes.
    LongPoll,
    /// Fetch the current value of one device.
    GetValue,
    /// Write a value to an actuator.
    SetValue,
    /// End the session.
    Logout,
}

/// A request to the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Target endpoint.
    pub endpoint: Endpoint,
    /// Query parameters, in order.
    pub params: Vec<(&'static str, String)>,
    /// Deadline for this request; the transport default applies when `None`.
    pub timeout: Option<Duration>,
}

impl Request {
    /// Creates a long polling request.
    #[must_use]
    pub fn long_poll(timestamp: i64, session_id: &str, timeout: Duration) -> Self {
        Self {
            endpoint: Endpoint::LongPoll,
            params: vec![
                ("_", timestamp.to_string()),
                ("sessionId", session_id.to_string()),
            ],
            timeout: Some(timeout),
        }
    }

    /// Creates a request for the current value of one device.
    #[must_use]
    pub fn get_value(timestamp: i64, device_id: &str) -> Self {
        Self {
            endpoint: Endpoint::GetValue,
            params: vec![
                ("_", timestamp.to_string()),
                ("Id", device_id.to_string()),
                ("IsResolveRequired", "true".to_string()),
                ("Value", "null".to_string()),
                ("Metadata", String::new()),
            ],
            timeout: None,
        }
    }

    /// Creates a request writing `value` to an actuator.
    #[must_use]
    pub fn set_value(timestamp: i64, device_id: &str, value: &Value) -> Self {
        Self {
            endpoint: Endpoint::SetValue,
            params: vec![
                ("_", timestamp.to_string()),
                ("IsContainer", "false".to_string()),
                ("Value", value.to_wire()),
                ("Id", device_id.to_string()),
            ],
            timeout: None,
        }
    }

    /// Creates a logout request.
    #[must_use]
    pub fn logout(timestamp: i64) -> Self {
        Self {
            endpoint: Endpoint::Logout,
            params: vec![("_", timestamp.to_string())],
            timeout: None,
        }
    }

    /// Returns the value of a query parameter.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// A response from the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code.
    pub status: u16,
    /// Raw response body.
    pub body: String,
}

impl Response {
    /// Creates a response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Creates a `200 OK` response.
    #[must_use]
    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    /// Returns `true` for status 200.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// An authenticated request function bound to a gateway session.
///
/// Implementations classify failures so the poll loop can tell timeouts
/// and refused connections from other transport errors.
pub trait Transport: Send + Sync + 'static {
    /// Sends a request and returns the response.
    ///
    /// Non-200 statuses are returned as responses, not errors.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the request could not be completed.
    fn send(&self, request: Request)
    -> impl Future<Output = Result<Response, TransportError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_poll_parameters() {
        let request = Request::long_poll(1_700_000_000_000, "abc", Duration::from_secs(35));
        assert_eq!(request.endpoint, Endpoint::LongPoll);
        assert_eq!(request.param("_"), Some("1700000000000"));
        assert_eq!(request.param("sessionId"), Some("abc"));
        assert_eq!(request.timeout, Some(Duration::from_secs(35)));
    }

    #[test]
    fn get_value_parameters() {
        let request = Request::get_value(1, "dev-1");
        assert_eq!(request.param("Id"), Some("dev-1"));
        assert_eq!(request.param("IsResolveRequired"), Some("true"));
        assert_eq!(request.param("Value"), Some("null"));
        assert_eq!(request.param("Metadata"), Some(""));
    }

    #[test]
    fn set_value_parameters() {
        let request = Request::set_value(1, "dev-1", &Value::Number(21.5));
        assert_eq!(request.param("IsContainer"), Some("false"));
        assert_eq!(request.param("Value"), Some("21.5"));
        assert_eq!(request.param("Id"), Some("dev-1"));
    }

    #[test]
    fn response_status() {
        assert!(Response::ok("{}").is_ok());
        assert!(!Response::new(500, "").is_ok());
    }
}
