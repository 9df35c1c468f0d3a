// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Connection event types.

use std::sync::Arc;

use crate::error::Error;
use crate::registry::Device;
use crate::types::Value;

/// A device value change.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceChange {
    /// Snapshot of the device after the change.
    pub device: Device,
    /// The value before the change.
    pub old_value: Value,
}

/// Events emitted by a connection.
///
/// Errors are wrapped in `Arc` so that the same error can reach every
/// subscriber. A fatal error is always followed by
/// [`Disconnected`](Self::Disconnected).
#[derive(Debug, Clone)]
pub enum ConnectionEvent {
    /// A device value changed.
    Changed(DeviceChange),

    /// All initially unresolved devices have been fetched.
    Ready,

    /// An error occurred.
    Error {
        /// The error.
        error: Arc<Error>,
        /// Whether the connection is about to terminate because of it.
        fatal: bool,
    },

    /// The connection terminated. No further events follow.
    Disconnected,

    /// Informational message pushed by the gateway.
    Message(serde_json::Value),
}

impl ConnectionEvent {
    /// Creates an error event, classifying it as fatal or not.
    #[must_use]
    pub fn error(error: Error) -> Self {
        let fatal = error.is_fatal();
        Self::Error {
            error: Arc::new(error),
            fatal,
        }
    }

    /// Creates a non-fatal error event.
    ///
    /// Used for failures of individual requests that leave the long polling
    /// loop running, whatever the error class.
    #[must_use]
    pub fn recoverable(error: Error) -> Self {
        Self::Error {
            error: Arc::new(error),
            fatal: false,
        }
    }

    /// Returns the device id for change events.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::Changed(change) => Some(change.device.id()),
            _ => None,
        }
    }

    /// Returns `true` for change events.
    #[must_use]
    pub fn is_change(&self) -> bool {
        matches!(self, Self::Changed(_))
    }

    /// Returns `true` for fatal error events.
    #[must_use]
    pub fn is_fatal_error(&self) -> bool {
        matches!(self, Self::Error { fatal: true, .. })
    }
}
