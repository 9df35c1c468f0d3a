// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback management for connection subscriptions.
//!
//! - [`SubscriptionId`] - Unique identifier for unsubscribing
//! - [`CallbackRegistry`] - Subscriber lists and event dispatch

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::Error;
use crate::event::{ConnectionEvent, DeviceChange};

/// Unique identifier for a subscription.
///
/// IDs are unique within a connection's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    #[must_use]
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", self.0)
    }
}

type ChangeCallback = Arc<dyn Fn(&DeviceChange) + Send + Sync>;
type ReadyCallback = Arc<dyn Fn() + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&Error, bool) + Send + Sync>;
type DisconnectedCallback = Arc<dyn Fn() + Send + Sync>;
type MessageCallback = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Registry of subscriber callbacks for one connection.
///
/// Callbacks are cloned out of the lock before they run, so a callback may
/// subscribe or unsubscribe without deadlocking.
pub struct CallbackRegistry {
    next_id: AtomicU64,
    /// Connection-scope change callbacks.
    change_callbacks: RwLock<HashMap<SubscriptionId, ChangeCallback>>,
    /// Device-scope change callbacks, keyed by subscription with the device id.
    device_callbacks: RwLock<HashMap<SubscriptionId, (String, ChangeCallback)>>,
    ready_callbacks: RwLock<HashMap<SubscriptionId, ReadyCallback>>,
    error_callbacks: RwLock<HashMap<SubscriptionId, ErrorCallback>>,
    disconnected_callbacks: RwLock<HashMap<SubscriptionId, DisconnectedCallback>>,
    message_callbacks: RwLock<HashMap<SubscriptionId, MessageCallback>>,
}

impl CallbackRegistry {
    /// Creates a new empty callback registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            change_callbacks: RwLock::new(HashMap::new()),
            device_callbacks: RwLock::new(HashMap::new()),
            ready_callbacks: RwLock::new(HashMap::new()),
            error_callbacks: RwLock::new(HashMap::new()),
            disconnected_callbacks: RwLock::new(HashMap::new()),
            message_callbacks: RwLock::new(HashMap::new()),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // Registration methods
    // =========================================================================

    /// Registers a callback for changes of any device.
    pub fn on_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceChange) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.change_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for changes of one device.
    pub fn on_device_change<F>(&self, device_id: impl Into<String>, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceChange) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.device_callbacks
            .write()
            .insert(id, (device_id.into(), Arc::new(callback)));
        id
    }

    /// Registers a callback for the readiness signal.
    pub fn on_ready<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.ready_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for errors.
    ///
    /// The callback receives the error and whether it is fatal.
    pub fn on_error<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Error, bool) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.error_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for disconnection.
    pub fn on_disconnected<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.disconnected_callbacks
            .write()
            .insert(id, Arc::new(callback));
        id
    }

    /// Registers a callback for informational messages.
    pub fn on_message<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.message_callbacks.write().insert(id, Arc::new(callback));
        id
    }

    // =========================================================================
    // Unsubscription
    // =========================================================================

    /// Unregisters a callback by its subscription ID.
    ///
    /// Returns `true` if a callback was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.change_callbacks.write().remove(&id).is_some()
            || self.device_callbacks.write().remove(&id).is_some()
            || self.ready_callbacks.write().remove(&id).is_some()
            || self.error_callbacks.write().remove(&id).is_some()
            || self.disconnected_callbacks.write().remove(&id).is_some()
            || self.message_callbacks.write().remove(&id).is_some()
    }

    /// Removes every callback.
    pub fn clear(&self) {
        self.change_callbacks.write().clear();
        self.device_callbacks.write().clear();
        self.ready_callbacks.write().clear();
        self.error_callbacks.write().clear();
        self.disconnected_callbacks.write().clear();
        self.message_callbacks.write().clear();
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Dispatches an event to the matching callbacks.
    ///
    /// Change events reach device-scope callbacks first, then
    /// connection-scope callbacks.
    pub fn dispatch(&self, event: &ConnectionEvent) {
        match event {
            ConnectionEvent::Changed(change) => {
                let device_callbacks: Vec<ChangeCallback> = self
                    .device_callbacks
                    .read()
                    .values()
                    .filter(|(device_id, _)| device_id == change.device.id())
                    .map(|(_, callback)| Arc::clone(callback))
                    .collect();
                for callback in device_callbacks {
                    callback(change);
                }

                let callbacks: Vec<ChangeCallback> =
                    self.change_callbacks.read().values().cloned().collect();
                for callback in callbacks {
                    callback(change);
                }
            }
            ConnectionEvent::Ready => {
                let callbacks: Vec<ReadyCallback> =
                    self.ready_callbacks.read().values().cloned().collect();
                for callback in callbacks {
                    callback();
                }
            }
            ConnectionEvent::Error { error, fatal } => {
                let callbacks: Vec<ErrorCallback> =
                    self.error_callbacks.read().values().cloned().collect();
                for callback in callbacks {
                    callback(error, *fatal);
                }
            }
            ConnectionEvent::Disconnected => {
                let callbacks: Vec<DisconnectedCallback> =
                    self.disconnected_callbacks.read().values().cloned().collect();
                for callback in callbacks {
                    callback();
                }
            }
            ConnectionEvent::Message(payload) => {
                let callbacks: Vec<MessageCallback> =
                    self.message_callbacks.read().values().cloned().collect();
                for callback in callbacks {
                    callback(payload);
                }
            }
        }
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Returns the total number of registered callbacks.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.change_callbacks.read().len()
            + self.device_callbacks.read().len()
            + self.ready_callbacks.read().len()
            + self.error_callbacks.read().len()
            + self.disconnected_callbacks.read().len()
            + self.message_callbacks.read().len()
    }

    /// Returns `true` if there are no registered callbacks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.callback_count() == 0
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callback_count", &self.callback_count())
            .finish()
    }
}
