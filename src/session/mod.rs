// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Live gateway sessions.
//!
//! A [`Connection`] is created from a [`Topology`] and an authenticated
//! [`Transport`]. On connect it builds the device registry, fetches every
//! value the topology left unresolved and starts the long polling loop.
//! Changes are delivered through callbacks ([`Subscribable`]) and a
//! broadcast channel ([`Connection::subscribe`]).
//!
//! # Lifecycle
//!
//! The connection stays alive until
//! - [`Connection::disconnect`] is called or the handle is dropped,
//! - the gateway reports the session as invalid,
//! - the response of a poll cannot be interpreted, or
//! - a failure threshold of the [`PollPolicy`] is reached.
//!
//! Every ending other than an explicit disconnect emits a fatal
//! [`ConnectionEvent::Error`] first. [`ConnectionEvent::Disconnected`] is
//! always the last event; afterwards the registry no longer changes.
//!
//! # Examples
//!
//! ```no_run
//! use smarthome_lp::protocol::GatewayConfig;
//! use smarthome_lp::session::ConnectionBuilder;
//! use smarthome_lp::subscription::Subscribable;
//! use smarthome_lp::topology::Topology;
//!
//! # async fn example(start_page: &str) -> smarthome_lp::Result<()> {
//! let transport = GatewayConfig::new()
//!     .with_header("Cookie", "ASP.NET_SessionId=...")
//!     .into_transport()?;
//! let topology = Topology::from_document(start_page)?;
//!
//! let builder = ConnectionBuilder::new(transport, topology);
//! builder.on_ready(|| println!("all values known"));
//! let connection = builder.connect().await?;
//!
//! connection.on_change(|change| {
//!     println!("{} changed from {}", change.device, change.old_value);
//! });
//!
//! connection.toggle("Deckenlicht").await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod inner;
mod poll;
mod processor;
mod resolver;

pub use config::PollPolicy;
pub use poll::PollState;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLockReadGuard;
use tokio::sync::{broadcast, watch};

use crate::error::{Error, ProtocolError, Result};
use crate::event::{ConnectionEvent, DeviceChange, EventBus};
use crate::protocol::{Request, Transport};
use crate::registry::{Device, Location, Registry};
use crate::subscription::{CallbackRegistry, Subscribable, SubscriptionId};
use crate::topology::Topology;
use crate::types::Value;

use inner::{ConnectionInner, FetchOrigin};
use resolver::InitResolver;

// ============================================================================
// ConnectionBuilder
// ============================================================================

/// Prepares a connection.
///
/// Subscriptions made on the builder are active from the first event on,
/// including a `Ready` emitted while connecting.
pub struct ConnectionBuilder<T> {
    transport: T,
    topology: Topology,
    policy: PollPolicy,
    events: EventBus,
    callbacks: CallbackRegistry,
}

impl<T: Transport> ConnectionBuilder<T> {
    /// Creates a builder with the default [`PollPolicy`].
    #[must_use]
    pub fn new(transport: T, topology: Topology) -> Self {
        Self {
            transport,
            topology,
            policy: PollPolicy::default(),
            events: EventBus::new(),
            callbacks: CallbackRegistry::new(),
        }
    }

    /// Sets the polling policy.
    ///
    /// The event channel is recreated with the policy's capacity, so call
    /// this before [`subscribe`](Self::subscribe).
    #[must_use]
    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.events = EventBus::with_capacity(policy.event_capacity);
        self.policy = policy;
        self
    }

    /// Returns the polling policy.
    #[must_use]
    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Subscribes to the event channel before connecting.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Builds the registry, starts the startup fetches and the poll loop.
    ///
    /// If no device value is unresolved, `Ready` is emitted before this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns `TopologyError` if the topology contains duplicate ids.
    pub async fn connect(self) -> Result<Connection<T>> {
        let registry = Registry::from_topology(&self.topology)?;
        let unresolved = registry.unresolved_ids();

        tracing::info!(
            session_id = %self.topology.session_id,
            devices = registry.devices().len(),
            unresolved = unresolved.len(),
            "Connecting"
        );

        let inner = Arc::new(ConnectionInner::new(
            self.transport,
            self.policy,
            self.topology.session_id,
            self.topology.poll_timeout,
            registry,
            InitResolver::new(unresolved.len()),
            self.events,
            self.callbacks,
        ));

        if inner.resolver.lock().start() {
            inner.mark_ready();
        }
        for id in unresolved {
            inner.spawn_fetch(id, FetchOrigin::Startup);
        }
        tokio::spawn(poll::run(Arc::clone(&inner)));

        Ok(Connection { inner })
    }
}

impl<T: Transport> Subscribable for ConnectionBuilder<T> {
    fn on_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceChange) + Send + Sync + 'static,
    {
        self.callbacks.on_change(callback)
    }

    fn on_device_change<F>(&self, device_id: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceChange) + Send + Sync + 'static,
    {
        self.callbacks.on_device_change(device_id, callback)
    }

    fn on_ready<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.on_ready(callback)
    }

    fn on_error<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Error, bool) + Send + Sync + 'static,
    {
        self.callbacks.on_error(callback)
    }

    fn on_disconnected<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.callbacks.on_disconnected(callback)
    }

    fn on_message<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.callbacks.on_message(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.callbacks.unsubscribe(id)
    }
}

impl<T> std::fmt::Debug for ConnectionBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionBuilder")
            .field("session_id", &self.topology.session_id)
            .field("policy", &self.policy)
            .field("callbacks", &self.callbacks)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection
// ============================================================================

/// A live gateway session.
///
/// Dropping the connection disconnects it.
pub struct Connection<T: Transport> {
    inner: Arc<ConnectionInner<T>>,
}

impl<T: Transport> Connection<T> {
    // =========================================================================
    // Introspection
    // =========================================================================

    /// Returns the session id.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Returns the poll timeout advertised by the gateway.
    #[must_use]
    pub fn poll_timeout(&self) -> Duration {
        self.inner.poll_timeout
    }

    /// Returns `true` until the connection is disconnected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    /// Returns `true` once every startup value has been fetched.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.inner.is_initialized()
    }

    /// Returns the current state of the poll loop.
    #[must_use]
    pub fn poll_state(&self) -> PollState {
        *self.inner.poll_state.borrow()
    }

    /// Returns a receiver following the poll loop state.
    #[must_use]
    pub fn watch_poll_state(&self) -> watch::Receiver<PollState> {
        self.inner.poll_state.subscribe()
    }

    /// Waits until the connection is ready.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotConnected` if the connection ends first.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut ready = self.inner.ready.subscribe();
        let mut state = self.inner.poll_state.subscribe();
        tokio::select! {
            biased;
            Ok(_) = ready.wait_for(|r| *r) => Ok(()),
            _ = state.wait_for(|s| *s == PollState::Disconnected) => Err(Error::NotConnected),
        }
    }

    /// Subscribes to the event channel.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    // =========================================================================
    // Registry access
    // =========================================================================

    /// Returns a read guard on the device registry.
    ///
    /// Do not hold the guard across `.await` points; updates wait for it.
    pub fn registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.inner.registry.read()
    }

    /// Returns a snapshot of the device matching `key`.
    ///
    /// `key` is matched against ids, then exact names, then name substrings.
    #[must_use]
    pub fn device(&self, key: &str) -> Option<Device> {
        self.registry().device(key).cloned()
    }

    /// Returns a snapshot of the sensor matching `key`.
    #[must_use]
    pub fn sensor(&self, key: &str) -> Option<Device> {
        self.registry().sensor(key).cloned()
    }

    /// Returns a snapshot of the actuator matching `key`.
    #[must_use]
    pub fn actuator(&self, key: &str) -> Option<Device> {
        self.registry().actuator(key).cloned()
    }

    /// Returns a snapshot of the location matching `key`.
    #[must_use]
    pub fn location(&self, key: &str) -> Option<Location> {
        self.registry().location(key).cloned()
    }

    /// Returns snapshots of all devices.
    #[must_use]
    pub fn devices(&self) -> Vec<Device> {
        self.registry().devices().to_vec()
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Writes `value` to the actuator matching `key`, then fetches it back.
    ///
    /// Returns the device with the value reported by the gateway. A failure
    /// of either request is also broadcast as a non-fatal error event.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceNotFound` if no device matches, `ValueError`
    /// if the value is rejected locally, and transport or protocol errors
    /// of the set and get requests.
    pub async fn set_value(&self, key: &str, value: impl Into<Value>) -> Result<Device> {
        self.inner.ensure_connected()?;
        let value = value.into();

        let id = {
            let registry = self.registry();
            let device = registry
                .device(key)
                .ok_or_else(|| Error::DeviceNotFound(key.to_string()))?;
            device.check_writable(&value)?;
            device.id().to_string()
        };

        tracing::debug!(device_id = %id, value = %value, "Setting value");

        if let Err(e) = self.send_set(&id, &value).await {
            self.inner.report(e.snapshot());
            return Err(e);
        }
        self.refetch(&id).await
    }

    /// Inverts the value of a boolean actuator.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::NotToggleable` for non-boolean devices,
    /// `ValueError::Unresolved` while the value is unknown, and the errors
    /// of [`set_value`](Self::set_value).
    pub async fn toggle(&self, key: &str) -> Result<Device> {
        let (id, value) = {
            let registry = self.registry();
            let device = registry
                .device(key)
                .ok_or_else(|| Error::DeviceNotFound(key.to_string()))?;
            (device.id().to_string(), device.toggled_value()?)
        };
        self.set_value(&id, value).await
    }

    /// Fetches the current value of the device matching `key`.
    ///
    /// # Errors
    ///
    /// Returns `Error::DeviceNotFound` if no device matches, and transport,
    /// protocol or data errors of the get request.
    pub async fn request_update(&self, key: &str) -> Result<Device> {
        self.inner.ensure_connected()?;
        let id = self
            .registry()
            .device(key)
            .map(|d| d.id().to_string())
            .ok_or_else(|| Error::DeviceNotFound(key.to_string()))?;
        self.refetch(&id).await
    }

    async fn send_set(&self, id: &str, value: &Value) -> Result<()> {
        let request = Request::set_value(self.inner.timestamps.next(), id, value);
        let response = self.inner.transport.send(request).await;
        self.inner.ensure_connected()?;

        let response = response?;
        if !response.is_ok() {
            return Err(ProtocolError::UnexpectedStatus {
                status: response.status,
                body: response.body,
            }
            .into());
        }
        Ok(())
    }

    async fn refetch(&self, id: &str) -> Result<Device> {
        match self.inner.fetch_value(id).await {
            Ok(device) => Ok(device),
            Err(e) => {
                self.inner.report(e.snapshot());
                Err(e)
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Disconnects and logs out.
    ///
    /// Emits `Disconnected`, seals the registry and removes all callbacks.
    /// The logout request runs in the background. Calling this again has
    /// no effect.
    pub fn disconnect(&self) {
        if self.inner.shutdown() {
            self.inner.spawn_logout();
        }
    }
}

impl<T: Transport> Subscribable for Connection<T> {
    fn on_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceChange) + Send + Sync + 'static,
    {
        self.inner.callbacks.on_change(callback)
    }

    fn on_device_change<F>(&self, device_id: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceChange) + Send + Sync + 'static,
    {
        self.inner.callbacks.on_device_change(device_id, callback)
    }

    fn on_ready<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.callbacks.on_ready(callback)
    }

    fn on_error<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Error, bool) + Send + Sync + 'static,
    {
        self.inner.callbacks.on_error(callback)
    }

    fn on_disconnected<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.callbacks.on_disconnected(callback)
    }

    fn on_message<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static,
    {
        self.inner.callbacks.on_message(callback)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.callbacks.unsubscribe(id)
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<T: Transport> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("inner", &self.inner)
            .finish()
    }
}
