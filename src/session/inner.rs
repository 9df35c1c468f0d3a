// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! State shared between a connection handle and its background tasks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;

use crate::error::{DataError, Error, ProtocolError};
use crate::event::{ConnectionEvent, DeviceChange, EventBus};
use crate::protocol::{Request, TimestampGenerator, Transport};
use crate::registry::{Device, Registry};
use crate::session::PollPolicy;
use crate::session::poll::PollState;
use crate::session::processor::{ChangeItem, parse_value_body};
use crate::session::resolver::InitResolver;
use crate::subscription::CallbackRegistry;

/// Why a value fetch was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FetchOrigin {
    /// Device was unresolved when the connection was created.
    Startup,
    /// The gateway flagged a change as resolve-required.
    ResolveRequired,
}

pub(crate) struct ConnectionInner<T> {
    pub(crate) transport: T,
    pub(crate) policy: PollPolicy,
    pub(crate) session_id: String,
    pub(crate) poll_timeout: Duration,
    pub(crate) registry: RwLock<Registry>,
    pub(crate) resolver: Mutex<InitResolver>,
    pub(crate) timestamps: TimestampGenerator,
    pub(crate) events: EventBus,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) poll_state: watch::Sender<PollState>,
    pub(crate) ready: watch::Sender<bool>,
    connected: AtomicBool,
    initialized: AtomicBool,
}

impl<T: Transport> ConnectionInner<T> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        transport: T,
        policy: PollPolicy,
        session_id: String,
        poll_timeout: Duration,
        registry: Registry,
        resolver: InitResolver,
        events: EventBus,
        callbacks: CallbackRegistry,
    ) -> Self {
        Self {
            transport,
            policy,
            session_id,
            poll_timeout,
            registry: RwLock::new(registry),
            resolver: Mutex::new(resolver),
            timestamps: TimestampGenerator::new(),
            events,
            callbacks,
            poll_state: watch::Sender::new(PollState::Polling),
            ready: watch::Sender::new(false),
            connected: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_connected(&self) -> Result<(), Error> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Delivers an event to callbacks and broadcast subscribers.
    pub(crate) fn emit(&self, event: ConnectionEvent) {
        self.callbacks.dispatch(&event);
        self.events.publish(event);
    }

    /// Broadcasts a non-fatal error, unless the connection is gone.
    pub(crate) fn report(&self, error: Error) {
        if matches!(error, Error::NotConnected) || !self.is_connected() {
            return;
        }
        tracing::warn!(error = %error, "Recoverable connection error");
        self.emit(ConnectionEvent::recoverable(error));
    }

    pub(crate) fn mark_ready(&self) {
        if !self.is_connected() {
            return;
        }
        self.initialized.store(true, Ordering::Release);
        self.ready.send_replace(true);
        tracing::info!("All devices initialized");
        self.emit(ConnectionEvent::Ready);
    }

    /// Emits a fatal error and tears the connection down without logout.
    pub(crate) fn fail(&self, error: Error) {
        if !self.is_connected() {
            return;
        }
        tracing::error!(error = %error, "Connection failed");
        self.emit(ConnectionEvent::Error {
            error: Arc::new(error),
            fatal: true,
        });
        self.shutdown();
    }

    /// Marks the connection disconnected.
    ///
    /// Returns `false` if it already was. The registry is sealed and every
    /// callback is removed after the final `Disconnected` event.
    pub(crate) fn shutdown(&self) -> bool {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return false;
        }
        self.registry.write().seal();
        self.poll_state.send_replace(PollState::Disconnected);
        tracing::info!(session_id = %self.session_id, "Disconnected");
        self.emit(ConnectionEvent::Disconnected);
        self.callbacks.clear();
        true
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Applies a raw value to a device and emits a change event if it
    /// changed.
    pub(crate) fn apply_value(
        &self,
        id: &str,
        raw: Option<&serde_json::Value>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Option<DeviceChange>, DataError> {
        let change = self.registry.write().apply_raw(id, raw, metadata)?;

        if let Some(change) = &change {
            if self.is_initialized() {
                tracing::info!(
                    "Changed {} from {} to {}",
                    change.device,
                    change.old_value,
                    change.device.value()
                );
            } else {
                tracing::debug!("Initialized {} to {}", change.device, change.device.value());
            }
            self.emit(ConnectionEvent::Changed(change.clone()));
        }
        Ok(change)
    }

    /// Handles the items of one poll response in order.
    pub(crate) fn process(self: &Arc<Self>, items: Vec<ChangeItem>) {
        if items.is_empty() {
            tracing::debug!("No changes received");
        }
        for item in items {
            if !self.is_connected() {
                return;
            }
            match item {
                ChangeItem::ValueUpdate {
                    id,
                    value,
                    metadata,
                } => {
                    if let Err(e) = self.apply_value(&id, value.as_ref(), metadata) {
                        self.report(e.into());
                    }
                }
                ChangeItem::ResolveRequired(id) => {
                    tracing::debug!(device_id = %id, "Resolve required");
                    self.spawn_fetch(id, FetchOrigin::ResolveRequired);
                }
                ChangeItem::Message(payload) => {
                    tracing::debug!(payload = %payload, "Message received");
                    self.emit(ConnectionEvent::Message(payload));
                }
                ChangeItem::Invalid(e) => self.report(e.into()),
            }
        }
    }

    // =========================================================================
    // Value fetches
    // =========================================================================

    /// Fetches the current value of one device and applies it.
    pub(crate) async fn fetch_value(&self, id: &str) -> Result<Device, Error> {
        self.ensure_connected()?;

        let request = Request::get_value(self.timestamps.next(), id);
        let response = self.transport.send(request).await;
        self.ensure_connected()?;

        let response = response?;
        if !response.is_ok() {
            return Err(ProtocolError::UnexpectedStatus {
                status: response.status,
                body: response.body,
            }
            .into());
        }

        let (resolved_id, value, metadata) = parse_value_body(&response.body)?;
        self.apply_value(&resolved_id, value.as_ref(), metadata)?;

        self.registry
            .read()
            .device_by_id(&resolved_id)
            .cloned()
            .ok_or_else(|| DataError::UnknownDevice(resolved_id).into())
    }

    /// Fetches a value in the background and reports failures.
    pub(crate) fn spawn_fetch(self: &Arc<Self>, id: String, origin: FetchOrigin) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let result = inner.fetch_value(&id).await;
            if !inner.is_connected() {
                return;
            }
            if let Err(e) = result {
                inner.report(e);
            }
            if origin == FetchOrigin::Startup && inner.resolver.lock().complete_one() {
                inner.mark_ready();
            }
        });
    }

    /// Sends the logout request in the background.
    pub(crate) fn spawn_logout(self: &Arc<Self>) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("No runtime available, skipping logout");
            return;
        };
        let inner = Arc::clone(self);
        handle.spawn(async move {
            let request = Request::logout(inner.timestamps.next());
            match inner.transport.send(request).await {
                Ok(response) => tracing::debug!(status = response.status, "Logged out"),
                Err(e) => tracing::debug!(error = %e, "Logout failed"),
            }
        });
    }
}

impl<T> std::fmt::Debug for ConnectionInner<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionInner")
            .field("session_id", &self.session_id)
            .field("poll_timeout", &self.poll_timeout)
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .field("initialized", &self.initialized.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
