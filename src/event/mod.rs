// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Event system for connection and device changes.
//!
//! The [`EventBus`] uses tokio's broadcast channel so any number of
//! consumers can follow a connection. Callback-style subscriptions live in
//! [`subscription`](crate::subscription).
//!
//! # Examples
//!
//! ```
//! use smarthome_lp::event::{ConnectionEvent, EventBus};
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.publish(ConnectionEvent::Ready);
//! assert!(matches!(rx.try_recv(), Ok(ConnectionEvent::Ready)));
//! ```

mod connection_event;
pub(crate) mod event_bus;

pub use connection_event::{ConnectionEvent, DeviceChange};
pub use event_bus::EventBus;
