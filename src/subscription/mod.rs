// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Callback subscriptions for connection events.
//!
//! - [`SubscriptionId`] - A unique identifier for a subscription, used to unsubscribe
//! - [`CallbackRegistry`] - Subscriber lists owned by a connection
//! - [`Subscribable`] - Trait for types that support event subscriptions
//!
//! Callbacks run on the task that produced the event. For a stream of
//! events, use [`Connection::subscribe`](crate::session::Connection::subscribe)
//! instead.

mod callback;
mod subscribable;

pub use callback::{CallbackRegistry, SubscriptionId};
pub use subscribable::Subscribable;
