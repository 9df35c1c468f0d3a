// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Subscribable trait for types that emit connection events.

use crate::error::Error;
use crate::event::DeviceChange;
use crate::subscription::SubscriptionId;

/// Trait for types that support callback subscriptions.
///
/// All callbacks are removed when the connection disconnects, right after
/// the disconnect callbacks ran.
///
/// # Examples
///
/// ```no_run
/// use smarthome_lp::subscription::Subscribable;
/// # fn example(connection: &impl Subscribable) {
/// let sub_id = connection.on_change(|change| {
///     println!("{} changed from {}", change.device, change.old_value);
/// });
///
/// connection.on_error(|error, fatal| {
///     eprintln!("error (fatal: {fatal}): {error}");
/// });
///
/// connection.unsubscribe(sub_id);
/// # }
/// ```
pub trait Subscribable {
    /// Subscribes to value changes of any device.
    fn on_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceChange) + Send + Sync + 'static;

    /// Subscribes to value changes of one device.
    fn on_device_change<F>(&self, device_id: &str, callback: F) -> SubscriptionId
    where
        F: Fn(&DeviceChange) + Send + Sync + 'static;

    /// Subscribes to the readiness signal.
    fn on_ready<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static;

    /// Subscribes to errors; the flag tells whether the error is fatal.
    fn on_error<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&Error, bool) + Send + Sync + 'static;

    /// Subscribes to disconnection.
    fn on_disconnected<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn() + Send + Sync + 'static;

    /// Subscribes to informational messages pushed by the gateway.
    fn on_message<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&serde_json::Value) + Send + Sync + 'static;

    /// Unsubscribes a callback by its subscription ID.
    ///
    /// Returns `true` if the subscription was found and removed.
    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}
