// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Strictly increasing request timestamps.

use std::sync::atomic::{AtomicI64, Ordering};

/// Generates millisecond timestamps for the `_` request parameter.
///
/// Every returned value is greater than all values returned before, even
/// when called twice within the same millisecond or when the wall clock
/// steps backwards.
///
/// # Examples
///
/// ```
/// use smarthome_lp::protocol::TimestampGenerator;
///
/// let timestamps = TimestampGenerator::new();
/// let a = timestamps.next();
/// let b = timestamps.next();
/// assert!(b > a);
/// ```
#[derive(Debug)]
pub struct TimestampGenerator {
    last: AtomicI64,
}

impl TimestampGenerator {
    /// Creates a generator that has not issued any timestamp yet.
    #[must_use]
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(i64::MIN),
        }
    }

    /// Returns the next timestamp based on the current wall clock.
    #[must_use]
    pub fn next(&self) -> i64 {
        self.next_at(chrono::Utc::now().timestamp_millis())
    }

    /// Returns the next timestamp given the wall clock reading `now_ms`.
    #[must_use]
    pub fn next_at(&self, now_ms: i64) -> i64 {
        let advance = |last: i64| now_ms.max(last.saturating_add(1));
        let previous = self
            .last
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| Some(advance(last)))
            .unwrap_or_else(|prev| prev);
        advance(previous)
    }
}

impl Default for TimestampGenerator {
    fn default() -> Self {
        Self::new()
    }
}
