// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Long polling policy.

use std::time::Duration;

use crate::event::event_bus::DEFAULT_CHANNEL_CAPACITY;

/// Failure thresholds and delays of the long polling loop.
///
/// # Examples
///
/// ```
/// use smarthome_lp::session::PollPolicy;
/// use std::time::Duration;
///
/// // Defaults: give up after 5 timeouts or 3 refused connections
/// let policy = PollPolicy::default();
/// assert_eq!(policy.max_consecutive_timeouts, 5);
///
/// // Custom
/// let policy = PollPolicy::new()
///     .with_max_consecutive_timeouts(10)
///     .with_retry_delay(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// Consecutive poll timeouts before the connection gives up.
    pub max_consecutive_timeouts: u32,
    /// Consecutive refused connections before the connection gives up.
    pub max_connection_errors: u32,
    /// Slack added to the advertised poll timeout per attempt.
    pub timeout_slack_step: Duration,
    /// Delay before retrying after a transport error.
    ///
    /// `None` waits one full advertised poll timeout.
    pub retry_delay: Option<Duration>,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl PollPolicy {
    /// Default number of consecutive timeouts tolerated.
    pub const DEFAULT_MAX_TIMEOUTS: u32 = 5;
    /// Default number of consecutive refused connections tolerated.
    pub const DEFAULT_MAX_CONNECTION_ERRORS: u32 = 3;
    /// Default slack step.
    pub const DEFAULT_SLACK_STEP: Duration = Duration::from_secs(5);

    /// Creates a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of consecutive timeouts tolerated.
    #[must_use]
    pub fn with_max_consecutive_timeouts(mut self, max: u32) -> Self {
        self.max_consecutive_timeouts = max;
        self
    }

    /// Sets the number of consecutive refused connections tolerated.
    #[must_use]
    pub fn with_max_connection_errors(mut self, max: u32) -> Self {
        self.max_connection_errors = max;
        self
    }

    /// Sets the slack step added per attempt.
    #[must_use]
    pub fn with_timeout_slack_step(mut self, step: Duration) -> Self {
        self.timeout_slack_step = step;
        self
    }

    /// Sets a fixed retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Sets the event channel capacity.
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Returns the deadline of a poll request.
    ///
    /// The deadline grows with each consecutive timeout:
    /// `poll_timeout + step * (timeouts + 1)`.
    #[must_use]
    pub fn request_timeout(&self, poll_timeout: Duration, consecutive_timeouts: u32) -> Duration {
        poll_timeout + self.timeout_slack_step * consecutive_timeouts.saturating_add(1)
    }

    /// Returns the delay before retrying after a transport error.
    #[must_use]
    pub fn retry_delay_for(&self, poll_timeout: Duration) -> Duration {
        self.retry_delay.unwrap_or(poll_timeout)
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_timeouts: Self::DEFAULT_MAX_TIMEOUTS,
            max_connection_errors: Self::DEFAULT_MAX_CONNECTION_ERRORS,
            timeout_slack_step: Self::DEFAULT_SLACK_STEP,
            retry_delay: None,
            event_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
