// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The long polling loop.
//!
//! One request is outstanding at a time. Its outcome decides the next step:
//!
//! | Outcome | Next step |
//! |---|---|
//! | `200` | reset failure counters, process the body, poll again |
//! | timeout | poll again, give up after too many in a row |
//! | connection refused | retry after a delay, give up after too many in a row |
//! | other transport error | report, retry after a delay |
//! | malformed body, other status, session error | fail |

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, ProtocolError, SessionError, TransportError};
use crate::event::ConnectionEvent;
use crate::protocol::{Request, Response, Transport};
use crate::session::inner::ConnectionInner;
use crate::session::processor::{PollOutcome, parse_poll_body};

/// State of the long polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollState {
    /// A poll request is outstanding or about to be issued.
    Polling,
    /// Waiting before the next attempt after a transport error.
    WaitingRetry,
    /// The loop has ended. Terminal.
    Disconnected,
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Polling => "polling",
            Self::WaitingRetry => "waiting-retry",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Consecutive failure counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Failures {
    timeouts: u32,
    connection_errors: u32,
}

/// What the loop does after handling one outcome.
enum Step {
    PollNow,
    RetryLater,
    Stop,
}

/// Runs the loop until the connection is disconnected.
pub(crate) async fn run<T: Transport>(inner: Arc<ConnectionInner<T>>) {
    tracing::debug!(session_id = %inner.session_id, "Starting long polling");
    let mut failures = Failures::default();

    while inner.is_connected() {
        enter(&inner, PollState::Polling);

        let timeout = inner
            .policy
            .request_timeout(inner.poll_timeout, failures.timeouts);
        let result = poll_once(&inner, timeout).await;

        // Results arriving after disconnect are discarded.
        if !inner.is_connected() {
            break;
        }

        match handle_outcome(&inner, &mut failures, result) {
            Step::PollNow => {}
            Step::RetryLater => {
                if !wait_retry(&inner).await {
                    break;
                }
            }
            Step::Stop => break,
        }
    }

    tracing::debug!("Long polling stopped");
}

/// Moves the loop to `state` unless it has already been disconnected.
fn enter<T: Transport>(inner: &ConnectionInner<T>, state: PollState) {
    inner.poll_state.send_if_modified(|current| {
        if *current == PollState::Disconnected || *current == state {
            return false;
        }
        *current = state;
        true
    });
}

/// Issues one poll request bounded by `timeout`.
async fn poll_once<T: Transport>(
    inner: &ConnectionInner<T>,
    timeout: Duration,
) -> Result<Response, TransportError> {
    let request = Request::long_poll(inner.timestamps.next(), &inner.session_id, timeout);
    tracing::debug!(timeout_ms = timeout.as_millis(), "Issuing long poll");

    match tokio::time::timeout(timeout, inner.transport.send(request)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout(timeout)),
    }
}

fn handle_outcome<T: Transport>(
    inner: &Arc<ConnectionInner<T>>,
    failures: &mut Failures,
    result: Result<Response, TransportError>,
) -> Step {
    match result {
        Ok(response) if response.is_ok() => {
            tracing::debug!("Long polling response received");
            *failures = Failures::default();
            match parse_poll_body(&response.body) {
                Ok(PollOutcome::Changes(items)) => {
                    inner.process(items);
                    Step::PollNow
                }
                Ok(PollOutcome::SessionTerminated(reason)) => {
                    inner.fail(SessionError::Terminated(reason).into());
                    Step::Stop
                }
                Err(e) => {
                    inner.fail(e.into());
                    Step::Stop
                }
            }
        }
        Ok(response) => {
            inner.fail(
                ProtocolError::UnexpectedStatus {
                    status: response.status,
                    body: response.body,
                }
                .into(),
            );
            Step::Stop
        }
        Err(e) if e.is_timeout() => {
            failures.timeouts += 1;
            tracing::info!(timeouts = failures.timeouts, "Long polling timeout");
            if failures.timeouts >= inner.policy.max_consecutive_timeouts {
                inner.fail(SessionError::TooManyTimeouts(failures.timeouts).into());
                return Step::Stop;
            }
            Step::PollNow
        }
        Err(e) if e.is_connection_refused() => {
            failures.connection_errors += 1;
            tracing::warn!(
                error = %e,
                connection_errors = failures.connection_errors,
                "Long polling connection refused"
            );
            if failures.connection_errors >= inner.policy.max_connection_errors {
                inner.fail(
                    SessionError::TooManyConnectionErrors(failures.connection_errors).into(),
                );
                return Step::Stop;
            }
            Step::RetryLater
        }
        Err(e) => {
            tracing::warn!(error = %e, "Error during long polling request");
            inner.emit(ConnectionEvent::error(Error::from(e)));
            Step::RetryLater
        }
    }
}

/// Waits for the retry delay. Returns `false` if disconnected meanwhile.
async fn wait_retry<T: Transport>(inner: &ConnectionInner<T>) -> bool {
    let delay = inner.policy.retry_delay_for(inner.poll_timeout);
    enter(inner, PollState::WaitingRetry);
    tracing::debug!(delay_ms = delay.as_millis(), "Waiting before next poll");

    let mut state = inner.poll_state.subscribe();
    tokio::select! {
        () = tokio::time::sleep(delay) => {}
        _ = state.wait_for(|s| *s == PollState::Disconnected) => {}
    }
    inner.is_connected()
}
