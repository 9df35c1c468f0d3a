// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Tracking of the startup value fetches.

/// Counts startup fetches and decides when the connection is ready.
///
/// Readiness fires exactly once per connection. Only fetches issued for
/// devices that were unresolved at construction are counted; fetches
/// triggered later by resolve-required updates do not touch the counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct InitResolver {
    requested: usize,
    resolved: usize,
    fired: bool,
}

impl InitResolver {
    /// Creates a resolver waiting for `requested` fetches.
    pub(crate) fn new(requested: usize) -> Self {
        Self {
            requested,
            resolved: 0,
            fired: false,
        }
    }

    /// Fires immediately when nothing has to be fetched.
    ///
    /// Returns `true` if readiness must be signalled now.
    pub(crate) fn start(&mut self) -> bool {
        if self.requested == 0 && !self.fired {
            self.fired = true;
            return true;
        }
        false
    }

    /// Records one completed startup fetch, successful or not.
    ///
    /// Returns `true` when this completion makes the connection ready.
    /// Both counters are reset at that point.
    pub(crate) fn complete_one(&mut self) -> bool {
        if self.fired {
            return false;
        }
        self.resolved += 1;
        tracing::info!(
            resolved = self.resolved,
            requested = self.requested,
            "Resolved startup value"
        );
        if self.resolved >= self.requested {
            self.requested = 0;
            self.resolved = 0;
            self.fired = true;
            return true;
        }
        false
    }

    /// Returns `(resolved, requested)`.
    pub(crate) fn progress(&self) -> (usize, usize) {
        (self.resolved, self.requested)
    }

    /// Returns `true` once readiness has fired.
    pub(crate) fn has_fired(&self) -> bool {
        self.fired
    }
}
