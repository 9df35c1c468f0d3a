// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value codec and device kind types.
//!
//! - [`Value`] and [`normalize`]: typed values parsed from wire strings
//! - [`DeviceKind`] and [`KindTraits`]: closed set of device kinds and the
//!   per-kind behavior table

mod kind;
mod value;

pub use kind::{DeviceKind, KindTraits};
pub use value::{CLOSED_TOKEN, OPEN_TOKEN, Value, ValueType, normalize};
