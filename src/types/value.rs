// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device values as reported by the gateway.
//!
//! The gateway reports values as localized display strings (`"21,5°"`,
//! `"45%"`, `"geöffnet"`). [`normalize`] turns them into a [`Value`] that can
//! be compared, so change detection does not depend on formatting.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

/// Localized token reported by window sensors when open.
pub const OPEN_TOKEN: &str = "geöffnet";

/// Localized token reported by window sensors when closed.
pub const CLOSED_TOKEN: &str = "geschlossen";

static NUMERIC_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([-+]?\d+(?:\.\d*)?)").expect("numeric prefix pattern is valid")
});

/// A normalized device value.
///
/// # Examples
///
/// ```
/// use smarthome_lp::types::{normalize, Value};
///
/// assert_eq!(normalize("21,5°"), Value::Number(21.5));
/// assert_eq!(normalize("geöffnet"), Value::Number(1.0));
/// assert_eq!(normalize("null"), Value::Unresolved);
/// ```
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value known yet.
    #[default]
    Unresolved,
    /// A numeric reading or a boolean encoded as `0`/`1`.
    Number(f64),
    /// Text that is not numeric.
    Text(String),
}

impl Value {
    /// Returns `true` if the value has not been resolved yet.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        matches!(self, Self::Unresolved)
    }

    /// Returns the numeric value, if any.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Interprets `1` as `true` and `0` as `false`.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn as_bool(&self) -> Option<bool> {
        match self.as_f64() {
            Some(n) if n == 1.0 => Some(true),
            Some(n) if n == 0.0 => Some(false),
            _ => None,
        }
    }

    /// Normalizes a raw JSON value taken from a descriptor or change item.
    ///
    /// `null` and an absent value are unresolved. Booleans map to `1`/`0`.
    #[must_use]
    pub fn from_json(raw: Option<&serde_json::Value>) -> Self {
        match raw {
            None | Some(serde_json::Value::Null) => Self::Unresolved,
            Some(serde_json::Value::String(s)) => normalize(s),
            Some(serde_json::Value::Number(n)) => {
                n.as_f64().map_or(Self::Unresolved, Self::Number)
            }
            Some(serde_json::Value::Bool(b)) => Self::Number(if *b { 1.0 } else { 0.0 }),
            Some(other) => Self::Text(other.to_string()),
        }
    }

    /// Formats the value for the `Value` parameter of a set request.
    #[must_use]
    pub fn to_wire(&self) -> String {
        match self {
            Self::Unresolved => "null".to_string(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unresolved => f.write_str("undefined"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Number(if value { 1.0 } else { 0.0 })
    }
}

/// The value type a device kind reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    /// Free text.
    String,
    /// A floating-point reading.
    Float,
    /// `0`/`1` encoded boolean.
    Boolean,
}

impl ValueType {
    /// Returns the lowercase tag for this value type.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Float => "float",
            Self::Boolean => "boolean",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalizes a raw wire string into a [`Value`].
///
/// The first decimal comma becomes a dot, the first percent and degree signs
/// are stripped, the window tokens map to `1` (open) and `0` (closed), and a
/// leading number is parsed as `f64`. `"undefined"` and `"null"` are
/// unresolved. Anything else is kept as text.
#[must_use]
pub fn normalize(raw: &str) -> Value {
    if raw == "undefined" || raw == "null" {
        return Value::Unresolved;
    }

    let cleaned = raw
        .replacen(',', ".", 1)
        .replacen('%', "", 1)
        .replacen('°', "", 1);
    let trimmed = cleaned.trim();

    if trimmed.eq_ignore_ascii_case(OPEN_TOKEN) {
        return Value::Number(1.0);
    }
    if trimmed.eq_ignore_ascii_case(CLOSED_TOKEN) {
        return Value::Number(0.0);
    }

    if let Some(number) = NUMERIC_PREFIX
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
    {
        return Value::Number(number);
    }

    Value::Text(cleaned)
}
