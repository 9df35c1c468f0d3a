// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Interpretation of long polling and get-value responses.
//!
//! A poll body has the shape `{"error": ..., "changes": [...]}`. A truthy
//! `error` ends the session. Each change item becomes a [`ChangeItem`];
//! whether its id is known, and how its value reads, is decided later by
//! the registry.

use serde::{Deserialize, Deserializer};

use crate::error::{DataError, Error, ProtocolError};

/// One change object as sent by the gateway.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct RawChange {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_resolve_required: bool,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<serde_json::Value>,
}

/// Accepts booleans as well as `"true"` / `"false"` strings.
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Bool(b)) => b,
        Some(serde_json::Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// A classified change item.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ChangeItem {
    /// Apply the inline raw value to the device.
    ValueUpdate {
        id: String,
        value: Option<serde_json::Value>,
        metadata: Option<serde_json::Value>,
    },
    /// Fetch the device's value separately.
    ResolveRequired(String),
    /// Informational payload, not tied to a device.
    Message(serde_json::Value),
    /// The item cannot be applied.
    Invalid(DataError),
}

impl ChangeItem {
    fn classify(raw: RawChange, payload: serde_json::Value) -> Self {
        match raw.id {
            Some(id) if raw.is_resolve_required => Self::ResolveRequired(id),
            Some(id) => Self::ValueUpdate {
                value: raw.value,
                id,
                metadata: raw.metadata,
            },
            None if raw.message.is_some() => Self::Message(payload),
            None => Self::Invalid(DataError::MissingId),
        }
    }
}

/// Result of interpreting a poll body.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PollOutcome {
    /// Change items in arrival order; may be empty.
    Changes(Vec<ChangeItem>),
    /// The gateway reported the session as invalid.
    SessionTerminated(String),
}

#[derive(Debug, Deserialize)]
struct PollBody {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    changes: Option<Vec<serde_json::Value>>,
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|n| n.abs() > f64::EPSILON),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

/// Interprets a long polling response body.
///
/// # Errors
///
/// Returns `ProtocolError` if the body is not JSON or lacks a change list.
pub(crate) fn parse_poll_body(body: &str) -> Result<PollOutcome, ProtocolError> {
    let parsed: PollBody = serde_json::from_str(body)?;

    if let Some(error) = parsed.error.filter(is_truthy) {
        let reason = match error {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        return Ok(PollOutcome::SessionTerminated(reason));
    }

    let changes = parsed
        .changes
        .ok_or_else(|| ProtocolError::MalformedBody("missing changes list".to_string()))?;

    let items = changes
        .into_iter()
        .map(|payload| match RawChange::deserialize(&payload) {
            Ok(raw) => ChangeItem::classify(raw, payload),
            Err(e) => {
                tracing::warn!(error = %e, payload = %payload, "Skipping unreadable change item");
                ChangeItem::Invalid(DataError::InvalidChange(e.to_string()))
            }
        })
        .collect();

    Ok(PollOutcome::Changes(items))
}

/// Interprets a get-value response, which carries exactly one change object.
///
/// The resolve-required flag is ignored here; the body is the resolution.
/// The value is returned raw, for the device's kind to parse.
///
/// # Errors
///
/// Returns a protocol error for unparseable bodies and
/// `DataError::MissingId` when the object has no id.
pub(crate) fn parse_value_body(
    body: &str,
) -> Result<(String, Option<serde_json::Value>, Option<serde_json::Value>), Error> {
    let raw: RawChange = serde_json::from_str(body).map_err(ProtocolError::from)?;
    let id = raw.id.ok_or(DataError::MissingId)?;
    Ok((id, raw.value, raw.metadata))
}
