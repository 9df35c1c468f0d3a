// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Topology snapshot taken from the gateway's start page.
//!
//! The start page served after login embeds everything a connection needs:
//! the session id, the long polling timeout, the room selector and two
//! script calls carrying the sensor and actuator payloads. Extraction is
//! pattern based and kept in this module; the rest of the crate only sees
//! the structured [`Topology`].
//!
//! # Examples
//!
//! ```
//! use smarthome_lp::topology::Topology;
//!
//! let page = r#"
//! <script>var sessionId = "abc123"; var longPollingTimeoutSeconds = 30;</script>
//! <select class="roomselect"><option value="r_loc1">Bad</option></select>
//! <div class="room" id="r_loc1"><div id="s1"></div></div>
//! <script>
//! SensorManager.load([{"Id":"s1","Name":"Fenster","DeviceType":"Wds","Value":"geschlossen"}]);
//! ActuatorManager.load([], [{"LocationId":"loc1","Actuators":[]}]);
//! </script>
//! "#;
//!
//! let topology = Topology::from_document(page).unwrap();
//! assert_eq!(topology.session_id, "abc123");
//! assert_eq!(topology.sensors[0].location_id.as_deref(), Some("loc1"));
//! ```

mod descriptor;

pub use descriptor::{ActuatorDescriptor, ActuatorGroup, LocationDescriptor, SensorDescriptor};

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

use crate::error::TopologyError;

static SESSION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"sessionId\s*=\s*"([a-zA-Z0-9]+)""#).expect("session id pattern is valid")
});

static POLL_TIMEOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"longPollingTimeoutSeconds\s*=\s*(\d+)").expect("poll timeout pattern is valid")
});

static ROOM_SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<select[^>]*class="[^"]*\broomselect\b[^"]*"[^>]*>(.*?)</select>"#)
        .expect("room select pattern is valid")
});

static OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<option[^>]*value="([^"]*)"[^>]*>(.*?)</option>"#)
        .expect("option pattern is valid")
});

static SENSOR_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"SensorManager\.load\((.*)\);").expect("sensor payload pattern is valid")
});

static ACTUATOR_PAYLOAD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ActuatorManager\.load\(\s*(\[.*\])\s*,\s*(\[.*\])")
        .expect("actuator payload pattern is valid")
});

static DIV_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<div\b[^>]*>").expect("div pattern is valid"));

static CLASS_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bclass="([^"]*)""#).expect("class pattern is valid"));

static ID_ATTR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bid="([^"]*)""#).expect("id pattern is valid"));

/// Prefix the page puts in front of location ids in element ids and
/// option values.
const LOCATION_PREFIX_LEN: usize = 2;

/// Everything known about the home before live updates begin.
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    /// Session id used for long polling.
    pub session_id: String,
    /// Poll timeout advertised by the gateway.
    pub poll_timeout: Duration,
    /// Locations, in page order.
    pub locations: Vec<LocationDescriptor>,
    /// Sensor descriptors.
    pub sensors: Vec<SensorDescriptor>,
    /// Actuator descriptors grouped by location.
    pub actuator_groups: Vec<ActuatorGroup>,
}

impl Topology {
    /// Creates an empty topology for the given session.
    #[must_use]
    pub fn new(session_id: impl Into<String>, poll_timeout: Duration) -> Self {
        Self {
            session_id: session_id.into(),
            poll_timeout,
            locations: Vec::new(),
            sensors: Vec::new(),
            actuator_groups: Vec::new(),
        }
    }

    /// Adds a location.
    #[must_use]
    pub fn with_location(mut self, location: LocationDescriptor) -> Self {
        self.locations.push(location);
        self
    }

    /// Adds a sensor.
    #[must_use]
    pub fn with_sensor(mut self, sensor: SensorDescriptor) -> Self {
        self.sensors.push(sensor);
        self
    }

    /// Adds a group of actuators.
    #[must_use]
    pub fn with_actuator_group(mut self, group: ActuatorGroup) -> Self {
        self.actuator_groups.push(group);
        self
    }

    /// Extracts the topology from the gateway's start page.
    ///
    /// # Errors
    ///
    /// Returns `TopologyError` if the session id, the poll timeout or one of
    /// the embedded payloads is missing, or if a payload is not valid JSON.
    pub fn from_document(document: &str) -> Result<Self, TopologyError> {
        let session_id = SESSION_ID
            .captures(document)
            .map(|caps| caps[1].to_string())
            .ok_or(TopologyError::MissingSessionId)?;

        let poll_timeout = POLL_TIMEOUT
            .captures(document)
            .and_then(|caps| caps[1].parse::<u64>().ok())
            .map(Duration::from_secs)
            .ok_or(TopologyError::MissingPollTimeout)?;

        let locations = extract_locations(document);

        let sensor_json = SENSOR_PAYLOAD
            .captures(document)
            .map(|caps| caps[1].to_string())
            .ok_or(TopologyError::MissingPayload("sensor"))?;
        let mut sensors: Vec<SensorDescriptor> = serde_json::from_str(&sensor_json)?;

        // The first array holds location metadata that the room selector
        // already provides.
        let actuator_json = ACTUATOR_PAYLOAD
            .captures(document)
            .map(|caps| caps[2].to_string())
            .ok_or(TopologyError::MissingPayload("actuator"))?;
        let actuator_groups: Vec<ActuatorGroup> = serde_json::from_str(&actuator_json)?;

        let rooms = room_markers(document);
        for sensor in sensors.iter_mut().filter(|s| s.location_id.is_none()) {
            sensor.location_id = enclosing_room(document, &rooms, &sensor.id);
        }

        tracing::debug!(
            session_id = %session_id,
            locations = locations.len(),
            sensors = sensors.len(),
            actuator_groups = actuator_groups.len(),
            "Extracted topology from document"
        );

        Ok(Self {
            session_id,
            poll_timeout,
            locations,
            sensors,
            actuator_groups,
        })
    }
}

fn strip_location_prefix(raw: &str) -> String {
    raw.get(LOCATION_PREFIX_LEN..).unwrap_or_default().to_string()
}

fn extract_locations(document: &str) -> Vec<LocationDescriptor> {
    let Some(select) = ROOM_SELECT.captures(document) else {
        return Vec::new();
    };

    OPTION
        .captures_iter(&select[1])
        .map(|caps| {
            LocationDescriptor::new(
                strip_location_prefix(&caps[1]),
                decode_entities(caps[2].trim()),
            )
        })
        .collect()
}

/// Byte offsets and location ids of every `room` container in the page.
fn room_markers(document: &str) -> Vec<(usize, String)> {
    DIV_TAG
        .find_iter(document)
        .filter_map(|tag| {
            let text = tag.as_str();
            let is_room = CLASS_ATTR
                .captures(text)
                .is_some_and(|caps| caps[1].split_whitespace().any(|c| c == "room"));
            if !is_room {
                return None;
            }
            ID_ATTR
                .captures(text)
                .map(|caps| (tag.start(), strip_location_prefix(&caps[1])))
        })
        .collect()
}

/// Returns the location of the last room container opened before the
/// element carrying `element_id`.
fn enclosing_room(document: &str, rooms: &[(usize, String)], element_id: &str) -> Option<String> {
    let position = document.find(&format!("id=\"{element_id}\""))?;
    rooms
        .iter()
        .take_while(|(start, _)| *start < position)
        .last()
        .map(|(_, id)| id.clone())
        .filter(|id| !id.is_empty())
}

fn decode_entities(text: &str) -> String {
    const ENTITIES: [(&str, &str); 9] = [
        ("&auml;", "ä"),
        ("&ouml;", "ö"),
        ("&uuml;", "ü"),
        ("&Auml;", "Ä"),
        ("&Ouml;", "Ö"),
        ("&Uuml;", "Ü"),
        ("&szlig;", "ß"),
        ("&quot;", "\""),
        ("&#39;", "'"),
    ];

    let mut decoded = text.to_string();
    for (entity, replacement) in ENTITIES {
        decoded = decoded.replace(entity, replacement);
    }
    // Last, so that escaped entities are not decoded twice.
    decoded.replace("&amp;", "&")
}
