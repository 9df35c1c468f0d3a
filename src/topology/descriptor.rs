// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Raw descriptors embedded in the gateway's start page.

use serde::{Deserialize, Deserializer};

/// A location (room) as listed in the room selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationDescriptor {
    /// Location id.
    pub id: String,
    /// Location name as shown by the gateway.
    pub name: String,
}

impl LocationDescriptor {
    /// Creates a location descriptor.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Attribute bag describing a sensor.
///
/// # Examples
///
/// ```
/// use smarthome_lp::topology::SensorDescriptor;
///
/// let json = r#"{"Id":"s1","Name":"Bad Fenster","DeviceType":"Wds","Value":"geschlossen"}"#;
/// let sensor: SensorDescriptor = serde_json::from_str(json).unwrap();
/// assert_eq!(sensor.device_type, "Wds");
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SensorDescriptor {
    /// Logical device id.
    pub id: String,
    /// Device name.
    pub name: String,
    /// Gateway device type (`Rst`, `Wds`, `Wmd`, ...).
    #[serde(default)]
    pub device_type: String,
    /// Raw initial value.
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Physical devices this logical sensor belongs to.
    #[serde(default)]
    pub base_device_ids: Vec<String>,
    /// Location the sensor is placed in.
    ///
    /// Not part of the embedded payload; filled in from the page markup.
    #[serde(default)]
    pub location_id: Option<String>,
}

/// Actuators of one location, as grouped in the embedded payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActuatorGroup {
    /// Location of every actuator in this group.
    pub location_id: String,
    /// Physical devices carrying these actuators.
    #[serde(default)]
    pub base_device_ids: Vec<String>,
    /// The actuators.
    #[serde(default)]
    pub actuators: Vec<ActuatorDescriptor>,
}

/// Attribute bag describing an actuator.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ActuatorDescriptor {
    /// Logical device id.
    pub id: String,
    /// Device name.
    pub name: String,
    /// Application id, set for built-in actuators such as variables.
    #[serde(default)]
    pub app_id: Option<String>,
    /// UI class name, used to tell actuator kinds apart.
    #[serde(default)]
    pub css_class_name: Option<String>,
    /// Raw initial value.
    #[serde(default)]
    pub current_value: Option<serde_json::Value>,
    /// Lower set-point bound (heating only).
    #[serde(default, deserialize_with = "lenient_f64")]
    pub min_value: Option<f64>,
    /// Upper set-point bound (heating only).
    #[serde(default, deserialize_with = "lenient_f64")]
    pub max_value: Option<f64>,
    /// Set-point step (heating only).
    #[serde(default, deserialize_with = "lenient_f64")]
    pub step: Option<f64>,
}

/// Accepts numbers as well as numeric strings with a decimal comma.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match raw {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.replace(',', ".").trim().parse().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actuator_group_from_json() {
        let json = r#"{
            "LocationId": "loc1",
            "BaseDeviceIds": ["bd1"],
            "Actuators": [
                {"Id": "a1", "Name": "Heizung", "CssClassName": "heating",
                 "CurrentValue": "20,5", "MinValue": "6,0", "MaxValue": 30, "Step": 0.5}
            ]
        }"#;
        let group: ActuatorGroup = serde_json::from_str(json).unwrap();

        assert_eq!(group.location_id, "loc1");
        let heating = &group.actuators[0];
        assert_eq!(heating.css_class_name.as_deref(), Some("heating"));
        assert_eq!(heating.min_value, Some(6.0));
        assert_eq!(heating.max_value, Some(30.0));
        assert_eq!(heating.step, Some(0.5));
    }

    #[test]
    fn sensor_defaults() {
        let json = r#"{"Id":"s1","Name":"Flur"}"#;
        let sensor: SensorDescriptor = serde_json::from_str(json).unwrap();
        assert!(sensor.value.is_none());
        assert!(sensor.base_device_ids.is_empty());
        assert!(sensor.location_id.is_none());
    }
}
