// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device kinds and their per-kind behavior.
//!
//! A [`DeviceKind`] is chosen once, when a descriptor is turned into a
//! device. Everything that differs between kinds (how a raw value is
//! parsed and rendered, its unit and value type) is looked up through
//! [`DeviceKind::traits`].

use std::fmt;

use crate::topology::{ActuatorDescriptor, SensorDescriptor};

use super::value::{Value, ValueType};

/// Sensor device type for room climate sensors (temperature or humidity).
const ROOM_SENSOR_TYPE: &str = "Rst";
/// Sensor device type for window/door contacts.
const WINDOW_SENSOR_TYPE: &str = "Wds";
/// Sensor device type for motion detectors reporting brightness.
const MOTION_SENSOR_TYPE: &str = "Wmd";
/// Application id of the built-in variable actuator.
const VARIABLE_APP_ID: &str = "sh://VariableActuator.builtin";

/// The closed set of device kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// A sensor of unrecognized type.
    GenericSensor,
    /// Window/door contact, `1` when open and `0` when closed.
    WindowSensor,
    /// Temperature sensor in °C.
    TemperatureSensor,
    /// Relative humidity sensor in %.
    HumiditySensor,
    /// Brightness sensor in %.
    BrightnessSensor,
    /// An actuator of unrecognized type.
    GenericActuator,
    /// Boolean variable maintained by the gateway.
    VariableActuator,
    /// Switchable electrical device.
    ElectricalDevice,
    /// Switchable light.
    Light,
    /// Heating thermostat with a bounded set-point in °C.
    Heating,
}

/// Per-kind behavior selected once at device creation.
#[derive(Clone, Copy)]
pub struct KindTraits {
    /// Short type tag.
    pub tag: &'static str,
    /// Display unit, if any.
    pub unit: Option<&'static str>,
    /// The value type reported by this kind.
    pub value_type: ValueType,
    parse: fn(Option<&serde_json::Value>) -> Value,
    display: fn(&Value, Option<&str>) -> String,
}

impl KindTraits {
    /// Parses a raw descriptor or wire value the way this kind reads it.
    ///
    /// An absent or `null` value is unresolved.
    #[must_use]
    pub fn parse(&self, raw: Option<&serde_json::Value>) -> Value {
        (self.parse)(raw)
    }

    /// Renders a value the way this kind displays it.
    #[must_use]
    pub fn display(&self, value: &Value) -> String {
        (self.display)(value, self.unit)
    }
}

impl fmt::Debug for KindTraits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KindTraits")
            .field("tag", &self.tag)
            .field("unit", &self.unit)
            .field("value_type", &self.value_type)
            .finish_non_exhaustive()
    }
}

fn display_with_unit(value: &Value, unit: Option<&str>) -> String {
    match (value, unit) {
        (Value::Unresolved, _) => value.to_string(),
        (_, Some(unit)) => format!("{value}{unit}"),
        (_, None) => value.to_string(),
    }
}

fn display_on_off(value: &Value, _unit: Option<&str>) -> String {
    match value.as_bool() {
        Some(true) => "on".to_string(),
        Some(false) => "off".to_string(),
        None => "undefined".to_string(),
    }
}

fn display_true_false(value: &Value, _unit: Option<&str>) -> String {
    match value.as_bool() {
        Some(true) => "true".to_string(),
        Some(false) => "false".to_string(),
        None => "undefined".to_string(),
    }
}

fn display_open_closed(value: &Value, _unit: Option<&str>) -> String {
    match value.as_bool() {
        Some(true) => "open".to_string(),
        Some(false) => "closed".to_string(),
        None => value.to_string(),
    }
}

impl DeviceKind {
    /// Classifies a sensor descriptor.
    ///
    /// Room sensors are told apart by the unit sign their raw value ends
    /// with: `°` is temperature, `%` is humidity.
    #[must_use]
    pub fn classify_sensor(descriptor: &SensorDescriptor) -> Self {
        match descriptor.device_type.as_str() {
            ROOM_SENSOR_TYPE => match descriptor.value.as_ref().and_then(|v| v.as_str()) {
                Some(raw) if raw.ends_with('°') => Self::TemperatureSensor,
                Some(raw) if raw.ends_with('%') => Self::HumiditySensor,
                _ => Self::GenericSensor,
            },
            WINDOW_SENSOR_TYPE => Self::WindowSensor,
            MOTION_SENSOR_TYPE => Self::BrightnessSensor,
            _ => Self::GenericSensor,
        }
    }

    /// Classifies an actuator descriptor.
    #[must_use]
    pub fn classify_actuator(descriptor: &ActuatorDescriptor) -> Self {
        if descriptor.app_id.as_deref() == Some(VARIABLE_APP_ID) {
            return Self::VariableActuator;
        }
        match descriptor.css_class_name.as_deref() {
            Some("heating") => Self::Heating,
            Some("light") => Self::Light,
            Some("elecDev") => Self::ElectricalDevice,
            _ => Self::GenericActuator,
        }
    }

    /// Returns `true` for sensor kinds.
    #[must_use]
    pub const fn is_sensor(&self) -> bool {
        matches!(
            self,
            Self::GenericSensor
                | Self::WindowSensor
                | Self::TemperatureSensor
                | Self::HumiditySensor
                | Self::BrightnessSensor
        )
    }

    /// Returns `true` for actuator kinds.
    #[must_use]
    pub const fn is_actuator(&self) -> bool {
        !self.is_sensor()
    }

    /// Returns the behavior table for this kind.
    #[must_use]
    pub const fn traits(&self) -> KindTraits {
        match self {
            Self::GenericSensor => KindTraits {
                tag: "unknown",
                unit: None,
                value_type: ValueType::String,
                parse: Value::from_json,
                display: display_with_unit,
            },
            Self::WindowSensor => KindTraits {
                tag: "window",
                unit: None,
                value_type: ValueType::String,
                parse: Value::from_json,
                display: display_open_closed,
            },
            Self::TemperatureSensor => KindTraits {
                tag: "temperature",
                unit: Some("°C"),
                value_type: ValueType::Float,
                parse: Value::from_json,
                display: display_with_unit,
            },
            Self::HumiditySensor => KindTraits {
                tag: "humidity",
                unit: Some("%"),
                value_type: ValueType::Float,
                parse: Value::from_json,
                display: display_with_unit,
            },
            Self::BrightnessSensor => KindTraits {
                tag: "brightness",
                unit: Some("%"),
                value_type: ValueType::Float,
                parse: Value::from_json,
                display: display_with_unit,
            },
            Self::GenericActuator => KindTraits {
                tag: "unknown",
                unit: None,
                value_type: ValueType::String,
                parse: Value::from_json,
                display: display_with_unit,
            },
            Self::VariableActuator => KindTraits {
                tag: "variable",
                unit: None,
                value_type: ValueType::Boolean,
                parse: Value::from_json,
                display: display_true_false,
            },
            Self::ElectricalDevice => KindTraits {
                tag: "elecdev",
                unit: None,
                value_type: ValueType::Boolean,
                parse: Value::from_json,
                display: display_on_off,
            },
            Self::Light => KindTraits {
                tag: "light",
                unit: None,
                value_type: ValueType::Boolean,
                parse: Value::from_json,
                display: display_on_off,
            },
            Self::Heating => KindTraits {
                tag: "heating",
                unit: Some("°C"),
                value_type: ValueType::Float,
                parse: Value::from_json,
                display: display_with_unit,
            },
        }
    }

    /// Returns the type name used when formatting devices.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GenericSensor => "Sensor",
            Self::WindowSensor => "WindowSensor",
            Self::TemperatureSensor => "TemperatureSensor",
            Self::HumiditySensor => "HumiditySensor",
            Self::BrightnessSensor => "BrightnessSensor",
            Self::GenericActuator => "Actuator",
            Self::VariableActuator => "Variable",
            Self::ElectricalDevice => "ElectricalDevice",
            Self::Light => "Light",
            Self::Heating => "Heating",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
