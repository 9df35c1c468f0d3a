// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Devices and locations held by the registry.

use std::fmt;

use crate::error::ValueError;
use crate::topology::{ActuatorDescriptor, SensorDescriptor};
use crate::types::{DeviceKind, Value, ValueType};

/// Capitalizes every word of the lowercased name.
pub(crate) fn display_name(name: &str) -> String {
    let lower = name.to_lowercase();
    let mut out = String::with_capacity(lower.len());
    let mut at_word_start = true;
    for c in lower.chars() {
        if at_word_start && !c.is_whitespace() {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.push(c);
            if c.is_whitespace() {
                at_word_start = true;
            }
        }
    }
    out
}

/// Non-owning reference from a device to its location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRef {
    /// Location id.
    pub id: String,
    /// Display name of the location.
    pub display_name: String,
}

/// Set-point bounds advertised by a heating actuator.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SetPointBounds {
    /// Lowest allowed set-point.
    pub min: Option<f64>,
    /// Highest allowed set-point.
    pub max: Option<f64>,
    /// Set-point increment.
    pub step: Option<f64>,
}

impl SetPointBounds {
    /// Checks a set-point against the bounds.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if the value is not finite, below
    /// `min` or above `max`.
    pub fn check(&self, value: f64) -> Result<(), ValueError> {
        let min = self.min.unwrap_or(f64::NEG_INFINITY);
        let max = self.max.unwrap_or(f64::INFINITY);
        if !value.is_finite() || value < min || value > max {
            return Err(ValueError::OutOfRange { value, min, max });
        }
        Ok(())
    }
}

/// A sensor or actuator known to the registry.
///
/// Devices handed out by a connection are snapshots; the registry keeps the
/// authoritative copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    id: String,
    name: String,
    display_name: String,
    location: Option<LocationRef>,
    kind: DeviceKind,
    type_tag: String,
    value: Value,
    last_update_metadata: Option<serde_json::Value>,
    bounds: Option<SetPointBounds>,
    base_device_ids: Vec<String>,
}

impl Device {
    /// Creates a sensor from its descriptor.
    #[must_use]
    pub fn from_sensor(descriptor: &SensorDescriptor, location: Option<LocationRef>) -> Self {
        let kind = DeviceKind::classify_sensor(descriptor);
        Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            display_name: display_name(&descriptor.name),
            location,
            kind,
            type_tag: kind.traits().tag.to_string(),
            value: kind.traits().parse(descriptor.value.as_ref()),
            last_update_metadata: None,
            bounds: None,
            base_device_ids: descriptor.base_device_ids.clone(),
        }
    }

    /// Creates an actuator from its descriptor.
    ///
    /// Unrecognized actuators take their UI class name as type tag.
    #[must_use]
    pub fn from_actuator(
        descriptor: &ActuatorDescriptor,
        location: Option<LocationRef>,
        base_device_ids: &[String],
    ) -> Self {
        let kind = DeviceKind::classify_actuator(descriptor);
        let type_tag = match (kind, descriptor.css_class_name.as_deref()) {
            (DeviceKind::GenericActuator, Some(class)) => class.to_string(),
            _ => kind.traits().tag.to_string(),
        };
        let bounds = (kind == DeviceKind::Heating).then(|| SetPointBounds {
            min: descriptor.min_value,
            max: descriptor.max_value,
            step: descriptor.step,
        });

        Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
            display_name: display_name(&descriptor.name),
            location,
            kind,
            type_tag,
            value: kind.traits().parse(descriptor.current_value.as_ref()),
            last_update_metadata: None,
            bounds,
            base_device_ids: base_device_ids.to_vec(),
        }
    }

    /// Returns the device id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the device name as reported by the gateway.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the capitalized display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the location the device belongs to, if known.
    #[must_use]
    pub fn location(&self) -> Option<&LocationRef> {
        self.location.as_ref()
    }

    /// Returns the location id, if known.
    #[must_use]
    pub fn location_id(&self) -> Option<&str> {
        self.location.as_ref().map(|l| l.id.as_str())
    }

    /// Returns the device kind.
    #[must_use]
    pub fn kind(&self) -> DeviceKind {
        self.kind
    }

    /// Returns the type tag.
    #[must_use]
    pub fn type_tag(&self) -> &str {
        &self.type_tag
    }

    /// Returns the display unit.
    #[must_use]
    pub fn unit(&self) -> Option<&'static str> {
        self.kind.traits().unit
    }

    /// Returns the value type.
    #[must_use]
    pub fn value_type(&self) -> ValueType {
        self.kind.traits().value_type
    }

    /// Returns the current normalized value.
    #[must_use]
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Returns the value rendered the way this kind displays it.
    #[must_use]
    pub fn display_value(&self) -> String {
        self.kind.traits().display(&self.value)
    }

    /// Returns `true` while no value has been received.
    #[must_use]
    pub fn is_unresolved(&self) -> bool {
        self.value.is_unresolved()
    }

    /// Returns the metadata of the last applied update.
    #[must_use]
    pub fn last_update_metadata(&self) -> Option<&serde_json::Value> {
        self.last_update_metadata.as_ref()
    }

    /// Returns the set-point bounds of heating actuators.
    #[must_use]
    pub fn bounds(&self) -> Option<SetPointBounds> {
        self.bounds
    }

    /// Returns the physical devices carrying this logical device.
    #[must_use]
    pub fn base_device_ids(&self) -> &[String] {
        &self.base_device_ids
    }

    /// Returns `true` for sensors.
    #[must_use]
    pub fn is_sensor(&self) -> bool {
        self.kind.is_sensor()
    }

    /// Returns `true` for actuators.
    #[must_use]
    pub fn is_actuator(&self) -> bool {
        self.kind.is_actuator()
    }

    /// Returns `Some(true)` if a window sensor reports open.
    ///
    /// Returns `None` for other kinds and unresolved values.
    #[must_use]
    pub fn is_open(&self) -> Option<bool> {
        if self.kind == DeviceKind::WindowSensor {
            self.value.as_bool()
        } else {
            None
        }
    }

    /// Returns `Some(true)` if a window sensor reports closed.
    #[must_use]
    pub fn is_closed(&self) -> Option<bool> {
        self.is_open().map(|open| !open)
    }

    /// Returns the toggled value of a boolean actuator.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::NotToggleable` for non-boolean kinds and
    /// `ValueError::Unresolved` while the current value is unknown.
    pub fn toggled_value(&self) -> Result<Value, ValueError> {
        if self.value_type() != ValueType::Boolean {
            return Err(ValueError::NotToggleable(self.to_string()));
        }
        self.value
            .as_bool()
            .map(|on| Value::from(!on))
            .ok_or_else(|| ValueError::Unresolved(self.to_string()))
    }

    /// Checks whether `value` may be written to this device.
    ///
    /// # Errors
    ///
    /// Returns `ValueError` if the device is a sensor, if the value is
    /// unresolved or not finite, or if a set-point is outside the
    /// advertised bounds.
    pub fn check_writable(&self, value: &Value) -> Result<(), ValueError> {
        if !self.is_actuator() {
            return Err(ValueError::NotAnActuator(self.to_string()));
        }
        if value.is_unresolved() {
            return Err(ValueError::Unresolved(self.to_string()));
        }
        if value.as_f64().is_some_and(|n| !n.is_finite()) {
            return Err(ValueError::NotFinite(self.to_string()));
        }
        if let (Some(bounds), Some(n)) = (self.bounds, value.as_f64()) {
            bounds.check(n)?;
        }
        Ok(())
    }

    /// Stores a new value and returns the previous one if it changed.
    pub(crate) fn apply(
        &mut self,
        value: Value,
        metadata: Option<serde_json::Value>,
    ) -> Option<Value> {
        self.last_update_metadata = metadata;
        if value == self.value {
            return None;
        }
        Some(std::mem::replace(&mut self.value, value))
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(
                f,
                "{}[{}@{}]",
                self.kind.name(),
                self.display_name,
                location.display_name
            ),
            None => write!(f, "{}[{}]", self.kind.name(), self.display_name),
        }
    }
}

/// A location grouping sensors and actuators.
///
/// Locations reference devices by id; the registry owns the devices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    id: String,
    name: String,
    display_name: String,
    sensor_ids: Vec<String>,
    actuator_ids: Vec<String>,
}

impl Location {
    /// Creates an empty location.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            display_name: display_name(&name),
            name,
            sensor_ids: Vec::new(),
            actuator_ids: Vec::new(),
        }
    }

    /// Returns the location id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the location name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the capitalized display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the ids of the sensors in this location.
    #[must_use]
    pub fn sensor_ids(&self) -> &[String] {
        &self.sensor_ids
    }

    /// Returns the ids of the actuators in this location.
    #[must_use]
    pub fn actuator_ids(&self) -> &[String] {
        &self.actuator_ids
    }

    pub(crate) fn reference(&self) -> LocationRef {
        LocationRef {
            id: self.id.clone(),
            display_name: self.display_name.clone(),
        }
    }

    pub(crate) fn add_device(&mut self, device: &Device) {
        if device.is_sensor() {
            self.sensor_ids.push(device.id.clone());
        } else {
            self.actuator_ids.push(device.id.clone());
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Location[{}]", self.display_name)
    }
}
