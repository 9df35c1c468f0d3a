// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed registry of devices and locations.
//!
//! The [`Registry`] is built once from a [`Topology`] and afterwards only
//! mutated by value updates. Lookups accept an id, an exact name or a
//! case-insensitive name fragment, tried in that order:
//!
//! ```
//! use std::time::Duration;
//! use smarthome_lp::registry::Registry;
//! use smarthome_lp::topology::{LocationDescriptor, SensorDescriptor, Topology};
//!
//! let sensor: SensorDescriptor = serde_json::from_str(
//!     r#"{"Id":"s1","Name":"Temperatur Bad","DeviceType":"Rst","Value":"21,5°"}"#,
//! ).unwrap();
//! let topology = Topology::new("sid", Duration::from_secs(30))
//!     .with_location(LocationDescriptor::new("l1", "Bad"))
//!     .with_sensor(sensor);
//!
//! let registry = Registry::from_topology(&topology).unwrap();
//! assert_eq!(registry.sensor("s1").unwrap().name(), "Temperatur Bad");
//! assert_eq!(registry.sensor("temperatur").unwrap().id(), "s1");
//! ```

mod device;

pub use device::{Device, Location, LocationRef, SetPointBounds};

use std::collections::HashMap;
use std::collections::hash_map::Entry;

use crate::error::{DataError, TopologyError};
use crate::event::DeviceChange;
use crate::topology::Topology;
use crate::types::{DeviceKind, Value};

/// Items that can be looked up by id or name.
pub trait Named {
    /// Returns the unique id.
    fn id(&self) -> &str;
    /// Returns the name.
    fn name(&self) -> &str;
}

impl Named for Device {
    fn id(&self) -> &str {
        Device::id(self)
    }

    fn name(&self) -> &str {
        Device::name(self)
    }
}

impl Named for Location {
    fn id(&self) -> &str {
        Location::id(self)
    }

    fn name(&self) -> &str {
        Location::name(self)
    }
}

/// Finds the first item matching `key` by exact id, then by exact name,
/// then by case-insensitive name fragment.
///
/// An empty key matches nothing.
pub fn lookup<'a, T, I>(items: I, key: &str) -> Option<&'a T>
where
    T: Named + 'a,
    I: IntoIterator<Item = &'a T>,
    I::IntoIter: Clone,
{
    if key.is_empty() {
        return None;
    }
    let items = items.into_iter();
    if let Some(found) = items.clone().find(|item| item.id() == key) {
        return Some(found);
    }
    if let Some(found) = items.clone().find(|item| item.name() == key) {
        return Some(found);
    }
    let needle = key.to_lowercase();
    items
        .into_iter()
        .find(|item| item.name().to_lowercase().contains(&needle))
}

/// Registry of all devices and locations of one session.
///
/// Devices are owned here; locations reference them by id. Sensors come
/// before actuators, in descriptor order.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    devices: Vec<Device>,
    index: HashMap<String, usize>,
    locations: Vec<Location>,
    base_devices: HashMap<String, Vec<String>>,
    sealed: bool,
}

impl Registry {
    /// Builds a registry from a topology snapshot.
    ///
    /// Devices referencing a location that is not in the topology are kept
    /// without location.
    ///
    /// # Errors
    ///
    /// Returns `TopologyError::DuplicateDevice` if two descriptors share an id.
    pub fn from_topology(topology: &Topology) -> Result<Self, TopologyError> {
        let mut registry = Self {
            locations: topology
                .locations
                .iter()
                .map(|l| Location::new(l.id.clone(), l.name.clone()))
                .collect(),
            ..Self::default()
        };

        for descriptor in &topology.sensors {
            let location = descriptor
                .location_id
                .as_deref()
                .and_then(|id| registry.location_reference(id));
            registry.insert(Device::from_sensor(descriptor, location))?;
        }

        for group in &topology.actuator_groups {
            let location = registry.location_reference(&group.location_id);
            for descriptor in &group.actuators {
                registry.insert(Device::from_actuator(
                    descriptor,
                    location.clone(),
                    &group.base_device_ids,
                ))?;
            }
        }

        Ok(registry)
    }

    fn location_reference(&self, id: &str) -> Option<LocationRef> {
        let location = self.locations.iter().find(|l| l.id() == id);
        if location.is_none() {
            tracing::warn!(location_id = %id, "Descriptor references unknown location");
        }
        location.map(Location::reference)
    }

    fn insert(&mut self, device: Device) -> Result<(), TopologyError> {
        match self.index.entry(device.id().to_string()) {
            Entry::Occupied(_) => {
                return Err(TopologyError::DuplicateDevice(device.id().to_string()));
            }
            Entry::Vacant(slot) => {
                slot.insert(self.devices.len());
            }
        }

        if let Some(location_id) = device.location_id()
            && let Some(location) = self.locations.iter_mut().find(|l| l.id() == location_id)
        {
            location.add_device(&device);
        }

        for base in device.base_device_ids() {
            self.base_devices
                .entry(base.clone())
                .or_default()
                .push(device.id().to_string());
        }

        if device.is_unresolved() {
            tracing::info!(device = %device, "Found device (requesting value)");
        } else {
            tracing::info!(device = %device, value = %device.display_value(), "Found device");
        }

        self.devices.push(device);
        Ok(())
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Returns all devices, sensors first.
    #[must_use]
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Returns all sensors.
    pub fn sensors(&self) -> impl Iterator<Item = &Device> + Clone {
        self.devices.iter().filter(|d| d.is_sensor())
    }

    /// Returns all actuators.
    pub fn actuators(&self) -> impl Iterator<Item = &Device> + Clone {
        self.devices.iter().filter(|d| d.is_actuator())
    }

    /// Returns all locations.
    #[must_use]
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Returns the ids of devices whose value is still unresolved.
    #[must_use]
    pub fn unresolved_ids(&self) -> Vec<String> {
        self.devices
            .iter()
            .filter(|d| d.is_unresolved())
            .map(|d| d.id().to_string())
            .collect()
    }

    /// Returns the logical devices carried by a physical base device.
    #[must_use]
    pub fn devices_for_base_device(&self, base_device_id: &str) -> Vec<&Device> {
        self.base_devices
            .get(base_device_id)
            .map(|ids| ids.iter().filter_map(|id| self.device_by_id(id)).collect())
            .unwrap_or_default()
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Returns the device with exactly this id.
    #[must_use]
    pub fn device_by_id(&self, id: &str) -> Option<&Device> {
        self.index.get(id).map(|&i| &self.devices[i])
    }

    /// Looks up a sensor by id, name or name fragment.
    #[must_use]
    pub fn sensor(&self, key: &str) -> Option<&Device> {
        lookup(self.sensors(), key)
    }

    /// Looks up an actuator by id, name or name fragment.
    #[must_use]
    pub fn actuator(&self, key: &str) -> Option<&Device> {
        lookup(self.actuators(), key)
    }

    /// Looks up any device by id, name or name fragment.
    #[must_use]
    pub fn device(&self, key: &str) -> Option<&Device> {
        lookup(&self.devices, key)
    }

    /// Looks up a location by id, name or name fragment.
    #[must_use]
    pub fn location(&self, key: &str) -> Option<&Location> {
        lookup(&self.locations, key)
    }

    /// Returns the devices placed in a location.
    #[must_use]
    pub fn location_devices(&self, location: &Location) -> Vec<&Device> {
        location
            .sensor_ids()
            .iter()
            .chain(location.actuator_ids())
            .filter_map(|id| self.device_by_id(id))
            .collect()
    }

    /// Looks up a sensor within a location.
    #[must_use]
    pub fn location_sensor(&self, location_key: &str, key: &str) -> Option<&Device> {
        let location = self.location(location_key)?;
        let sensors = self.location_devices(location);
        lookup(sensors.into_iter().filter(|d| d.is_sensor()), key)
    }

    /// Looks up an actuator within a location.
    #[must_use]
    pub fn location_actuator(&self, location_key: &str, key: &str) -> Option<&Device> {
        let location = self.location(location_key)?;
        let actuators = self.location_devices(location);
        lookup(actuators.into_iter().filter(|d| d.is_actuator()), key)
    }

    /// Looks up any device within a location.
    #[must_use]
    pub fn location_device(&self, location_key: &str, key: &str) -> Option<&Device> {
        let location = self.location(location_key)?;
        lookup(self.location_devices(location), key)
    }

    /// Returns the reading of the first temperature sensor in a location.
    #[must_use]
    pub fn location_temperature(&self, location_key: &str) -> Option<f64> {
        let location = self.location(location_key)?;
        self.location_devices(location)
            .into_iter()
            .find(|d| d.kind() == DeviceKind::TemperatureSensor)
            .and_then(|d| d.value().as_f64())
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Applies a normalized value to the device with this id.
    ///
    /// Returns the change if the value differs from the stored one. A sealed
    /// registry ignores updates.
    ///
    /// # Errors
    ///
    /// Returns `DataError::UnknownDevice` if no device has this id.
    pub fn apply(
        &mut self,
        id: &str,
        value: Value,
        metadata: Option<serde_json::Value>,
    ) -> Result<Option<DeviceChange>, DataError> {
        let index = *self
            .index
            .get(id)
            .ok_or_else(|| DataError::UnknownDevice(id.to_string()))?;

        if self.sealed {
            tracing::debug!(device_id = %id, "Ignoring update on sealed registry");
            return Ok(None);
        }

        let device = &mut self.devices[index];
        Ok(device.apply(value, metadata).map(|old_value| DeviceChange {
            device: device.clone(),
            old_value,
        }))
    }

    /// Parses a raw wire value with the device's kind and applies it.
    ///
    /// # Errors
    ///
    /// Returns `DataError::UnknownDevice` if no device has this id.
    pub fn apply_raw(
        &mut self,
        id: &str,
        raw: Option<&serde_json::Value>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Option<DeviceChange>, DataError> {
        let value = self
            .device_by_id(id)
            .map(|device| device.kind().traits().parse(raw))
            .ok_or_else(|| DataError::UnknownDevice(id.to_string()))?;
        self.apply(id, value, metadata)
    }

    /// Freezes the registry; further updates are ignored.
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Returns `true` once the registry has been sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }
}
