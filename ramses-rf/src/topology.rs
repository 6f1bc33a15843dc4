//! The arena of devices and systems observed on the network: entities are
//! addressed by [`DeviceId`], never by pointer or `Rc` (spec.md §9 design
//! note), grounded on `ramses_rf/entity_base.py`'s `Parent`/`Child` mixins.

use std::collections::HashMap;

use ramses_tx::DeviceId;

use crate::device::{classify, Device};
use crate::system::{System, SystemCapabilities};

#[derive(Default)]
pub struct Topology {
    devices: HashMap<DeviceId, Device>,
    systems: HashMap<DeviceId, System>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a device, creating (and classifying) it on first sight.
    pub fn device_mut(&mut self, id: &DeviceId) -> &mut Device {
        self.devices.entry(id.clone()).or_insert_with(|| classify(id))
    }

    pub fn device(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    /// Attach `child` to `parent`, recording the relationship on the child
    /// only (the parent's child set is derived via [`children_of`]). Fails
    /// if `child` already has a different parent bound.
    pub fn bind_parent(&mut self, child: &DeviceId, parent: &DeviceId) -> crate::Result<()> {
        self.device_mut(child).set_parent(parent.clone())?;
        self.device_mut(parent); // ensure the parent is at least known
        Ok(())
    }

    pub fn children_of<'a>(&'a self, parent: &'a DeviceId) -> impl Iterator<Item = &'a Device> {
        self.devices.values().filter(move |d| d.parent() == Some(parent))
    }

    pub fn system_mut(&mut self, controller: &DeviceId, capabilities: SystemCapabilities) -> &mut System {
        self.systems
            .entry(controller.clone())
            .or_insert_with(|| System::new(controller.clone(), capabilities))
    }

    pub fn system(&self, controller: &DeviceId) -> Option<&System> {
        self.systems.get(controller)
    }

    pub fn systems(&self) -> impl Iterator<Item = &System> {
        self.systems.values()
    }

    /// If `controller` already has a registered system, ensure zone `idx`
    /// exists on it (spec.md's eavesdropped zone-traffic inference: a known
    /// system gains zones it's observed reporting on, without a schema entry
    /// for each one). A no-op for a controller with no system yet.
    pub fn note_zone_traffic(&mut self, controller: &DeviceId, idx: u8) {
        if let Some(system) = self.systems.get_mut(controller) {
            system.zone_mut(idx);
        }
    }

    /// The system that owns `device`, found by walking the parent chain up
    /// to a registered controller.
    pub fn system_for_device(&self, device: &DeviceId) -> Option<&System> {
        if self.systems.contains_key(device) {
            return self.systems.get(device);
        }
        let mut current = self.devices.get(device)?.parent()?.clone();
        for _ in 0..8 {
            if let Some(system) = self.systems.get(&current) {
                return Some(system);
            }
            current = self.devices.get(&current)?.parent()?.clone();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creating_a_device_classifies_it() {
        let mut topo = Topology::new();
        let id = DeviceId::parse("01:145038").unwrap();
        let device = topo.device_mut(&id);
        assert!(matches!(device, Device::Controller(_)));
    }

    #[test]
    fn walks_the_parent_chain_to_find_the_owning_system() {
        let mut topo = Topology::new();
        let controller = DeviceId::parse("01:145038").unwrap();
        let sensor = DeviceId::parse("03:111111").unwrap();
        topo.system_mut(&controller, SystemCapabilities { multi_zone: true, ..Default::default() });
        topo.bind_parent(&sensor, &controller).unwrap();
        let system = topo.system_for_device(&sensor);
        assert!(system.is_some());
        assert_eq!(system.unwrap().controller, controller);
    }

    #[test]
    fn rebinding_a_device_to_a_different_parent_is_rejected() {
        let mut topo = Topology::new();
        let sensor = DeviceId::parse("03:111111").unwrap();
        let first = DeviceId::parse("01:145038").unwrap();
        let second = DeviceId::parse("01:999999").unwrap();
        topo.bind_parent(&sensor, &first).unwrap();
        let err = topo.bind_parent(&sensor, &second).unwrap_err();
        assert!(matches!(err, crate::Error::SchemaInconsistent(_)));
        assert_eq!(topo.device(&sensor).unwrap().parent(), Some(&first));
    }

    #[test]
    fn zone_traffic_is_ignored_for_a_controller_with_no_system() {
        let mut topo = Topology::new();
        let controller = DeviceId::parse("01:145038").unwrap();
        topo.note_zone_traffic(&controller, 0);
        assert!(topo.system(&controller).is_none());
    }

    #[test]
    fn zone_traffic_creates_the_zone_on_a_known_system() {
        let mut topo = Topology::new();
        let controller = DeviceId::parse("01:145038").unwrap();
        topo.system_mut(&controller, SystemCapabilities { multi_zone: true, ..Default::default() });
        topo.note_zone_traffic(&controller, 2);
        assert!(topo.system(&controller).unwrap().zones.contains_key(&2));
    }

    #[test]
    fn rebinding_a_device_to_the_same_parent_is_idempotent() {
        let mut topo = Topology::new();
        let sensor = DeviceId::parse("03:111111").unwrap();
        let parent = DeviceId::parse("01:145038").unwrap();
        topo.bind_parent(&sensor, &parent).unwrap();
        topo.bind_parent(&sensor, &parent).unwrap();
        assert_eq!(topo.device(&sensor).unwrap().parent(), Some(&parent));
    }
}
