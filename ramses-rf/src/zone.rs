//! Zone and DHW-zone state (spec.md §3), grounded on `ramses_rf/zones.py`.

use ramses_tx::{DeviceId, HeatingMode};

/// How a zone delivers heat, inferred from its bound actuator's device
/// class (spec.md §3). Defaults to [`ZoneClass::Radiator`] until an
/// actuator narrows it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneClass {
    Radiator,
    Underfloor,
    Electric,
    Mixing,
    ZoneValve,
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub idx: u8,
    pub name: Option<String>,
    pub class: ZoneClass,
    pub sensor: Option<DeviceId>,
    pub actuators: Vec<DeviceId>,
    pub mode: Option<u8>,
    pub setpoint_c: Option<f32>,
    pub temperature_c: Option<f32>,
    pub min_c: f32,
    pub max_c: f32,
}

impl Zone {
    pub fn new(idx: u8) -> Self {
        Zone {
            idx,
            name: None,
            class: ZoneClass::Radiator,
            sensor: None,
            actuators: Vec::new(),
            mode: None,
            setpoint_c: None,
            temperature_c: None,
            min_c: 5.0,
            max_c: 35.0,
        }
    }

    pub fn bind_actuator(&mut self, id: DeviceId) {
        if !self.actuators.contains(&id) {
            self.actuators.push(id);
        }
    }
}

#[derive(Debug, Clone)]
pub struct DhwZone {
    pub sensor: Option<DeviceId>,
    pub setpoint_c: Option<f32>,
    pub temperature_c: Option<f32>,
    pub active: bool,
    pub overrun_min: u8,
    /// The cylinder's heating valve/relay, once bound.
    pub heating_valve: Option<DeviceId>,
    /// `10A0`'s reheat differential, in °C.
    pub differential: Option<f32>,
    pub mode: Option<HeatingMode>,
}

impl Default for DhwZone {
    fn default() -> Self {
        DhwZone {
            sensor: None,
            setpoint_c: None,
            temperature_c: None,
            active: false,
            overrun_min: 0,
            heating_valve: None,
            differential: None,
            mode: None,
        }
    }
}
