//! Heating-side device classes: controller, zone sensor, zone actuator, and
//! the OpenTherm bridge (spec.md §3).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ramses_tx::DeviceId;

#[derive(Debug, Clone)]
pub struct ControllerDevice {
    pub id: DeviceId,
    pub parent: Option<DeviceId>,
    pub last_seen: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct SensorDevice {
    pub id: DeviceId,
    pub parent: Option<DeviceId>,
    pub last_seen: Option<DateTime<Utc>>,
    pub zone_idx: Option<u8>,
    pub temperature_c: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ActuatorDevice {
    pub id: DeviceId,
    pub parent: Option<DeviceId>,
    pub last_seen: Option<DateTime<Utc>>,
    pub zone_idx: Option<u8>,
    pub heat_demand_pct: Option<u8>,
}

/// An OpenTherm bridge, caching the most recent value for each data-id it
/// has reported (spec.md's supplemented OpenTherm data-id classification).
#[derive(Debug, Clone)]
pub struct OtbDevice {
    pub id: DeviceId,
    pub parent: Option<DeviceId>,
    pub last_seen: Option<DateTime<Utc>>,
    pub params: HashMap<u8, String>,
}

impl OtbDevice {
    pub fn record_msg(&mut self, msg_id: u8, raw: String) {
        self.params.insert(msg_id, raw);
    }
}
