//! Ventilation-side device class: fans and their remotes (spec.md §3, §4.7).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ramses_tx::DeviceId;

#[derive(Debug, Clone)]
pub struct HvacDevice {
    pub id: DeviceId,
    pub parent: Option<DeviceId>,
    pub last_seen: Option<DateTime<Utc>>,
    /// Cached `2411` parameter values, keyed `"2411_<param_id>"` (spec.md
    /// §4.7).
    pub fan_params: HashMap<String, u16>,
    pub is_remote: bool,
    /// REM/DIS remotes bound to this fan, and whether each has confirmed
    /// `2411` support by actually replying to a parameter request rather
    /// than just appearing in a `1FC9` bind exchange (spec.md §4.7).
    pub bound_devices: HashMap<DeviceId, bool>,
}

/// The `2411`-parameter cache key for `param_id` (spec.md §4.7).
pub fn fan_param_key(param_id: u8) -> String {
    format!("2411_{param_id:02X}")
}

impl HvacDevice {
    pub fn set_fan_param(&mut self, param_id: u8, value: u16) {
        self.fan_params.insert(fan_param_key(param_id), value);
    }

    pub fn fan_param(&self, param_id: u8) -> Option<u16> {
        self.fan_params.get(&fan_param_key(param_id)).copied()
    }

    /// Record a bound REM/DIS remote, not yet confirmed to support `2411`.
    pub fn add_bound_device(&mut self, remote: DeviceId) {
        self.bound_devices.entry(remote).or_insert(false);
    }

    pub fn remove_bound_device(&mut self, remote: &DeviceId) {
        self.bound_devices.remove(remote);
    }

    /// Mark `remote` as having confirmed `2411` support.
    pub fn confirm_2411_support(&mut self, remote: &DeviceId) {
        if let Some(confirmed) = self.bound_devices.get_mut(remote) {
            *confirmed = true;
        }
    }

    /// Bound remotes confirmed to support `2411`.
    pub fn get_bound_rem(&self) -> Vec<&DeviceId> {
        self.bound_devices
            .iter()
            .filter(|(_, &confirmed)| confirmed)
            .map(|(id, _)| id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(s: &str) -> DeviceId {
        DeviceId::parse(s).unwrap()
    }

    fn fan() -> HvacDevice {
        HvacDevice {
            id: dev("20:111111"),
            parent: None,
            last_seen: None,
            fan_params: HashMap::new(),
            is_remote: false,
            bound_devices: HashMap::new(),
        }
    }

    #[test]
    fn fan_params_round_trip_through_the_composite_key() {
        let mut f = fan();
        f.set_fan_param(0x75, 0x0866);
        assert_eq!(f.fan_param(0x75), Some(0x0866));
        assert!(f.fan_params.contains_key("2411_75"));
    }

    #[test]
    fn bound_remotes_only_count_once_confirmed() {
        let mut f = fan();
        let rem = dev("29:222222");
        f.add_bound_device(rem.clone());
        assert!(f.get_bound_rem().is_empty());

        f.confirm_2411_support(&rem);
        assert_eq!(f.get_bound_rem(), vec![&rem]);

        f.remove_bound_device(&rem);
        assert!(f.get_bound_rem().is_empty());
    }
}
