//! Builds a [`Device`](super::Device) from a bare id, classifying it by its
//! two-digit device-class prefix (spec.md §3, grounded on
//! `ramses_rf/device/*.py`'s per-class `SLUG`/`_SLUG` registration).

use std::collections::HashMap;

use ramses_tx::DeviceId;

use super::{ActuatorDevice, ControllerDevice, Device, GenericDevice, HvacDevice, OtbDevice, SensorDevice};

/// Classify a device by its class prefix. Unrecognised or ambiguous
/// classes fall back to [`Device::Generic`]; eavesdropping (when enabled)
/// can refine this later from observed traffic.
pub fn classify(id: &DeviceId) -> Device {
    let base = GenericDevice { id: id.clone(), parent: None, last_seen: None };
    match id.class() {
        "01" | "23" => Device::Controller(ControllerDevice {
            id: base.id,
            parent: base.parent,
            last_seen: base.last_seen,
        }),
        "03" | "04" | "34" => Device::Sensor(SensorDevice {
            id: base.id,
            parent: base.parent,
            last_seen: base.last_seen,
            zone_idx: None,
            temperature_c: None,
        }),
        "02" | "13" | "33" => Device::Actuator(ActuatorDevice {
            id: base.id,
            parent: base.parent,
            last_seen: base.last_seen,
            zone_idx: None,
            heat_demand_pct: None,
        }),
        "10" => Device::OpenThermBridge(OtbDevice {
            id: base.id,
            parent: base.parent,
            last_seen: base.last_seen,
            params: HashMap::new(),
        }),
        "20" | "29" | "37" => Device::Hvac(HvacDevice {
            id: base.id,
            parent: base.parent,
            last_seen: base.last_seen,
            fan_params: HashMap::new(),
            is_remote: id.class() == "29",
            bound_devices: HashMap::new(),
        }),
        "18" => Device::Gateway(base),
        _ => Device::Generic(base),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_a_controller() {
        let d = classify(&DeviceId::parse("01:145038").unwrap());
        assert!(matches!(d, Device::Controller(_)));
    }

    #[test]
    fn classifies_an_opentherm_bridge() {
        let d = classify(&DeviceId::parse("10:048122").unwrap());
        assert!(matches!(d, Device::OpenThermBridge(_)));
    }

    #[test]
    fn falls_back_to_generic_for_unrecognized_classes() {
        let d = classify(&DeviceId::parse("99:000001").unwrap());
        assert!(matches!(d, Device::Generic(_)));
    }
}
