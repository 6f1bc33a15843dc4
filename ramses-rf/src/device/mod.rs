//! Device topology: a tagged-variant replacement for the original's
//! mixin-composed device classes (spec.md §9 design note), grounded on
//! `ramses_rf/device/*.py`'s class hierarchy.

mod factory;
mod heat;
mod hvac;

pub use factory::classify;
pub use heat::{ActuatorDevice, ControllerDevice, OtbDevice, SensorDevice};
pub use hvac::HvacDevice;

use chrono::{DateTime, Utc};
use ramses_tx::DeviceId;

/// The device classes this crate distinguishes behaviourally. Everything
/// else indexes and routes normally but carries no class-specific state.
#[derive(Debug, Clone)]
pub enum Device {
    Controller(ControllerDevice),
    Sensor(SensorDevice),
    Actuator(ActuatorDevice),
    OpenThermBridge(OtbDevice),
    Hvac(HvacDevice),
    Gateway(GenericDevice),
    Generic(GenericDevice),
}

#[derive(Debug, Clone)]
pub struct GenericDevice {
    pub id: DeviceId,
    pub parent: Option<DeviceId>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl Device {
    pub fn id(&self) -> &DeviceId {
        match self {
            Device::Controller(d) => &d.id,
            Device::Sensor(d) => &d.id,
            Device::Actuator(d) => &d.id,
            Device::OpenThermBridge(d) => &d.id,
            Device::Hvac(d) => &d.id,
            Device::Gateway(d) | Device::Generic(d) => &d.id,
        }
    }

    pub fn parent(&self) -> Option<&DeviceId> {
        match self {
            Device::Controller(d) => d.parent.as_ref(),
            Device::Sensor(d) => d.parent.as_ref(),
            Device::Actuator(d) => d.parent.as_ref(),
            Device::OpenThermBridge(d) => d.parent.as_ref(),
            Device::Hvac(d) => d.parent.as_ref(),
            Device::Gateway(d) | Device::Generic(d) => d.parent.as_ref(),
        }
    }

    /// Bind `parent` to this device. Refuses to silently reparent a device
    /// that already has a different parent set — the caller is presumed to
    /// be responding to a fresh `1FC9` bind, not correcting a mistake.
    pub fn set_parent(&mut self, parent: DeviceId) -> crate::Result<()> {
        let slot = match self {
            Device::Controller(d) => &mut d.parent,
            Device::Sensor(d) => &mut d.parent,
            Device::Actuator(d) => &mut d.parent,
            Device::OpenThermBridge(d) => &mut d.parent,
            Device::Hvac(d) => &mut d.parent,
            Device::Gateway(d) | Device::Generic(d) => &mut d.parent,
        };
        match slot {
            Some(existing) if *existing != parent => {
                return Err(crate::Error::SchemaInconsistent(format!(
                    "device already has parent {existing}, refusing to reparent to {parent}"
                )));
            }
            _ => {
                *slot = Some(parent);
                Ok(())
            }
        }
    }

    pub fn note_seen(&mut self, at: DateTime<Utc>) {
        let slot = match self {
            Device::Controller(d) => &mut d.last_seen,
            Device::Sensor(d) => &mut d.last_seen,
            Device::Actuator(d) => &mut d.last_seen,
            Device::OpenThermBridge(d) => &mut d.last_seen,
            Device::Hvac(d) => &mut d.last_seen,
            Device::Gateway(d) | Device::Generic(d) => &mut d.last_seen,
        };
        *slot = Some(at);
    }

    pub fn last_seen(&self) -> Option<DateTime<Utc>> {
        match self {
            Device::Controller(d) => d.last_seen,
            Device::Sensor(d) => d.last_seen,
            Device::Actuator(d) => d.last_seen,
            Device::OpenThermBridge(d) => d.last_seen,
            Device::Hvac(d) => d.last_seen,
            Device::Gateway(d) | Device::Generic(d) => d.last_seen,
        }
    }
}
