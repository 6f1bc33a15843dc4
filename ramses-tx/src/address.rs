//! Device addressing: the `NN:NNNNNN` address grammar and its three reserved
//! values (spec.md §3, §6).

use std::fmt;

use crate::error::{Error, Result};

/// The sentinel the host uses before the serial transport's fingerprint probe
/// has resolved the gateway's own id (spec.md §4.6).
pub const HGI_SENTINEL: &str = "18:000730";

/// The "matches any device" placeholder (spec.md §4.1).
pub const NON_DEV: &str = "63:262142";

/// The broadcast / absent-address placeholder.
pub const BROADCAST: &str = "--:------";

/// A validated RAMSES-II device address, `class:number` (e.g. `01:145038`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId(String);

impl DeviceId {
    /// Parse and validate a `NN:NNNNNN` address, or the broadcast placeholder.
    pub fn parse(s: &str) -> Result<Self> {
        if s == BROADCAST {
            return Ok(DeviceId(s.to_string()));
        }
        let (class, num) = s.split_once(':').ok_or_else(|| {
            Error::AddressInvalid(format!("missing ':' in address {s:?}"))
        })?;
        if class.len() != 2 || !class.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::AddressInvalid(format!(
                "device class must be 2 digits: {s:?}"
            )));
        }
        if num.len() != 6 || !num.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::AddressInvalid(format!(
                "device number must be 6 digits: {s:?}"
            )));
        }
        Ok(DeviceId(s.to_string()))
    }

    pub fn broadcast() -> Self {
        DeviceId(BROADCAST.to_string())
    }

    pub fn hgi_sentinel() -> Self {
        DeviceId(HGI_SENTINEL.to_string())
    }

    pub fn non_dev() -> Self {
        DeviceId(NON_DEV.to_string())
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == BROADCAST
    }

    pub fn is_non_dev(&self) -> bool {
        self.0 == NON_DEV
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The two-digit device-class prefix, e.g. `"01"` for a controller.
    pub fn class(&self) -> &str {
        if self.is_broadcast() {
            "--"
        } else {
            &self.0[..2]
        }
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The device-class prefixes this crate has an opinion about (spec.md §3,
/// §4.7). A class not listed here still addresses and routes correctly;
/// it just carries no behavioural distinction in [`DeviceClass::of`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum DeviceClass {
    Controller,
    Programmer,
    ZoneSensor,
    TrvActuator,
    BdrActuator,
    UfhController,
    OpenThermBridge,
    Fan,
    FanRemote,
    FanSensor,
    Co2Sensor,
    HumiditySensor,
    Gateway,
    Other,
}

impl DeviceClass {
    /// Classify by the two-digit prefix, e.g. `"01"` -> [`DeviceClass::Controller`].
    pub fn of(id: &DeviceId) -> Self {
        match id.class() {
            "01" => DeviceClass::Controller,
            "23" => DeviceClass::Programmer,
            "03" | "34" => DeviceClass::ZoneSensor,
            "04" => DeviceClass::TrvActuator,
            "00" | "02" | "13" | "33" => DeviceClass::BdrActuator,
            "12" => DeviceClass::UfhController,
            "10" => DeviceClass::OpenThermBridge,
            "20" => DeviceClass::Fan,
            "29" => DeviceClass::FanRemote,
            "37" => DeviceClass::FanSensor,
            "31" => DeviceClass::Co2Sensor,
            "32" => DeviceClass::HumiditySensor,
            "18" => DeviceClass::Gateway,
            _ => DeviceClass::Other,
        }
    }
}

/// Whether a resolved address pair is a normal unicast exchange or a
/// self-addressed announcement (spec.md §3: `addr0 == addr2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    Unicast,
    SelfAnnounce,
}

/// Resolve the 3-address slot of a frame into `(sender, receiver, kind)`,
/// per spec.md §4.1.
pub fn parse_addresses(
    addr0: &DeviceId,
    addr1: &DeviceId,
    addr2: &DeviceId,
) -> Result<(DeviceId, DeviceId, AddressKind)> {
    let present: Vec<&DeviceId> = [addr0, addr1, addr2]
        .into_iter()
        .filter(|a| !a.is_broadcast())
        .collect();

    match present.len() {
        0 => Err(Error::AddressInvalid(
            "no non-placeholder address present".into(),
        )),
        1 => Ok((present[0].clone(), DeviceId::broadcast(), AddressKind::Unicast)),
        2 | 3 => {
            if addr0 == addr2 {
                Ok((addr0.clone(), addr0.clone(), AddressKind::SelfAnnounce))
            } else {
                Ok((addr0.clone(), addr1.clone(), AddressKind::Unicast))
            }
        }
        _ => unreachable!("at most 3 addresses"),
    }
}
