//! A heating system (a controller and everything bound to it): capability
//! flags replace the original's `MultiZone`/`StoredHw`/`ScheduleSync`/
//! `Logbook`/`UfHeating` mixins (spec.md §9 design note), grounded on
//! `ramses_rf/systems.py`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use ramses_tx::DeviceId;

use crate::zone::{DhwZone, Zone};

/// Which optional behaviours this system supports. Set once, from the
/// controller's class, at system-creation time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCapabilities {
    pub multi_zone: bool,
    pub stored_hw: bool,
    pub schedule_sync: bool,
    pub logbook: bool,
    pub uf_heating: bool,
}

/// Whether a fault-log entry records a fault coming on or going away
/// (`typing.py::FaultState`, the `0418` payload's second byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultState {
    Fault,
    Restore,
    Unknown(u8),
}

impl FaultState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0x00 => FaultState::Fault,
            0x40 => FaultState::Restore,
            other => FaultState::Unknown(other),
        }
    }
}

/// What kind of condition a fault-log entry records (`typing.py::FaultType`,
/// the `0418` payload's fifth byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultType {
    System,
    Actuator,
    Sensor,
    BatteryLow,
    CommsFault,
    Unknown(u8),
}

impl FaultType {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0x00 => FaultType::System,
            0x01 => FaultType::Actuator,
            0x02 => FaultType::Sensor,
            0x04 => FaultType::BatteryLow,
            0x06 => FaultType::CommsFault,
            other => FaultType::Unknown(other),
        }
    }
}

/// The class of device a fault-log entry is attributed to (`typing.py::
/// FaultDeviceClass`, the `0418` payload's seventh byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultDeviceClass {
    Controller,
    Sensor,
    Actuator,
    DhwSensor,
    Unknown(u8),
}

impl FaultDeviceClass {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0x00 => FaultDeviceClass::Controller,
            0x01 => FaultDeviceClass::Sensor,
            0x02 => FaultDeviceClass::Actuator,
            0x03 => FaultDeviceClass::DhwSensor,
            other => FaultDeviceClass::Unknown(other),
        }
    }
}

/// One entry in the fault log (spec.md's supplemented fault-log feature,
/// grounded on `typing.py::FaultLogEntry` and the `0418` payload built by
/// `command.py::_put_system_log_entry`:
/// `00 <fault_state> <log_idx> B0 <fault_type> <domain_idx> <device_class>
/// 0000 <timestamp> FFFF7000 <device_id>`).
#[derive(Debug, Clone)]
pub struct FaultLogEntry {
    pub log_idx: u8,
    pub fault_state: FaultState,
    pub fault_type: FaultType,
    pub domain_idx: u8,
    pub device_class: FaultDeviceClass,
    /// The raw 3-byte hex device id from the payload's tail, or `None` for
    /// the `000000` "no device" sentinel. The `0418` wire format doesn't
    /// carry a human-readable class prefix, so this isn't resolved to a
    /// full [`DeviceId`](ramses_tx::DeviceId) here.
    pub device_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub raw: String,
}

impl FaultLogEntry {
    /// Parse an `0418` payload built as `00 <fault_state> <log_idx> B0
    /// <fault_type> <domain_idx> <device_class> 0000 <timestamp> FFFF7000
    /// <device_id>` — bytes 0..1..2..3..4..5..6..7-8..9-15..16-19..20-22.
    /// Falls back to a bare `raw`-only entry (`log_idx` from the header
    /// context) when the payload is shorter than expected, e.g. for
    /// `FaultLogEntryNull`'s empty-slot marker.
    pub fn from_payload(log_idx: u8, raw: &str) -> Self {
        let byte = |idx: usize| ramses_tx::payload::hex_byte(raw, idx).ok();
        let timestamp = ramses_tx::payload::decode_datetime(raw, 9).ok();
        let device_id = raw.get(40..46).filter(|hex| *hex != "000000").map(|hex| hex.to_string());

        FaultLogEntry {
            log_idx,
            fault_state: byte(1).map(FaultState::from_u8).unwrap_or(FaultState::Unknown(0)),
            fault_type: byte(4).map(FaultType::from_u8).unwrap_or(FaultType::Unknown(0)),
            domain_idx: byte(5).unwrap_or(0),
            device_class: byte(6).map(FaultDeviceClass::from_u8).unwrap_or(FaultDeviceClass::Unknown(0)),
            device_id,
            timestamp,
            raw: raw.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct System {
    pub controller: DeviceId,
    pub capabilities: SystemCapabilities,
    pub zones: HashMap<u8, Zone>,
    pub dhw: Option<DhwZone>,
    pub mode: Option<u8>,
    pub language: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
    fault_log: Vec<FaultLogEntry>,
}

impl System {
    pub fn new(controller: DeviceId, capabilities: SystemCapabilities) -> Self {
        System {
            controller,
            capabilities,
            zones: HashMap::new(),
            dhw: if capabilities.stored_hw { Some(DhwZone::default()) } else { None },
            mode: None,
            language: None,
            last_sync: None,
            fault_log: Vec::new(),
        }
    }

    pub fn zone_mut(&mut self, idx: u8) -> Option<&mut Zone> {
        if !self.capabilities.multi_zone && idx != 0 {
            return None;
        }
        Some(self.zones.entry(idx).or_insert_with(|| Zone::new(idx)))
    }

    /// Append a fault-log entry. No-op when this system doesn't carry a
    /// logbook (spec.md §9: capability check replaces the mixin's `hasattr`).
    pub fn record_fault(&mut self, entry: FaultLogEntry) {
        if !self.capabilities.logbook {
            return;
        }
        if let Some(existing) = self.fault_log.iter_mut().find(|e| e.log_idx == entry.log_idx) {
            *existing = entry;
        } else {
            self.fault_log.push(entry);
        }
    }

    pub fn fault_log(&self) -> Option<&[FaultLogEntry]> {
        self.capabilities.logbook.then_some(self.fault_log.as_slice())
    }

    /// The most recent log entry, fault or restore (`log_idx == 0` is
    /// always the newest per `get_system_log_entry`'s indexing).
    pub fn latest_event(&self) -> Option<&FaultLogEntry> {
        self.fault_log().and_then(|log| log.iter().find(|e| e.log_idx == 0))
    }

    /// The most recent entry that is itself a fault, skipping any restores
    /// ahead of it in the log.
    pub fn latest_fault(&self) -> Option<&FaultLogEntry> {
        self.fault_log()?
            .iter()
            .filter(|e| e.fault_state == FaultState::Fault)
            .min_by_key(|e| e.log_idx)
    }

    /// Whether the most recent log entry is an unresolved fault (no later
    /// restore has superseded it).
    pub fn active_fault(&self) -> Option<&FaultLogEntry> {
        self.latest_event().filter(|e| e.fault_state == FaultState::Fault)
    }

    pub fn note_sync(&mut self, at: DateTime<Utc>) {
        if self.capabilities.schedule_sync {
            self.last_sync = Some(at);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn single_zone_system_rejects_nonzero_zone_indices() {
        let mut sys = System::new(DeviceId::parse("23:111111").unwrap(), SystemCapabilities::default());
        assert!(sys.zone_mut(1).is_none());
        assert!(sys.zone_mut(0).is_some());
    }

    #[test]
    fn fault_log_is_inert_without_the_logbook_capability() {
        let mut sys = System::new(
            DeviceId::parse("01:145038").unwrap(),
            SystemCapabilities { multi_zone: true, ..Default::default() },
        );
        sys.record_fault(FaultLogEntry::from_payload(0, &fault_payload(0x00, 0)));
        assert!(sys.fault_log().is_none());
    }

    #[test]
    fn fault_log_replaces_entries_with_the_same_index() {
        let mut sys = System::new(
            DeviceId::parse("01:145038").unwrap(),
            SystemCapabilities { multi_zone: true, logbook: true, ..Default::default() },
        );
        sys.record_fault(FaultLogEntry { raw: "aa".into(), ..FaultLogEntry::from_payload(0, "") });
        sys.record_fault(FaultLogEntry { raw: "bb".into(), ..FaultLogEntry::from_payload(0, "") });
        assert_eq!(sys.fault_log().unwrap().len(), 1);
        assert_eq!(sys.fault_log().unwrap()[0].raw, "bb");
    }

    fn fault_payload(fault_state: u8, log_idx: u8) -> String {
        let header = format!("00{fault_state:02X}{log_idx:02X}B0"); // 00|fault_state|log_idx|B0
        let middle = "000000"; // fault_type=00, domain_idx=00, device_class=00
        let reserved = "0000";
        let timestamp = ramses_tx::payload::encode_datetime(Utc::now());
        let tail = "FFFF7000000000"; // FFFF7000 + dev_id(000000)
        format!("{header}{middle}{reserved}{timestamp}{tail}")
    }

    #[test]
    fn latest_event_and_active_fault_track_the_newest_log_idx() {
        let mut sys = System::new(
            DeviceId::parse("01:145038").unwrap(),
            SystemCapabilities { multi_zone: true, logbook: true, ..Default::default() },
        );
        sys.record_fault(FaultLogEntry::from_payload(0, &fault_payload(0x00, 0)));
        assert_eq!(sys.active_fault().unwrap().log_idx, 0);
        assert_eq!(sys.latest_event().unwrap().fault_state, FaultState::Fault);

        sys.record_fault(FaultLogEntry::from_payload(1, &fault_payload(0x00, 1)));
        sys.record_fault(FaultLogEntry::from_payload(0, &fault_payload(0x40, 0)));
        assert!(sys.active_fault().is_none());
        assert_eq!(sys.latest_fault().unwrap().log_idx, 1);
    }

    #[test]
    fn from_payload_decodes_every_field() {
        // 00 | fault_state=00 | log_idx=03 | B0 | fault_type=01 | domain_idx=02
        // | device_class=01 | 0000 | timestamp (2024-01-01 12:00:00) | FFFF7000
        // | dev_id=011450
        let payload = "000003B00102010000E80701010C0000FFFF7000011450";
        let entry = FaultLogEntry::from_payload(3, payload);
        assert_eq!(entry.log_idx, 3);
        assert_eq!(entry.fault_state, FaultState::Fault);
        assert_eq!(entry.fault_type, FaultType::Actuator);
        assert_eq!(entry.domain_idx, 0x02);
        assert_eq!(entry.device_class, FaultDeviceClass::Sensor);
        assert_eq!(entry.device_id.as_deref(), Some("011450"));
        assert_eq!(entry.timestamp, Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()));
    }
}
