//! The per-code table: display name, header-context kind, and message TTL
//! (spec.md §4.3, grounded on `packet.py`'s `pkt_lifespan`).

use std::time::Duration;

use crate::frame::Verb;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum CtxKind {
    None,
    ZoneIdx,
    DhwIdx,
    FaultLogIdx,
    OpenThermId,
}

pub(super) struct CodeEntry {
    pub code: u16,
    pub name: &'static str,
    pub ctx: CtxKind,
}

/// Every code this crate has an opinion about. Codes absent from this table
/// fall back to `"00"` context and the default one-hour TTL.
pub(super) const CODES: &[CodeEntry] = &[
    CodeEntry { code: 0x0001, name: "rf_unknown", ctx: CtxKind::None },
    CodeEntry { code: 0x0002, name: "sensor_weather", ctx: CtxKind::None },
    CodeEntry { code: 0x0004, name: "zone_name", ctx: CtxKind::ZoneIdx },
    CodeEntry { code: 0x0005, name: "system_zones", ctx: CtxKind::None },
    CodeEntry { code: 0x0006, name: "schedule_sync", ctx: CtxKind::None },
    CodeEntry { code: 0x0009, name: "zone_actuator_check", ctx: CtxKind::ZoneIdx },
    CodeEntry { code: 0x000A, name: "zone_params", ctx: CtxKind::ZoneIdx },
    CodeEntry { code: 0x000C, name: "zone_devices", ctx: CtxKind::None },
    CodeEntry { code: 0x0016, name: "rf_check", ctx: CtxKind::None },
    CodeEntry { code: 0x0100, name: "language", ctx: CtxKind::None },
    CodeEntry { code: 0x01D0, name: "unknown_01d0", ctx: CtxKind::None },
    CodeEntry { code: 0x01E9, name: "unknown_01e9", ctx: CtxKind::None },
    CodeEntry { code: 0x1030, name: "mix_valve_params", ctx: CtxKind::ZoneIdx },
    CodeEntry { code: 0x1060, name: "device_battery", ctx: CtxKind::None },
    CodeEntry { code: 0x10A0, name: "dhw_params", ctx: CtxKind::DhwIdx },
    CodeEntry { code: 0x10E0, name: "device_info", ctx: CtxKind::None },
    CodeEntry { code: 0x12A0, name: "indoor_humidity", ctx: CtxKind::ZoneIdx },
    CodeEntry { code: 0x1260, name: "dhw_temp", ctx: CtxKind::DhwIdx },
    CodeEntry { code: 0x1F09, name: "system_sync", ctx: CtxKind::None },
    CodeEntry { code: 0x1FC9, name: "rf_bind", ctx: CtxKind::None },
    CodeEntry { code: 0x1FD4, name: "opentherm_sync", ctx: CtxKind::None },
    CodeEntry { code: 0x2249, name: "setpoint_now_next", ctx: CtxKind::ZoneIdx },
    CodeEntry { code: 0x22C9, name: "ufh_setpoint", ctx: CtxKind::ZoneIdx },
    CodeEntry { code: 0x2309, name: "setpoint", ctx: CtxKind::ZoneIdx },
    CodeEntry { code: 0x2349, name: "zone_mode", ctx: CtxKind::ZoneIdx },
    CodeEntry { code: 0x2389, name: "unknown_2389", ctx: CtxKind::ZoneIdx },
    CodeEntry { code: 0x2E04, name: "system_mode", ctx: CtxKind::None },
    CodeEntry { code: 0x2411, name: "fan_param", ctx: CtxKind::None },
    CodeEntry { code: 0x30C9, name: "temperature", ctx: CtxKind::ZoneIdx },
    CodeEntry { code: 0x3150, name: "heat_demand", ctx: CtxKind::ZoneIdx },
    CodeEntry { code: 0x313F, name: "datetime", ctx: CtxKind::None },
    CodeEntry { code: 0x3200, name: "dhw_temp_alt", ctx: CtxKind::DhwIdx },
    CodeEntry { code: 0x3210, name: "boiler_temp", ctx: CtxKind::None },
    CodeEntry { code: 0x3220, name: "opentherm_msg", ctx: CtxKind::OpenThermId },
    CodeEntry { code: 0x3B00, name: "actuator_sync", ctx: CtxKind::None },
    CodeEntry { code: 0x3EF0, name: "actuator_state", ctx: CtxKind::None },
    CodeEntry { code: 0x3EF1, name: "actuator_cycle", ctx: CtxKind::None },
    CodeEntry { code: 0x0404, name: "schedule_fragment", ctx: CtxKind::None },
    CodeEntry { code: 0x0418, name: "fault_log", ctx: CtxKind::FaultLogIdx },
    CodeEntry { code: 0x1F41, name: "dhw_mode", ctx: CtxKind::DhwIdx },
];

/// Whether `code`'s header context is a zone index (spec.md's eavesdropped
/// zone-traffic inference consults this to decide whether a message teaches
/// the topology layer about a zone).
pub fn is_zone_context(code: u16) -> bool {
    CODES.iter().any(|e| e.code == code && e.ctx == CtxKind::ZoneIdx)
}

pub fn name_of(code: u16) -> &'static str {
    CODES
        .iter()
        .find(|e| e.code == code)
        .map(|e| e.name)
        .unwrap_or("unknown")
}

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);
const DAY: Duration = Duration::from_secs(24 * 3600);

/// OpenTherm data-ids that describe boiler/controller identity and rarely
/// change (spec.md's supplemented OpenTherm classification).
const OT_SCHEMA_IDS: &[u8] = &[0x03, 0x7C, 0x7D, 0x7E, 0x7F];
/// Data-ids that hold configured parameters (change on reconfiguration only).
const OT_PARAMS_IDS: &[u8] = &[0x01, 0x0E, 0x10, 0x11, 0x39];
/// Data-ids that report live operating status.
const OT_STATUS_IDS: &[u8] = &[0x00, 0x02, 0x05, 0x12, 0x13, 0x1A, 0x1C];

fn record_size(code: u16) -> Option<usize> {
    match code {
        0x000A => Some(6),
        0x2309 | 0x30C9 => Some(3),
        _ => None,
    }
}

fn is_array(code: u16, payload: &str) -> bool {
    match record_size(code) {
        Some(size) => payload.len() / 2 > size,
        None => false,
    }
}

fn opentherm_scale(payload: &str) -> Duration {
    let data_id = payload
        .get(4..6)
        .and_then(|h| u8::from_str_radix(h, 16).ok());
    let base = match data_id {
        Some(id) if OT_SCHEMA_IDS.contains(&id) => HOUR * 6,
        Some(id) if OT_PARAMS_IDS.contains(&id) => HOUR,
        Some(id) if OT_STATUS_IDS.contains(&id) => MINUTE * 5,
        _ => MINUTE * 5,
    };
    base.mul_f64(2.1)
}

/// How long a message with this `(code, verb, payload)` should remain in the
/// index before it is considered stale (spec.md §4.3), grounded directly on
/// `packet.py::pkt_lifespan`.
pub fn lifespan(code: u16, verb: Verb, payload: &str) -> Duration {
    if matches!(verb, Verb::RQ | Verb::W) {
        return Duration::ZERO;
    }
    match code {
        0x0005 | 0x000C => DAY,
        0x0006 => HOUR,
        0x0404 => DAY,
        0x000A if is_array(code, payload) => HOUR,
        0x10E0 => DAY,
        0x1F09 => {
            if matches!(verb, Verb::I) {
                SECOND * 360
            } else {
                Duration::ZERO
            }
        }
        0x1FC9 if matches!(verb, Verb::RP) => DAY,
        0x2309 | 0x30C9 if is_array(code, payload) => SECOND * 360,
        0x3220 => opentherm_scale(payload),
        _ => HOUR,
    }
}
