//! Decoded payload shapes for the codes this crate understands (spec.md §3,
//! grounded on `typing.py`'s `PayDictT` family of `TypedDict`s).

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// The DHW/zone operating mode byte (spec.md §4.2, grounded on
/// `typing.py::_ZoneMode`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeatingMode {
    Follow,
    Advanced,
    Permanent,
    Countdown,
    Temporary,
}

impl HeatingMode {
    pub fn as_u8(self) -> u8 {
        match self {
            HeatingMode::Follow => 0x00,
            HeatingMode::Advanced => 0x01,
            HeatingMode::Permanent => 0x02,
            HeatingMode::Countdown => 0x03,
            HeatingMode::Temporary => 0x04,
        }
    }

    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0x00 => Ok(HeatingMode::Follow),
            0x01 => Ok(HeatingMode::Advanced),
            0x02 => Ok(HeatingMode::Permanent),
            0x03 => Ok(HeatingMode::Countdown),
            0x04 => Ok(HeatingMode::Temporary),
            _ => Err(Error::CommandInvalid(format!("unknown heating mode byte {v:02X}"))),
        }
    }
}

/// Pack a UTC datetime into the 7-byte `yy yy mm dd hh mm ss` wire format
/// (spec.md §4.2): a little-endian 16-bit year, then month/day/hour/minute/
/// second as single bytes. The DST flag (high bit of the hour byte) is
/// always clear since this crate tracks everything in UTC.
pub fn encode_datetime(dtm: DateTime<Utc>) -> String {
    let year = dtm.year() as u16;
    format!(
        "{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
        year & 0xFF,
        (year >> 8) & 0xFF,
        dtm.month() as u8,
        dtm.day() as u8,
        dtm.hour() as u8,
        dtm.minute() as u8,
        dtm.second() as u8,
    )
}

pub fn decode_datetime(payload: &str, idx: usize) -> Result<DateTime<Utc>> {
    let lo = hex_byte(payload, idx)? as u16;
    let hi = hex_byte(payload, idx + 1)? as u16;
    let year = (hi << 8) | lo;
    let month = hex_byte(payload, idx + 2)?;
    let day = hex_byte(payload, idx + 3)?;
    let hour = hex_byte(payload, idx + 4)? & 0x7F;
    let minute = hex_byte(payload, idx + 5)?;
    let second = hex_byte(payload, idx + 6)?;
    Utc.with_ymd_and_hms(year as i32, month as u32, day as u32, hour as u32, minute as u32, second as u32)
        .single()
        .ok_or_else(|| Error::CommandInvalid("invalid packed datetime".into()))
}

pub fn hex_byte(payload: &str, idx: usize) -> Result<u8> {
    payload
        .get(idx * 2..idx * 2 + 2)
        .ok_or_else(|| Error::CommandInvalid(format!("payload too short for byte {idx}")))
        .and_then(|h| u8::from_str_radix(h, 16).map_err(|e| Error::CommandInvalid(e.to_string())))
}

fn hex_u16(payload: &str, idx: usize) -> Result<u16> {
    let hi = hex_byte(payload, idx)? as u16;
    let lo = hex_byte(payload, idx + 1)? as u16;
    Ok((hi << 8) | lo)
}

fn hex_u32(payload: &str, idx: usize) -> Result<u32> {
    let hi = hex_u16(payload, idx)? as u32;
    let lo = hex_u16(payload, idx + 2)? as u32;
    Ok((hi << 16) | lo)
}

/// Native-units temperature encoded as a signed 1/100th-of-degree `u16`.
fn decode_temp(raw: u16) -> Option<f32> {
    if raw == 0x7FFF {
        None
    } else {
        Some(raw as i16 as f32 / 100.0)
    }
}

fn encode_temp(value: f32) -> u16 {
    (value * 100.0).round() as i16 as u16
}

/// A decoded payload. Codes this crate has no specific shape for decode to
/// [`Payload::Raw`] rather than failing: the wire format is still usable as
/// an opaque blob even without semantic understanding of its fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Payload {
    /// `2309`/`30C9`: a single zone's (setpoint or measured) temperature.
    ZoneTemperature { zone_idx: u8, celsius: Option<f32> },
    /// `2349`: a zone's operating mode and, if timed, its until-datetime.
    ZoneMode { zone_idx: u8, mode: u8, setpoint: Option<f32> },
    /// `000A`: a zone's configured min/max setpoint and flags.
    ZoneParams { zone_idx: u8, min_c: f32, max_c: f32 },
    /// `2E04`: the controller's overall operating mode.
    SystemMode { mode: u8 },
    /// `10A0`: DHW cylinder setpoint and reheat parameters.
    DhwParams { setpoint_c: Option<f32>, overrun_min: u8 },
    /// `1260`/`3200`: DHW cylinder temperature.
    DhwTemperature { celsius: Option<f32> },
    /// `10E0`: device identity (manufacturer sub-id and description string).
    DeviceInfo { description: String },
    /// `0418`: a fault-log entry slot.
    FaultLog { log_idx: u8, raw: String },
    /// `3220`: an OpenTherm message keyed by data-id.
    OpenThermMsg { msg_id: u8, raw: String },
    /// `2411`: a fan/ventilation configuration parameter (hvac-class
    /// devices), decoded back to real-world units per its wire data type.
    FanParam {
        param_id: u8,
        data_type: String,
        value: f64,
        min_value: f64,
        max_value: f64,
        precision: f64,
    },
    /// `1F41`: the DHW cylinder's active state and operating mode, with an
    /// optional countdown duration or until-datetime.
    DhwMode {
        dhw_idx: u8,
        active: Option<bool>,
        mode: HeatingMode,
        duration: Option<u32>,
        until: Option<DateTime<Utc>>,
    },
    /// Everything else: the undecoded hex payload.
    Raw(String),
}

impl Payload {
    pub fn decode(code: u16, payload: &str) -> Self {
        Self::try_decode(code, payload).unwrap_or_else(|_| Payload::Raw(payload.to_string()))
    }

    fn try_decode(code: u16, payload: &str) -> Result<Self> {
        match code {
            0x2309 | 0x30C9 => Ok(Payload::ZoneTemperature {
                zone_idx: hex_byte(payload, 0)?,
                celsius: decode_temp(hex_u16(payload, 1)?),
            }),
            0x2349 => Ok(Payload::ZoneMode {
                zone_idx: hex_byte(payload, 0)?,
                mode: hex_byte(payload, 3)?,
                setpoint: decode_temp(hex_u16(payload, 1)?),
            }),
            0x000A => Ok(Payload::ZoneParams {
                zone_idx: hex_byte(payload, 0)?,
                min_c: decode_temp(hex_u16(payload, 2)?).unwrap_or(5.0),
                max_c: decode_temp(hex_u16(payload, 4)?).unwrap_or(35.0),
            }),
            0x2E04 => Ok(Payload::SystemMode {
                mode: hex_byte(payload, 0)?,
            }),
            0x10A0 => Ok(Payload::DhwParams {
                setpoint_c: decode_temp(hex_u16(payload, 1)?),
                overrun_min: hex_byte(payload, 3)?,
            }),
            0x1260 | 0x3200 => Ok(Payload::DhwTemperature {
                celsius: decode_temp(hex_u16(payload, 1)?),
            }),
            0x10E0 => Ok(Payload::DeviceInfo {
                description: payload.to_string(),
            }),
            0x0418 => Ok(Payload::FaultLog {
                log_idx: hex_byte(payload, 1)?,
                raw: payload.to_string(),
            }),
            0x3220 => Ok(Payload::OpenThermMsg {
                msg_id: hex_byte(payload, 2)?,
                raw: payload.to_string(),
            }),
            0x2411 => {
                let param_id = hex_byte(payload, 2)?;
                let data_type = payload
                    .get(8..10)
                    .ok_or_else(|| Error::CommandInvalid("fan param payload too short".into()))?
                    .to_string();
                let value_raw = hex_u32(payload, 5)?;
                let min_raw = hex_u32(payload, 9)?;
                let max_raw = hex_u32(payload, 13)?;
                let prec_raw = hex_u32(payload, 17)?;
                let (value, min_value, max_value, precision) = match data_type.as_str() {
                    "01" => {
                        let precision = prec_raw as f64 / 10.0;
                        (value_raw as f64 * precision, min_raw as f64 * precision, max_raw as f64 * precision, precision)
                    }
                    "0F" => {
                        let precision = prec_raw as f64 / 200.0;
                        (
                            value_raw as f64 * precision * 100.0,
                            min_raw as f64 * precision * 100.0,
                            max_raw as f64 * precision * 100.0,
                            precision,
                        )
                    }
                    "92" => {
                        let precision = prec_raw as f64 / 100.0;
                        (value_raw as f64 / 100.0, min_raw as f64 / 100.0, max_raw as f64 / 100.0, precision)
                    }
                    _ => (value_raw as f64, min_raw as f64, max_raw as f64, 1.0),
                };
                Ok(Payload::FanParam { param_id, data_type, value, min_value, max_value, precision })
            }
            0x1F41 => {
                let dhw_idx = hex_byte(payload, 0)?;
                let active = match hex_byte(payload, 1)? {
                    0xFF => None,
                    0 => Some(false),
                    _ => Some(true),
                };
                let mode = HeatingMode::from_u8(hex_byte(payload, 2)?)?;
                let duration = match payload.get(6..12) {
                    Some("FFFFFF") => None,
                    Some(h) => Some(
                        u32::from_str_radix(h, 16)
                            .map_err(|e| Error::CommandInvalid(e.to_string()))?,
                    ),
                    None => None,
                };
                let until = if payload.len() > 12 { Some(decode_datetime(payload, 6)?) } else { None };
                Ok(Payload::DhwMode { dhw_idx, active, mode, duration, until })
            }
            _ => Ok(Payload::Raw(payload.to_string())),
        }
    }

    /// Re-encode to the hex wire payload (used by command builders).
    pub fn encode(&self) -> String {
        match self {
            Payload::ZoneTemperature { zone_idx, celsius } => {
                let raw = celsius.map(encode_temp).unwrap_or(0x7FFF);
                format!("{zone_idx:02X}{raw:04X}")
            }
            Payload::ZoneMode { zone_idx, mode, setpoint } => {
                let raw = setpoint.map(encode_temp).unwrap_or(0x7FFF);
                format!("{zone_idx:02X}{raw:04X}{mode:02X}FFFFFF")
            }
            Payload::ZoneParams { zone_idx, min_c, max_c } => {
                format!(
                    "{zone_idx:02X}0000{:04X}{:04X}",
                    encode_temp(*min_c),
                    encode_temp(*max_c)
                )
            }
            Payload::SystemMode { mode } => format!("{mode:02X}FFFFFF00"),
            Payload::DhwParams { setpoint_c, overrun_min } => {
                let raw = setpoint_c.map(encode_temp).unwrap_or(0x7FFF);
                format!("00{raw:04X}{overrun_min:02X}FFFFFF")
            }
            Payload::DhwTemperature { celsius } => {
                let raw = celsius.map(encode_temp).unwrap_or(0x7FFF);
                format!("00{raw:04X}")
            }
            Payload::DeviceInfo { description } => description.clone(),
            Payload::FaultLog { raw, .. } => raw.clone(),
            Payload::OpenThermMsg { raw, .. } => raw.clone(),
            Payload::FanParam { param_id, value, .. } => {
                crate::payload::fan_param::encode(*param_id, *value).unwrap_or_default()
            }
            Payload::DhwMode { dhw_idx, active, mode, duration, until } => {
                let active_hex = match active {
                    None => "FF".to_string(),
                    Some(true) => "01".to_string(),
                    Some(false) => "00".to_string(),
                };
                let duration_hex = match duration {
                    Some(d) => format!("{d:06X}"),
                    None => "FFFFFF".to_string(),
                };
                let until_hex = (*until).map(encode_datetime).unwrap_or_default();
                format!("{dhw_idx:02X}{active_hex}{:02X}{duration_hex}{until_hex}", mode.as_u8())
            }
            Payload::Raw(hex) => hex.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_zone_temperature() {
        let p = Payload::decode(0x30C9, "020833");
        assert_eq!(
            p,
            Payload::ZoneTemperature { zone_idx: 2, celsius: Some(21.07) }
        );
    }

    #[test]
    fn decodes_absent_temperature_sentinel() {
        let p = Payload::decode(0x30C9, "027FFF");
        assert_eq!(p, Payload::ZoneTemperature { zone_idx: 2, celsius: None });
    }

    #[test]
    fn round_trips_dhw_temperature() {
        let original = Payload::DhwTemperature { celsius: Some(45.5) };
        let hex = original.encode();
        let decoded = Payload::decode(0x1260, &hex);
        assert_eq!(decoded, original);
    }

    #[test]
    fn unknown_code_falls_back_to_raw() {
        let p = Payload::decode(0xBEEF, "AABBCC");
        assert_eq!(p, Payload::Raw("AABBCC".to_string()));
    }

    #[test]
    fn fault_log_reads_the_second_byte_as_its_index() {
        let p = Payload::decode(0x0418, "0003B0000000000000000000007FFFFF7000000000");
        assert_eq!(p, Payload::FaultLog { log_idx: 0x03, raw: "0003B0000000000000000000007FFFFF7000000000".to_string() });
    }

    #[test]
    fn packs_and_unpacks_a_datetime() {
        let dtm = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(encode_datetime(dtm), "E80701010C0000");
        assert_eq!(decode_datetime("E80701010C0000", 0).unwrap(), dtm);
    }

    #[test]
    fn round_trips_dhw_mode_with_no_timed_fields() {
        let original = Payload::DhwMode {
            dhw_idx: 0x00,
            active: Some(true),
            mode: HeatingMode::Permanent,
            duration: None,
            until: None,
        };
        let hex = original.encode();
        assert_eq!(hex, "000102FFFFFF");
        let decoded = Payload::decode(0x1F41, &hex);
        assert_eq!(decoded, original);
    }

    #[test]
    fn round_trips_dhw_mode_with_an_until_datetime() {
        let until = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let original = Payload::DhwMode {
            dhw_idx: 0x00,
            active: Some(true),
            mode: HeatingMode::Temporary,
            duration: None,
            until: Some(until),
        };
        let hex = original.encode();
        assert!(hex.ends_with("E80701010C0000"));
        let decoded = Payload::decode(0x1F41, &hex);
        assert_eq!(decoded, original);
    }

    #[test]
    fn decodes_a_2411_fan_param_percent_of_degree_value() {
        let hex = "000075009200000866000000000000138800000032" .to_string() + "0001";
        let decoded = Payload::decode(0x2411, &hex);
        match decoded {
            Payload::FanParam { param_id, data_type, value, .. } => {
                assert_eq!(param_id, 0x75);
                assert_eq!(data_type, "92");
                assert!((value - 21.5).abs() < 0.001);
            }
            other => panic!("expected FanParam, got {other:?}"),
        }
    }
}
