//! `W|2411` fan/ventilation parameter encoding. Each parameter has its own
//! value range, precision, and wire data-type, looked up from a small
//! per-parameter schema table (spec.md §8 S4, grounded on
//! `command.py::set_fan_param`/`_2411_PARAMS_SCHEMA`).

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct ParamSchema {
    data_type: &'static str,
    min_value: f64,
    max_value: f64,
    precision: f64,
}

/// Plain integer, unscaled, precision 1 -- the fallback for any parameter
/// this table doesn't carry a concrete schema for.
const DEFAULT_SCHEMA: ParamSchema = ParamSchema {
    data_type: "00",
    min_value: 0.0,
    max_value: 255.0,
    precision: 1.0,
};

/// Parameters this crate knows the schema for. Entries other than `0x75`
/// (a percentage-supply-fan-speed-style parameter) use placeholder
/// min/max/precision pending the full upstream schema table.
fn schema_for(param_id: u8) -> ParamSchema {
    match param_id {
        0x75 => ParamSchema { data_type: "92", min_value: 0.0, max_value: 50.0, precision: 0.5 },
        0x20 => ParamSchema { data_type: "01", min_value: 0.0, max_value: 100.0, precision: 1.0 },
        _ => DEFAULT_SCHEMA,
    }
}

fn checked_u32(v: i64, param_id: u8) -> Result<u32> {
    u32::try_from(v).map_err(|_| {
        Error::CommandInvalid(format!("fan param {param_id:02X}: scaled value {v} out of range"))
    })
}

/// Encode a `2411` set-parameter payload for `param_id`, scaling `value`
/// per that parameter's data type (spec.md §8 S4).
pub fn encode(param_id: u8, value: f64) -> Result<String> {
    let schema = schema_for(param_id);
    let (value_i, min_i, max_i, precision_i, trailer): (i64, i64, i64, i64, &str) =
        match schema.data_type {
            "01" => (
                (value / schema.precision).round() as i64,
                (schema.min_value / schema.precision).round() as i64,
                (schema.max_value / schema.precision).round() as i64,
                (schema.precision * 10.0).round() as i64,
                "0032",
            ),
            "0F" => (
                ((value / 100.0) / schema.precision).round() as i64,
                ((schema.min_value / 100.0) / schema.precision).round() as i64,
                ((schema.max_value / 100.0) / schema.precision).round() as i64,
                (schema.precision * 200.0).round() as i64,
                "0032",
            ),
            "92" => {
                let value_rounded = (value * 10.0).round() / 10.0;
                (
                    (value_rounded * 100.0).round() as i64,
                    (schema.min_value * 100.0) as i64,
                    (schema.max_value * 100.0) as i64,
                    (schema.precision * 100.0) as i64,
                    "0001",
                )
            }
            _ => (
                value.round() as i64,
                schema.min_value.round() as i64,
                schema.max_value.round() as i64,
                1,
                "0001",
            ),
        };

    let value_scaled = checked_u32(value_i, param_id)?;
    let min_scaled = checked_u32(min_i, param_id)?;
    let max_scaled = checked_u32(max_i, param_id)?;
    let precision_scaled = checked_u32(precision_i, param_id)?;

    Ok(format!(
        "00{:04X}00{}{:08X}{:08X}{:08X}{:08X}{trailer}",
        param_id, schema.data_type, value_scaled, min_scaled, max_scaled, precision_scaled
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_a_percent_of_degree_parameter() {
        let hex = encode(0x75, 21.5).unwrap();
        assert_eq!(hex, "000075009200000866000000000000138800000032" .to_string() + "0001");
        assert_eq!(hex.len(), 46);
    }

    #[test]
    fn rejects_a_negative_scaled_value() {
        assert!(encode(0x75, -500.0).is_err());
    }
}
