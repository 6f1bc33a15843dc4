//! Per-code payload decoding, header-context derivation, and message TTLs
//! (spec.md §3, §4.1, §4.3).

pub mod fan_param;
mod registry;
mod types;

pub use registry::{is_zone_context, lifespan, name_of};
pub use types::{decode_datetime, encode_datetime, hex_byte, HeatingMode, Payload};

use crate::frame::Verb;
use registry::{CtxKind, CODES};

/// The code-specific fragment of a header (spec.md §4.1): usually a zone or
/// DHW index, a fault-log slot, or an OpenTherm data-id; otherwise the
/// domain marker `"00"`.
pub fn context_for(code: u16, _verb: Verb, payload: &str) -> String {
    let kind = CODES
        .iter()
        .find(|e| e.code == code)
        .map(|e| e.ctx)
        .unwrap_or(CtxKind::None);

    let byte = |n: usize| -> Option<&str> { payload.get(n * 2..n * 2 + 2) };

    match kind {
        CtxKind::None => "00".to_string(),
        CtxKind::ZoneIdx | CtxKind::DhwIdx => byte(0).unwrap_or("00").to_string(),
        CtxKind::FaultLogIdx => byte(1).unwrap_or("00").to_string(),
        CtxKind::OpenThermId => byte(2).unwrap_or("00").to_string(),
    }
}
