//! Outbound commands: a frame-to-be, paired with its QoS and send parameters
//! (spec.md §3, grounded on `typing.py`'s `SendParams`/`QosParams`).

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::address::DeviceId;
use crate::error::{Error, Result};
use crate::frame::{Frame, Verb};
use crate::payload::{fan_param, HeatingMode, Payload};
use crate::typing::HeaderT;

/// Relative urgency in the send queue (spec.md §4.5). Ties break FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Default,
    High,
    Urgent,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Default
    }
}

/// Per-attempt and overall retry/timeout behaviour for one command
/// (grounded on `typing.py::QosParams`).
#[derive(Debug, Clone, Copy)]
pub struct QosParams {
    pub max_retries: u8,
    pub echo_timeout: Duration,
    pub reply_timeout: Duration,
    pub wait_for_reply: bool,
    /// Overall time this command may occupy the FSM, from first send to
    /// either completion or failure (spec.md §3: default 3s, capped at 30s).
    pub timeout: Duration,
}

impl QosParams {
    /// Hard upper bound on `max_retries` (spec.md §3).
    pub const MAX_RETRIES_CAP: u8 = 5;
    /// Hard upper bound on `timeout` (spec.md §3).
    pub const TIMEOUT_CAP: Duration = Duration::from_secs(30);

    /// Clamp `max_retries`/`timeout` to their documented caps. Applied
    /// whenever a `QosParams` is attached to a [`Command`]: callers may
    /// construct one with out-of-range values, but the FSM must never see
    /// them.
    fn clamped(mut self) -> Self {
        self.max_retries = self.max_retries.min(Self::MAX_RETRIES_CAP);
        self.timeout = self.timeout.min(Self::TIMEOUT_CAP);
        self
    }
}

impl Default for QosParams {
    fn default() -> Self {
        QosParams {
            max_retries: 3,
            echo_timeout: Duration::from_millis(500),
            reply_timeout: Duration::from_secs(3),
            wait_for_reply: true,
            timeout: Duration::from_secs(3),
        }
        .clamped()
    }
}

/// Pacing and scheduling hints for one command (grounded on
/// `typing.py::SendParams`).
#[derive(Debug, Clone, Copy)]
pub struct SendParams {
    pub gap_duration: Duration,
    pub num_repeats: u8,
    pub priority: Priority,
}

impl Default for SendParams {
    fn default() -> Self {
        SendParams {
            gap_duration: Duration::from_millis(20),
            num_repeats: 1,
            priority: Priority::Default,
        }
    }
}

/// A command awaiting transmission: not yet a wire [`Frame`] because its
/// sender address (the gateway's own id) is only known once the transport
/// has identified itself (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct Command {
    pub verb: Verb,
    pub dest: DeviceId,
    pub code: u16,
    pub payload_hex: String,
    pub qos: QosParams,
    pub send: SendParams,
    /// Send as a device other than the gateway's resolved own id -- a faked
    /// device impersonating its real counterpart. `None` means "the
    /// gateway's own id" (grounded on `protocol/base.py`'s
    /// `cmd.src.id != self.hgi_id` impersonation check).
    pub src_override: Option<DeviceId>,
}

/// The RAMSES-II puzzle-packet code, used for diagnostic out-of-band
/// messages such as the impersonation alert.
pub const PUZZLE_CODE: u16 = 0x7FFF;

impl Command {
    pub fn new(verb: Verb, dest: DeviceId, code: u16, payload_hex: impl Into<String>) -> Self {
        Command {
            verb,
            dest,
            code,
            payload_hex: payload_hex.into(),
            qos: QosParams::default(),
            send: SendParams::default(),
            src_override: None,
        }
    }

    pub fn with_qos(mut self, qos: QosParams) -> Self {
        self.qos = qos.clamped();
        self
    }

    pub fn with_send_params(mut self, send: SendParams) -> Self {
        self.send = send;
        self
    }

    /// Send this command as `src` rather than the gateway's own id (a faked
    /// device impersonating its real counterpart).
    pub fn with_src(mut self, src: DeviceId) -> Self {
        self.src_override = Some(src);
        self
    }

    /// `I|7FFF`: a puzzle packet warning that `impersonator` is sending as
    /// another device's address, for the command whose header is `tx_header`
    /// (grounded on `protocol/core.py::_send_impersonation_alert`, msg_type
    /// `"11"`; the full `LOOKUP_PUZZ` message-type table is out of scope).
    pub fn impersonation_alert(impersonator: &DeviceId, tx_header: &str) -> Self {
        let message = format!("Impersonating device: {impersonator}, for pkt: {tx_header}");
        let hex: String = message.bytes().map(|b| format!("{b:02X}")).collect();
        let payload = format!("0011{hex}");
        Command::new(Verb::I, DeviceId::broadcast(), PUZZLE_CODE, payload)
    }

    /// `W|1F41`: set the DHW cylinder's active state and/or operating mode.
    ///
    /// At most one of `until`/`duration` may be set; the mode is derived
    /// from whichever of them (if either) is present: `until` ->
    /// [`HeatingMode::Temporary`], `duration` -> [`HeatingMode::Countdown`],
    /// neither -> [`HeatingMode::Permanent`] (grounded on `command.py`'s
    /// `_normalise_mode`).
    pub fn set_dhw_mode(
        dest: DeviceId,
        dhw_idx: u8,
        active: Option<bool>,
        until: Option<DateTime<Utc>>,
        duration: Option<u32>,
    ) -> Result<Self> {
        if until.is_some() && duration.is_some() {
            return Err(Error::CommandInvalid(
                "set_dhw_mode: at most one of `until`/`duration` may be set".into(),
            ));
        }
        let mode = if until.is_some() {
            HeatingMode::Temporary
        } else if duration.is_some() {
            HeatingMode::Countdown
        } else {
            HeatingMode::Permanent
        };
        let payload = Payload::DhwMode { dhw_idx, active, mode, duration, until }.encode();
        Ok(Command::new(Verb::W, dest, 0x1F41, payload))
    }

    /// `W|2411`: set a fan/ventilation configuration parameter on an
    /// HVAC-class device, scaling `value` per the parameter's own data
    /// type (grounded on `command.py::set_fan_param`).
    pub fn set_fan_param(dest: DeviceId, param_id: u8, value: f64) -> Result<Self> {
        let payload = fan_param::encode(param_id, value)?;
        Ok(Command::new(Verb::W, dest, 0x2411, payload))
    }

    /// Resolve this command into a wire frame, given the gateway's own
    /// (now-known) address (spec.md §4.1 addressing rules).
    pub fn to_frame(&self, src: &DeviceId) -> Frame {
        let src = self.src_override.as_ref().unwrap_or(src);
        let (addr0, addr1, addr2) = if *src == self.dest {
            (src.clone(), DeviceId::broadcast(), src.clone())
        } else {
            (src.clone(), self.dest.clone(), DeviceId::broadcast())
        };
        Frame {
            verb: self.verb,
            seq: None,
            addr0,
            addr1,
            addr2,
            code: self.code,
            payload: self.payload_hex.clone(),
        }
    }

    pub fn tx_header(&self, src: &DeviceId) -> Result<HeaderT> {
        self.to_frame(src).header()
    }

    pub fn rx_header(&self, src: &DeviceId) -> Result<Option<HeaderT>> {
        self.to_frame(src).rx_header()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(s: &str) -> DeviceId {
        DeviceId::parse(s).unwrap()
    }

    #[test]
    fn set_dhw_mode_round_trips_through_the_payload_codec() {
        let cmd = Command::set_dhw_mode(dev("01:145038"), 0x00, Some(true), None, None).unwrap();
        let decoded = Payload::decode(0x1F41, &cmd.payload_hex);
        assert_eq!(
            decoded,
            Payload::DhwMode {
                dhw_idx: 0x00,
                active: Some(true),
                mode: HeatingMode::Permanent,
                duration: None,
                until: None,
            }
        );
    }

    #[test]
    fn set_dhw_mode_rejects_until_and_duration_together() {
        let until = chrono::Utc::now();
        assert!(Command::set_dhw_mode(dev("01:145038"), 0x00, None, Some(until), Some(60)).is_err());
    }

    #[test]
    fn to_frame_uses_self_announce_addressing_when_dest_is_own_address() {
        let src = dev("18:000730");
        let cmd = Command::new(Verb::I, src.clone(), 0x1F09, "FF");
        let frame = cmd.to_frame(&src);
        assert_eq!(frame.addr0, src);
        assert_eq!(frame.addr2, src);
        assert!(frame.addr1.is_broadcast());
    }

    #[test]
    fn with_src_overrides_the_gateways_own_resolved_id() {
        let faked = dev("13:999999");
        let cmd = Command::new(Verb::I, dev("01:145038"), 0x30C9, "00").with_src(faked.clone());
        let frame = cmd.to_frame(&dev("18:000730"));
        assert_eq!(frame.addr0, faked);
    }

    #[test]
    fn impersonation_alert_carries_the_impersonator_and_header_as_text() {
        let impersonator = dev("13:999999");
        let cmd = Command::impersonation_alert(&impersonator, "2309|I|01:145038|00");
        assert_eq!(cmd.code, PUZZLE_CODE);
        assert!(cmd.payload_hex.starts_with("0011"));
    }

    #[test]
    fn tx_header_carries_the_resolved_sender() {
        let src = dev("18:000730");
        let cmd = Command::set_fan_param(dev("32:123456"), 0x20, 50.0).unwrap();
        let header = cmd.tx_header(&src).unwrap();
        assert!(header.contains("18:000730"));
        assert!(header.contains("2411"));
    }
}
