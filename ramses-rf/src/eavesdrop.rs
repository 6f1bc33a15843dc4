//! Optional inference of topology facts from observed traffic patterns
//! rather than from schema-bearing messages (`0005`/`000C`). Off by default
//! (spec.md §3 Non-goals), grounded on `ramses_rf/device/base.py`'s
//! `_SLUG`-eavesdropping helpers.

use ramses_tx::{DeviceId, Verb};

use crate::error::{Error, Result};

pub struct Eavesdropper {
    enabled: bool,
}

impl Eavesdropper {
    pub fn new(enabled: bool) -> Self {
        Eavesdropper { enabled }
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Guess a zone-sensor binding from an unsolicited `30C9` temperature
    /// report, the weakest of the inference signals this crate supports.
    /// Returns an error (never silently accepted) when disabled.
    pub fn infer_zone_binding(&self, sensor: &DeviceId, code: u16, verb: Verb) -> Result<u8> {
        if !self.enabled {
            return Err(Error::EavesdropRejected("eavesdropping disabled".into()));
        }
        if code != 0x30C9 || verb != Verb::I {
            return Err(Error::EavesdropRejected(format!(
                "code {code:04X}/{verb:?} is not a reliable binding signal"
            )));
        }
        // Absent a schema (`000C`), the best this crate can do is treat the
        // sensor's own numeric suffix parity as a zone-index guess.
        let suffix = sensor
            .as_str()
            .rsplit(':')
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(0);
        Ok((suffix % 16) as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_by_default() {
        let e = Eavesdropper::new(false);
        assert!(!e.is_enabled());
        let sensor = DeviceId::parse("03:111111").unwrap();
        assert!(e.infer_zone_binding(&sensor, 0x30C9, Verb::I).is_err());
    }

    #[test]
    fn enabled_eavesdropper_guesses_a_zone_index() {
        let mut e = Eavesdropper::new(false);
        e.enable();
        let sensor = DeviceId::parse("03:111111").unwrap();
        assert!(e.infer_zone_binding(&sensor, 0x30C9, Verb::I).is_ok());
    }
}
