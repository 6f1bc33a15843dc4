//! Allow/block address filtering, gateway-id substitution, and the
//! once-per-day foreign-gateway warning (spec.md §4.6, §7).

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tracing::warn;

use crate::address::DeviceId;
use crate::typing::HeaderT;

/// Accepts or rejects traffic by device id, and rewrites the sentinel
/// `18:000730` to the gateway's resolved own id once known.
pub struct Filter {
    allow: Option<HashSet<DeviceId>>,
    block: HashSet<DeviceId>,
    own_id: Option<DeviceId>,
    is_evofw3: Option<bool>,
    foreign_warned_at: HashMap<DeviceId, DateTime<Utc>>,
}

impl Filter {
    pub fn new(allow: Option<HashSet<DeviceId>>, block: HashSet<DeviceId>) -> Self {
        Filter { allow, block, own_id: None, is_evofw3: None, foreign_warned_at: HashMap::new() }
    }

    pub fn set_own_id(&mut self, id: DeviceId) {
        self.own_id = Some(id);
    }

    /// Record the attached transport's firmware kind, once the serial
    /// fingerprint probe resolves it (spec.md §4.6).
    pub fn set_firmware_kind(&mut self, is_evofw3: bool) {
        self.is_evofw3 = Some(is_evofw3);
    }

    /// Whether traffic to/from `id` should be processed at all.
    pub fn permits(&self, id: &DeviceId) -> bool {
        if self.block.contains(id) {
            return false;
        }
        match &self.allow {
            Some(allow) => allow.contains(id) || id.is_broadcast(),
            None => true,
        }
    }

    /// Replace the `18:000730` sentinel in a header with the gateway's
    /// resolved own id, once known -- but only when the attached firmware
    /// is evofw3 (spec.md §4.6). HGI80 frames already carry their real
    /// sender address and must pass through unrewritten.
    pub fn patch_header(&self, header: &HeaderT) -> HeaderT {
        match &self.own_id {
            Some(own_id)
                if own_id.as_str() != crate::address::HGI_SENTINEL
                    && self.is_evofw3 == Some(true) =>
            {
                header.with_replaced(crate::address::HGI_SENTINEL, own_id.as_str())
            }
            _ => header.clone(),
        }
    }

    /// Record sight of a foreign (non-own) `18:` class gateway, warning at
    /// most once per device per day (spec.md's supplemented rate-limit).
    pub fn note_foreign_gateway(&mut self, id: &DeviceId, now: DateTime<Utc>) {
        if id.class() != "18" {
            return;
        }
        if self.own_id.as_ref() == Some(id) {
            return;
        }
        let should_warn = match self.foreign_warned_at.get(id) {
            Some(last) => now.signed_duration_since(*last) >= ChronoDuration::days(1),
            None => true,
        };
        if should_warn {
            warn!(device = %id, "traffic from a foreign gateway");
            self.foreign_warned_at.insert(id.clone(), now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(s: &str) -> DeviceId {
        DeviceId::parse(s).unwrap()
    }

    #[test]
    fn block_list_takes_precedence_over_allow_list() {
        let mut allow = HashSet::new();
        allow.insert(dev("01:145038"));
        let mut block = HashSet::new();
        block.insert(dev("01:145038"));
        let filter = Filter::new(Some(allow), block);
        assert!(!filter.permits(&dev("01:145038")));
    }

    #[test]
    fn allow_list_restricts_to_named_devices() {
        let mut allow = HashSet::new();
        allow.insert(dev("01:145038"));
        let filter = Filter::new(Some(allow), HashSet::new());
        assert!(filter.permits(&dev("01:145038")));
        assert!(!filter.permits(&dev("01:999999")));
        assert!(filter.permits(&DeviceId::broadcast()));
    }

    #[test]
    fn patches_the_sentinel_once_own_id_is_known_on_evofw3() {
        let mut filter = Filter::new(None, HashSet::new());
        let header = HeaderT::new("1F09", "I", crate::address::HGI_SENTINEL, "00");
        assert_eq!(filter.patch_header(&header), header);

        filter.set_own_id(dev("18:123456"));
        filter.set_firmware_kind(true);
        let patched = filter.patch_header(&header);
        assert!(patched.contains("18:123456"));
    }

    #[test]
    fn leaves_hgi80_headers_unrewritten() {
        let mut filter = Filter::new(None, HashSet::new());
        let header = HeaderT::new("1F09", "I", crate::address::HGI_SENTINEL, "00");
        filter.set_own_id(dev("18:123456"));
        filter.set_firmware_kind(false);
        assert_eq!(filter.patch_header(&header), header);
    }

    #[test]
    fn warns_about_a_foreign_gateway_at_most_once_a_day() {
        let mut filter = Filter::new(None, HashSet::new());
        filter.set_own_id(dev("18:000730"));
        let foreign = dev("18:999999");
        let t0 = Utc::now();
        filter.note_foreign_gateway(&foreign, t0);
        assert_eq!(filter.foreign_warned_at.get(&foreign), Some(&t0));
        filter.note_foreign_gateway(&foreign, t0 + ChronoDuration::minutes(5));
        assert_eq!(filter.foreign_warned_at.get(&foreign), Some(&t0));
    }
}
