//! A TTL-based in-memory index of received messages, with secondary lookups
//! by device, code, verb and context (spec.md §4.3), grounded on
//! `database.py::MessageIndex`, reimplemented over `dashmap` instead of an
//! in-memory SQLite connection.

use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use ramses_tx::{DeviceId, HeaderT, Payload, Verb};

/// One indexed message: a decoded payload plus the routing facts needed to
/// answer the secondary-index queries below.
#[derive(Debug, Clone)]
pub struct Message {
    pub dtm: DateTime<Utc>,
    pub header: HeaderT,
    pub src: DeviceId,
    pub dst: DeviceId,
    pub verb: Verb,
    pub code: u16,
    pub payload: Payload,
    pub expires_at: DateTime<Utc>,
}

impl Message {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// A set of `Some`-valued fields to match messages against (spec.md §4.3):
/// every `Some` field must match; `None` fields are wildcards.
#[derive(Debug, Clone, Default)]
pub struct Selector {
    pub src: Option<DeviceId>,
    pub dst: Option<DeviceId>,
    pub code: Option<u16>,
    pub verb: Option<Verb>,
}

impl Selector {
    pub fn matches(&self, msg: &Message) -> bool {
        self.src.as_ref().map_or(true, |s| &msg.src == s)
            && self.dst.as_ref().map_or(true, |d| &msg.dst == d)
            && self.code.map_or(true, |c| msg.code == c)
            && self.verb.map_or(true, |v| msg.verb == v)
    }
}

/// Keyed primarily on arrival time (unique) with header uniqueness enforced
/// by replacing whichever message previously held that header.
pub struct MessageIndex {
    by_dtm: DashMap<DateTime<Utc>, Message>,
    by_header: DashMap<HeaderT, DateTime<Utc>>,
}

impl MessageIndex {
    pub fn new() -> Self {
        MessageIndex { by_dtm: DashMap::new(), by_header: DashMap::new() }
    }

    /// Insert a message, replacing any prior message with the same `dtm` or
    /// the same `header` (spec.md §4.3: both are unique keys). Returns the
    /// message that was displaced, if any.
    pub fn add(&self, msg: Message) -> Option<Message> {
        let mut replaced = self.by_dtm.remove(&msg.dtm).map(|(_, m)| m);

        if let Some((_, old_dtm)) = self.by_header.remove(&msg.header) {
            if let Some((_, old_msg)) = self.by_dtm.remove(&old_dtm) {
                replaced = Some(old_msg);
            }
        }

        self.by_header.insert(msg.header.clone(), msg.dtm);
        self.by_dtm.insert(msg.dtm, msg);
        replaced
    }

    pub fn get_by_header(&self, header: &HeaderT) -> Option<Message> {
        let dtm = self.by_header.get(header)?;
        self.by_dtm.get(&dtm).map(|m| m.clone())
    }

    pub fn len(&self) -> usize {
        self.by_dtm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_dtm.is_empty()
    }

    /// All non-expired messages matching every `Some` filter supplied.
    pub fn query(
        &self,
        src: Option<&DeviceId>,
        dst: Option<&DeviceId>,
        code: Option<u16>,
        verb: Option<Verb>,
        now: DateTime<Utc>,
    ) -> Vec<Message> {
        self.by_dtm
            .iter()
            .filter(|e| !e.value().is_expired(now))
            .filter(|e| src.map_or(true, |s| &e.value().src == s))
            .filter(|e| dst.map_or(true, |d| &e.value().dst == d))
            .filter(|e| code.map_or(true, |c| e.value().code == c))
            .filter(|e| verb.map_or(true, |v| e.value().verb == v))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn all(&self, include_expired: bool, now: DateTime<Utc>) -> Vec<Message> {
        self.by_dtm
            .iter()
            .filter(|e| include_expired || !e.value().is_expired(now))
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn clear(&self) {
        self.by_dtm.clear();
        self.by_header.clear();
    }

    /// Insert a placeholder record for a device/code/verb combination that
    /// hasn't actually been seen on the wire yet -- e.g. to seed a discovery
    /// poll target before its first reply arrives (grounded on
    /// `database.py::MessageIndex.add_dummy_record`).
    pub fn add_dummy_record(&self, src: DeviceId, code: u16, verb: Verb) -> Message {
        let now = Utc::now();
        let header = HeaderT::new(&format!("{code:04X}"), verb.as_str(), src.as_str(), "00");
        let msg = Message {
            dtm: now,
            header,
            src,
            dst: DeviceId::broadcast(),
            verb,
            code,
            payload: Payload::Raw(String::new()),
            expires_at: now,
        };
        self.add(msg.clone());
        msg
    }

    /// Remove the message stored under `header`, if any.
    pub fn remove(&self, header: &HeaderT) -> Option<Message> {
        let (_, dtm) = self.by_header.remove(header)?;
        self.by_dtm.remove(&dtm).map(|(_, m)| m)
    }

    /// Remove every message (expired or not) matching `selector`, returning
    /// how many were removed.
    pub fn remove_matching(&self, selector: &Selector) -> usize {
        let matched: Vec<HeaderT> = self
            .by_dtm
            .iter()
            .filter(|e| selector.matches(e.value()))
            .map(|e| e.value().header.clone())
            .collect();
        let count = matched.len();
        for header in matched {
            self.remove(&header);
        }
        count
    }

    /// The most recently indexed message matching `selector`, if any.
    pub fn get(&self, selector: &Selector) -> Option<Message> {
        self.by_dtm
            .iter()
            .filter(|e| selector.matches(e.value()))
            .max_by_key(|e| *e.key())
            .map(|e| e.value().clone())
    }

    /// Whether any indexed message matches `selector`.
    pub fn contains(&self, selector: &Selector) -> bool {
        self.by_dtm.iter().any(|e| selector.matches(e.value()))
    }

    /// Timestamps of every message matching `selector`, most recent first.
    pub fn query_dtms(&self, selector: &Selector) -> Vec<DateTime<Utc>> {
        let mut dtms: Vec<DateTime<Utc>> = self
            .by_dtm
            .iter()
            .filter(|e| selector.matches(e.value()))
            .map(|e| *e.key())
            .collect();
        dtms.sort_by(|a, b| b.cmp(a));
        dtms
    }

    /// Every distinct code for which `device` has sent or received a
    /// message, used to discover what a device actually talks about
    /// (grounded on `database.py::MessageIndex.get_reply_codes`).
    pub fn get_reply_codes(&self, device: &DeviceId) -> Vec<u16> {
        let mut codes: Vec<u16> = self
            .by_dtm
            .iter()
            .filter(|e| &e.value().src == device || &e.value().dst == device)
            .map(|e| e.value().code)
            .collect();
        codes.sort_unstable();
        codes.dedup();
        codes
    }

    /// Release everything held by this index (spec.md §4.3's shutdown path).
    pub fn stop(&self) {
        self.clear();
    }

    /// Drop every message older than `max_age` (spec.md §4.3's hourly
    /// housekeeping, `database.py::_housekeeping_loop`).
    pub fn housekeep(&self, now: DateTime<Utc>, max_age: Duration) {
        let cutoff = now - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        let stale: Vec<DateTime<Utc>> = self
            .by_dtm
            .iter()
            .filter(|e| *e.key() < cutoff)
            .map(|e| *e.key())
            .collect();
        for dtm in stale {
            if let Some((_, msg)) = self.by_dtm.remove(&dtm) {
                self.by_header.remove(&msg.header);
            }
        }
    }
}

impl Default for MessageIndex {
    fn default() -> Self {
        Self::new()
    }
}
