//! The public entry point: lifecycle, message dispatch, state export, and
//! discovery-poll scheduling (spec.md §6's public Gateway API), grounded on
//! `ramses_rf/gateway.py`.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use chrono::{DateTime, Utc};
use ramses_tx::filter::Filter;
use ramses_tx::{Command, DeviceClass, DeviceId, Frame, HeaderT, Outcome, Packet, Payload, ProtocolFsm};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::index::{Message, MessageIndex, Selector};
use crate::system::SystemCapabilities;
use crate::topology::Topology;

/// Tracks when each registered device is next due an active poll (spec.md's
/// supplemented discovery-poll scheduler, grounded on `entity_base.py`'s
/// `_Discovery` mixin).
pub struct DiscoveryScheduler {
    interval: Duration,
    next_poll: HashMap<DeviceId, DateTime<Utc>>,
}

impl DiscoveryScheduler {
    pub fn new(interval: Duration) -> Self {
        DiscoveryScheduler { interval, next_poll: HashMap::new() }
    }

    pub fn register(&mut self, id: DeviceId, now: DateTime<Utc>) {
        self.next_poll.entry(id).or_insert(now);
    }

    /// Devices due a poll right now; each is rescheduled one interval out.
    pub fn due(&mut self, now: DateTime<Utc>) -> Vec<DeviceId> {
        let due: Vec<DeviceId> = self
            .next_poll
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        let step = chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::zero());
        for id in &due {
            self.next_poll.insert(id.clone(), now + step);
        }
        due
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    pub controller: String,
    pub zones: Vec<u8>,
    pub has_dhw: bool,
}

/// A portable snapshot of what the gateway has learned: enough to resume
/// without replaying the entire packet history (spec.md's supplemented
/// gateway state export/restore, grounded on `ramses_rf/gateway.py`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayState {
    pub own_id: Option<String>,
    pub devices: Vec<String>,
    pub systems: Vec<SystemSnapshot>,
}

impl GatewayState {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| crate::Error::Decode(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| crate::Error::Decode(e.to_string()))
    }
}

/// A known-list entry: what a device is declared (or observed) to be
/// (spec.md §6's `known_list`: `device_id -> {class, faked?, alias?}`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTraits {
    pub class: DeviceClass,
    pub faked: bool,
    pub alias: Option<String>,
}

type MessageHandler = Box<dyn Fn(&Message) + Send + Sync>;

struct HandlerEntry {
    filter: Option<Selector>,
    handler: MessageHandler,
}

/// Returned by [`Gateway::add_msg_handler`]; drop it or pass it to
/// [`Gateway::remove_msg_handler`] to stop receiving messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

pub struct Gateway {
    fsm: ProtocolFsm,
    index: MessageIndex,
    topology: Topology,
    filter: Filter,
    own_id: Option<DeviceId>,
    discovery: DiscoveryScheduler,
    handlers: HashMap<u64, HandlerEntry>,
    next_handler_id: u64,
}

impl Gateway {
    pub fn new(max_queue: usize, allow: Option<HashSet<DeviceId>>, block: HashSet<DeviceId>) -> Self {
        Gateway {
            fsm: ProtocolFsm::new(max_queue),
            index: MessageIndex::new(),
            topology: Topology::new(),
            filter: Filter::new(allow, block),
            own_id: None,
            discovery: DiscoveryScheduler::new(Duration::from_secs(60)),
            handlers: HashMap::new(),
            next_handler_id: 0,
        }
    }

    /// Register a handler invoked on every message (or, with `filter`
    /// supplied, only those matching it). Returns a [`HandlerId`] that can
    /// be passed to [`Gateway::remove_msg_handler`] to unsubscribe.
    pub fn add_msg_handler(
        &mut self,
        filter: Option<Selector>,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) -> HandlerId {
        let id = self.next_handler_id;
        self.next_handler_id += 1;
        self.handlers.insert(id, HandlerEntry { filter, handler: Box::new(handler) });
        HandlerId(id)
    }

    pub fn remove_msg_handler(&mut self, id: HandlerId) {
        self.handlers.remove(&id.0);
    }

    /// The working known-list: every device this gateway has seen, classified
    /// by address prefix (spec.md §6's `known_list` property; `faked`/`alias`
    /// are always `false`/`None` since this crate does not implement device
    /// faking).
    pub fn known_list(&self) -> HashMap<DeviceId, DeviceTraits> {
        self.topology
            .devices()
            .map(|d| {
                let id = d.id().clone();
                let class = DeviceClass::of(&id);
                (id, DeviceTraits { class, faked: false, alias: None })
            })
            .collect()
    }

    /// Called once the serial transport's fingerprint probe (or static
    /// config) resolves the gateway's own address.
    pub fn set_own_id(&mut self, id: DeviceId) {
        self.filter.set_own_id(id.clone());
        self.own_id = Some(id);
        self.fsm.connection_made();
    }

    pub fn own_id(&self) -> Option<&DeviceId> {
        self.own_id.as_ref()
    }

    fn src_for_send(&self) -> DeviceId {
        self.own_id.clone().unwrap_or_else(DeviceId::hgi_sentinel)
    }

    /// Queue a command for transmission; returns the header it will be
    /// sent (and echoed/replied) under. If `cmd` claims a `src_override`
    /// other than the gateway's own id, a puzzle-packet impersonation alert
    /// is queued ahead of it (spec.md §4.6's faked-device impersonation
    /// check, grounded on `protocol/base.py`'s `cmd.src.id != self.hgi_id`).
    pub fn send_command(&mut self, cmd: Command) -> Result<HeaderT> {
        let src = self.src_for_send();
        if let Some(claimed) = cmd.src_override.clone() {
            if claimed != src {
                let tx_header = cmd.tx_header(&claimed)?;
                warn!(impersonator = %claimed, header = %tx_header, "sending as an impersonated device");
                let alert = Command::impersonation_alert(&claimed, tx_header.as_str());
                self.fsm.enqueue(alert, &src)?;
            }
        }
        Ok(self.fsm.enqueue(cmd, &src)?)
    }

    /// Pop the next queued command, if the FSM is ready to send it.
    pub fn next_to_send(&mut self, now: Instant) -> Option<(Frame, HeaderT)> {
        let src = self.src_for_send();
        let (cmd, tx_header) = self.fsm.take_next(&src, now)?;
        Some((cmd.to_frame(&src), tx_header))
    }

    pub fn check_timeouts(&mut self, now: Instant) -> Outcome {
        self.fsm.check_timeout(now)
    }

    /// Process one received packet: index it, fold it into the topology,
    /// feed it to the FSM, and notify registered handlers.
    pub fn handle_packet(&mut self, pkt: Packet, now: Instant) -> Result<()> {
        let header = pkt.header()?;
        let header = self.filter.patch_header(&header);
        let (src, dst, _kind) = pkt.frame.sender_receiver()?;

        if !self.filter.permits(&src) || !self.filter.permits(&dst) {
            debug!(%src, %dst, "dropping filtered traffic");
            return Ok(());
        }
        self.filter.note_foreign_gateway(&src, pkt.dtm);

        let payload = Payload::decode(pkt.frame.code, &pkt.frame.payload);
        let ttl = ramses_tx::payload::lifespan(pkt.frame.code, pkt.frame.verb, &pkt.frame.payload);
        let message = Message {
            dtm: pkt.dtm,
            header: header.clone(),
            src: src.clone(),
            dst: dst.clone(),
            verb: pkt.frame.verb,
            code: pkt.frame.code,
            payload,
            expires_at: pkt.dtm + chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
        };
        self.index.add(message.clone());

        self.topology.device_mut(&src).note_seen(pkt.dtm);
        if !dst.is_broadcast() {
            self.topology.device_mut(&dst).note_seen(pkt.dtm);
        }
        self.discovery.register(src.clone(), pkt.dtm);

        if ramses_tx::payload::is_zone_context(pkt.frame.code) {
            if let Some(idx) = u8::from_str_radix(header.as_str().rsplit('|').next().unwrap_or("00"), 16).ok() {
                self.topology.note_zone_traffic(&src, idx);
            }
        }

        for entry in self.handlers.values() {
            if entry.filter.as_ref().map_or(true, |f| f.matches(&message)) {
                (entry.handler)(&message);
            }
        }

        match self.fsm.on_packet(&header, &pkt.frame.payload, now) {
            Outcome::Completed(hdr) => info!(%hdr, "command completed"),
            Outcome::Failed { header, reason } => info!(%header, reason, "command failed"),
            Outcome::Retry { .. } | Outcome::Ignored => {}
        }
        Ok(())
    }

    pub fn register_system(&mut self, controller: DeviceId, capabilities: SystemCapabilities) {
        self.topology.system_mut(&controller, capabilities);
    }

    pub fn index(&self) -> &MessageIndex {
        &self.index
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn discovery_due(&mut self, now: DateTime<Utc>) -> Vec<DeviceId> {
        self.discovery.due(now)
    }

    fn build_schema(&self) -> GatewayState {
        GatewayState {
            own_id: self.own_id.as_ref().map(|id| id.as_str().to_string()),
            devices: self.topology.devices().map(|d| d.id().as_str().to_string()).collect(),
            systems: self
                .topology
                .systems()
                .map(|s| SystemSnapshot {
                    controller: s.controller.as_str().to_string(),
                    zones: s.zones.keys().copied().collect(),
                    has_dhw: s.dhw.is_some(),
                })
                .collect(),
        }
    }

    fn apply_schema(&mut self, state: GatewayState) -> Result<()> {
        if let Some(own_id) = state.own_id {
            self.set_own_id(DeviceId::parse(&own_id)?);
        }
        for device in state.devices {
            let id = DeviceId::parse(&device)?;
            self.topology.device_mut(&id);
        }
        for system in state.systems {
            let controller = DeviceId::parse(&system.controller)?;
            let capabilities = SystemCapabilities {
                multi_zone: system.zones.len() > 1,
                stored_hw: system.has_dhw,
                ..Default::default()
            };
            let sys = self.topology.system_mut(&controller, capabilities);
            for idx in system.zones {
                sys.zone_mut(idx);
            }
        }
        Ok(())
    }

    /// `get_state(include_expired) -> (schema, packets)` (spec.md §6): a
    /// portable snapshot of the topology shape plus the (optionally
    /// expired-inclusive) message index, suitable for persisting and later
    /// handing to [`Gateway::load_state`] to resume without replaying the
    /// whole packet history (grounded on `ramses_rf/gateway.py`'s
    /// `schema`/`params`/`status` properties and `Engine`'s packet-log
    /// replay).
    pub fn get_state(&self, include_expired: bool) -> (GatewayState, Vec<Message>) {
        (self.build_schema(), self.index.all(include_expired, Utc::now()))
    }

    /// Replay a `(schema, packets)` pair from [`Gateway::get_state`]: restores
    /// the topology shape, then re-indexes every packet as a `packet_dict`
    /// transport tick would.
    pub fn load_state(&mut self, schema: GatewayState, packets: Vec<Message>) -> Result<()> {
        self.apply_schema(schema)?;
        for msg in packets {
            self.index.add(msg);
        }
        Ok(())
    }
}
