//! MQTT transport: a RAMSES gateway (e.g. a `ramses_esp` device) publishes
//! and subscribes under a discoverable topic tree, with a token-bucket rate
//! limit and reconnect backoff (spec.md §4.7, grounded on
//! `ramses_tx/transport/mqtt.py`).
//!
//! Topic layout, rooted at [`MqttConfig::base_topic`] (default
//! `RAMSES/GATEWAY`):
//! - `<base>/+` — retained online/offline presence per gateway id, and the
//!   discovery wildcard subscribed at startup before a gateway is known.
//! - `<base>/<gwy_id>/rx` — inbound frames, JSON `{"ts": "...", "msg": "..."}`.
//! - `<base>/<gwy_id>/tx` — outbound frames, JSON `{"msg": "..."}`.

use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet as MqttPacket, QoS};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::packet::Packet;

use super::Transport;

const RECONNECT_INITIAL: Duration = Duration::from_secs(5);
const RECONNECT_MAX: Duration = Duration::from_secs(300);
const RECONNECT_BACKOFF_FACTOR: f64 = 1.5;
const RECONNECT_JITTER_FRACTION: f64 = 0.2;

/// Scatter reconnect attempts from many gateways by up to
/// [`RECONNECT_JITTER_FRACTION`] around the base backoff, so they don't all
/// retry the broker in lockstep.
fn jittered(base: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(1.0 - RECONNECT_JITTER_FRACTION..=1.0 + RECONNECT_JITTER_FRACTION);
    base.mul_f64(factor)
}

#[derive(Debug, Clone)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    /// Topic root under which every gateway publishes, e.g. `RAMSES/GATEWAY`.
    pub base_topic: String,
    /// Tokens (frames) allowed per second, refilled continuously.
    pub rate_limit_per_sec: f64,
    pub keep_alive: Duration,
}

impl Default for MqttConfig {
    fn default() -> Self {
        MqttConfig {
            host: "localhost".into(),
            port: 1883,
            client_id: "ramses-rf".into(),
            base_topic: "RAMSES/GATEWAY".into(),
            rate_limit_per_sec: 5.0,
            keep_alive: Duration::from_secs(30),
        }
    }
}

impl MqttConfig {
    /// The wildcard subscribed before any gateway's id is known, and that
    /// also carries each gateway's retained online/offline presence.
    fn discovery_topic(&self) -> String {
        format!("{}/+", self.base_topic)
    }

    fn rx_topic(&self, gwy_id: &str) -> String {
        format!("{}/{gwy_id}/rx", self.base_topic)
    }

    fn tx_topic(&self, gwy_id: &str) -> String {
        format!("{}/{gwy_id}/tx", self.base_topic)
    }

    /// The `gwy_id` segment of a fully qualified `<base>/<gwy_id>/rx` (or
    /// `/tx`) topic, or `None` for the bare presence topic `<base>/<gwy_id>`.
    fn gwy_id_of<'a>(&self, topic: &'a str) -> Option<&'a str> {
        let rest = topic.strip_prefix(&self.base_topic)?.strip_prefix('/')?;
        rest.strip_suffix("/rx").or_else(|| rest.strip_suffix("/tx"))
    }
}

#[derive(Debug, Deserialize)]
struct RxEnvelope {
    ts: String,
    msg: String,
}

#[derive(Debug, Serialize)]
struct TxEnvelope<'a> {
    msg: &'a str,
}

struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(rate_per_sec: f64) -> Self {
        TokenBucket { capacity: rate_per_sec.max(1.0), tokens: rate_per_sec.max(1.0), refill_per_sec: rate_per_sec, last_refill: Instant::now() }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    fn try_take(&mut self, now: Instant) -> bool {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

pub struct MqttTransport {
    client: AsyncClient,
    eventloop: EventLoop,
    cfg: MqttConfig,
    bucket: TokenBucket,
    reconnect_backoff: Duration,
    /// The gateway id inferred from the first online/data topic seen, once
    /// known (`_make_connection(gwy_id=...)`'s Rust counterpart).
    gwy_id: Option<String>,
    /// Whether the bound gateway is currently reachable; `send` is refused
    /// while this is `false` (LWT `offline`/disconnect).
    online: bool,
}

impl MqttTransport {
    pub async fn connect(cfg: MqttConfig) -> Result<Self> {
        let mut opts = MqttOptions::new(cfg.client_id.clone(), cfg.host.clone(), cfg.port);
        opts.set_keep_alive(cfg.keep_alive);
        let (client, eventloop) = AsyncClient::new(opts, 64);
        client
            .subscribe(cfg.discovery_topic(), QoS::AtLeastOnce)
            .await
            .map_err(|e| Error::Transport(format!("subscribe failed: {e}")))?;
        Ok(MqttTransport {
            client,
            eventloop,
            bucket: TokenBucket::new(cfg.rate_limit_per_sec),
            cfg,
            reconnect_backoff: RECONNECT_INITIAL,
            gwy_id: None,
            online: false,
        })
    }

    /// Bind to a gateway discovered via the wildcard, subscribing its
    /// specific `rx` topic so future deliveries target it directly.
    async fn bind_gateway(&mut self, gwy_id: &str) {
        if self.gwy_id.as_deref() == Some(gwy_id) {
            return;
        }
        info!(gwy_id, "mqtt gateway discovered, subscribing its data topic");
        if let Err(e) = self.client.subscribe(self.cfg.rx_topic(gwy_id), QoS::AtLeastOnce).await {
            warn!(%e, gwy_id, "failed to subscribe gateway rx topic");
            return;
        }
        self.gwy_id = Some(gwy_id.to_string());
        self.online = true;
    }

    fn handle_presence(&mut self, gwy_id: &str, payload: &[u8]) -> bool {
        match payload {
            b"online" => {
                info!(gwy_id, "mqtt gateway online");
                self.online = true;
                true
            }
            b"offline" => {
                if self.gwy_id.as_deref() == Some(gwy_id) {
                    warn!(gwy_id, "mqtt gateway offline (via LWT)");
                    self.online = false;
                }
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn recv(&mut self) -> Option<Packet> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(MqttPacket::Publish(publish))) => {
                    let topic = publish.topic.clone();
                    if let Some(gwy_id) = self.cfg.gwy_id_of(&topic) {
                        if !topic.ends_with("/rx") && !topic.ends_with("/tx") {
                            if self.handle_presence(gwy_id, &publish.payload) {
                                if publish.payload.as_ref() == b"online" {
                                    self.bind_gateway(gwy_id).await;
                                }
                                continue;
                            }
                        }
                    }
                    if !topic.ends_with("/rx") {
                        continue;
                    }
                    let Some(gwy_id) = self.cfg.gwy_id_of(&topic) else { continue };
                    self.bind_gateway(gwy_id).await;

                    let envelope: RxEnvelope = match serde_json::from_slice(&publish.payload) {
                        Ok(env) => env,
                        Err(e) => {
                            debug!(%e, "dropping undecodable mqtt json payload");
                            continue;
                        }
                    };
                    let dtm = match envelope.ts.parse::<chrono::DateTime<chrono::Utc>>() {
                        Ok(dtm) => dtm,
                        Err(_) => chrono::Utc::now(),
                    };
                    match Packet::from_port(dtm, envelope.msg.trim()) {
                        Ok(pkt) => return Some(pkt),
                        Err(e) => {
                            debug!(%e, "dropping malformed mqtt frame");
                            continue;
                        }
                    }
                }
                Ok(_) => continue,
                Err(e) => {
                    let wait = jittered(self.reconnect_backoff);
                    warn!(%e, backoff_secs = wait.as_secs_f64(), "mqtt connection error, backing off");
                    tokio::time::sleep(wait).await;
                    self.online = false;
                    let next = self.reconnect_backoff.mul_f64(RECONNECT_BACKOFF_FACTOR);
                    self.reconnect_backoff = next.min(RECONNECT_MAX);
                    continue;
                }
            }
        }
    }

    async fn send(&mut self, frame_text: &str) -> Result<()> {
        let Some(gwy_id) = self.gwy_id.clone() else {
            return Err(Error::Transport("mqtt: no gateway bound yet".into()));
        };
        if !self.online {
            return Err(Error::Transport("mqtt: gateway is offline".into()));
        }
        let now = Instant::now();
        if !self.bucket.try_take(now) {
            return Err(Error::Transport("mqtt publish rate limit exceeded".into()));
        }
        let envelope = TxEnvelope { msg: frame_text };
        let payload = serde_json::to_vec(&envelope).map_err(|e| Error::Transport(e.to_string()))?;
        self.client
            .publish(self.cfg.tx_topic(&gwy_id), QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| Error::Transport(format!("publish failed: {e}")))?;
        self.reconnect_backoff = RECONNECT_INITIAL;
        Ok(())
    }

    fn can_send(&self) -> bool {
        self.online && self.gwy_id.is_some() && self.bucket.tokens >= 1.0
    }
}
