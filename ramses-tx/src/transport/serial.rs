//! Serial (evofw3/HGI80) transport: gateway fingerprint probe, duty-cycle
//! leaky bucket, minimum inter-write gap, and sync-cycle avoidance
//! (spec.md §4.6, grounded on `transport.py`).

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::Instant;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::packet::Packet;
use crate::regex_hack::RegexPipeline;

use super::Transport;

#[derive(Debug, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// Fraction of on-air time allowed per rolling hour (UK 868MHz duty
    /// cycle limit is 1% for this sub-band).
    pub duty_cycle_limit: f64,
    pub min_write_gap: Duration,
    pub probe_timeout: Duration,
    pub regex: RegexPipeline,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: "/dev/ttyUSB0".into(),
            baud_rate: 115_200,
            duty_cycle_limit: 0.01,
            min_write_gap: Duration::from_millis(20),
            probe_timeout: Duration::from_secs(3),
            regex: RegexPipeline::default(),
        }
    }
}

/// Leaky-bucket duty-cycle limiter: tracks on-air seconds used within a
/// rolling hour and refuses writes that would exceed the configured limit.
struct DutyCycle {
    window: Duration,
    limit: f64,
    used: f64,
    last_refill: Instant,
}

impl DutyCycle {
    fn new(limit: f64) -> Self {
        DutyCycle { window: Duration::from_secs(60), limit, used: 0.0, last_refill: Instant::now() }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        let leaked = elapsed * self.limit;
        self.used = (self.used - leaked).max(0.0);
        self.last_refill = now;
    }

    /// On-air time for a frame of `byte_len` bytes, in seconds: 330 bit-slots
    /// for the first 46 bytes (preamble/sync/CRC overhead) plus 10 bit-slots
    /// per additional byte, at the link's baud rate.
    fn airtime_for(&self, byte_len: usize, baud_rate: u32) -> f64 {
        let bit_slots = 330.0 + 10.0 * (byte_len as f64 - 46.0);
        bit_slots.max(0.0) / baud_rate as f64
    }

    fn can_send(&mut self, byte_len: usize, baud_rate: u32, now: Instant) -> bool {
        self.refill(now);
        self.used + self.airtime_for(byte_len, baud_rate) <= self.window.as_secs_f64() * self.limit
    }

    fn record_send(&mut self, byte_len: usize, baud_rate: u32, now: Instant) {
        self.refill(now);
        self.used += self.airtime_for(byte_len, baud_rate);
    }
}

/// Tracks recently-observed `1F09` sync-cycle announcements so writes can
/// avoid colliding with the next sync window (spec.md's supplemented
/// sync-cycle tracking feature; grounded on `protocol/fsm.py::is_imminent`).
struct SyncTracker {
    upcoming: VecDeque<Instant>,
    capacity: usize,
}

impl SyncTracker {
    fn new(capacity: usize) -> Self {
        SyncTracker { upcoming: VecDeque::with_capacity(capacity), capacity }
    }

    fn note_cycle(&mut self, observed_at: Instant, remaining: Duration) {
        if self.upcoming.len() == self.capacity {
            self.upcoming.pop_front();
        }
        self.upcoming.push_back(observed_at + remaining);
    }

    /// Whether `now` falls inside the avoidance window of any tracked sync
    /// cycle: `[0.008s, 0.092s]` before it fires (`fsm.py`'s `lower`/`upper`).
    fn is_imminent(&self, now: Instant) -> bool {
        const LOWER: Duration = Duration::from_millis(8);
        const UPPER: Duration = Duration::from_millis(92);
        self.upcoming.iter().any(|&at| {
            if at <= now {
                false
            } else {
                let until = at - now;
                until >= LOWER && until <= UPPER
            }
        })
    }
}

pub struct SerialTransport {
    reader: BufReader<tokio::io::ReadHalf<tokio_serial::SerialStream>>,
    writer: tokio::io::WriteHalf<tokio_serial::SerialStream>,
    baud_rate: u32,
    duty_cycle: DutyCycle,
    sync_tracker: SyncTracker,
    last_write: Option<Instant>,
    min_write_gap: Duration,
    own_id: Option<String>,
    is_evofw3: Option<bool>,
    regex: RegexPipeline,
}

impl SerialTransport {
    pub async fn open(cfg: SerialConfig) -> Result<Self> {
        let mut port = tokio_serial::new(&cfg.port, cfg.baud_rate)
            .open_native_async()
            .map_err(|e| Error::Transport(format!("failed to open {}: {e}", cfg.port)))?;
        port.set_exclusive(false)
            .map_err(|e| Error::Transport(format!("failed to mark port non-exclusive: {e}")))?;
        let (read_half, write_half) = tokio::io::split(port);

        let mut transport = SerialTransport {
            reader: BufReader::new(read_half),
            writer: write_half,
            baud_rate: cfg.baud_rate,
            duty_cycle: DutyCycle::new(cfg.duty_cycle_limit),
            sync_tracker: SyncTracker::new(16),
            last_write: None,
            min_write_gap: cfg.min_write_gap,
            own_id: None,
            is_evofw3: None,
            regex: cfg.regex,
        };
        transport.probe_fingerprint(cfg.probe_timeout).await;
        Ok(transport)
    }

    /// Send a puzzle packet and wait for the gateway to echo its own
    /// device id back, resolving it away from the `18:000730` sentinel
    /// (spec.md §4.6).
    async fn probe_fingerprint(&mut self, timeout: Duration) {
        if self.writer.write_all(b"!V\r\n").await.is_err() {
            warn!("fingerprint probe write failed, assuming sentinel id");
            return;
        }
        let deadline = Instant::now() + timeout;
        let mut line = String::new();
        while Instant::now() < deadline {
            line.clear();
            let remaining = deadline.saturating_duration_since(Instant::now());
            let read = tokio::time::timeout(remaining, self.reader.read_line(&mut line)).await;
            match read {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(_)) => {
                    if let Some(id) = extract_device_id(&line) {
                        debug!(id, "fingerprint probe resolved gateway id");
                        self.own_id = Some(id);
                        self.is_evofw3 = Some(extract_firmware_kind(&line));
                        return;
                    }
                }
                Ok(Err(_)) => break,
            }
        }
        warn!("fingerprint probe timed out, keeping sentinel id");
    }
}

fn extract_device_id(line: &str) -> Option<String> {
    for token in line.split_whitespace() {
        if token.len() == 9 && token.as_bytes()[2] == b':' && token.starts_with("18:") {
            return Some(token.to_string());
        }
    }
    None
}

/// Whether the probe reply identifies evofw3 firmware rather than HGI80
/// (spec.md §4.6: only evofw3 firmware rewrites the `18:000730` sentinel).
fn extract_firmware_kind(line: &str) -> bool {
    line.to_ascii_lowercase().contains("evofw3")
}

#[async_trait]
impl Transport for SerialTransport {
    async fn recv(&mut self) -> Option<Packet> {
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {
                    let trimmed = line.trim_end();
                    if trimmed.is_empty() {
                        continue;
                    }
                    let normalised = self.regex.apply_inbound(trimmed);
                    match Packet::from_port(chrono::Utc::now(), &normalised) {
                        Ok(pkt) => {
                            if pkt.frame.code == 0x1F09 && pkt.frame.verb == crate::frame::Verb::I
                            {
                                if let Some(remaining) = pkt
                                    .frame
                                    .payload
                                    .get(2..6)
                                    .and_then(|h| u32::from_str_radix(h, 16).ok())
                                {
                                    self.sync_tracker.note_cycle(
                                        Instant::now(),
                                        Duration::from_millis(remaining as u64 * 100),
                                    );
                                }
                            }
                            return Some(pkt);
                        }
                        Err(_) => continue,
                    }
                }
            }
        }
    }

    async fn send(&mut self, frame_text: &str) -> Result<()> {
        let frame_text = &self.regex.apply_outbound(frame_text);
        let now = Instant::now();
        while self.sync_tracker.is_imminent(now) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if let Some(last) = self.last_write {
            let since = now.saturating_duration_since(last);
            if since < self.min_write_gap {
                tokio::time::sleep(self.min_write_gap - since).await;
            }
        }
        // The duty-cycle budget leaks continuously: rather than fail the
        // send outright, wait for enough of it to refill (spec.md §4.6).
        loop {
            let now = Instant::now();
            if self.duty_cycle.can_send(frame_text.len(), self.baud_rate, now) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let now = Instant::now();
        self.writer
            .write_all(format!("{frame_text}\r\n").as_bytes())
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;
        self.duty_cycle.record_send(frame_text.len(), self.baud_rate, now);
        self.last_write = Some(now);
        Ok(())
    }

    fn can_send(&self) -> bool {
        self.last_write
            .map(|last| Instant::now().saturating_duration_since(last) >= self.min_write_gap)
            .unwrap_or(true)
    }

    fn own_id(&self) -> Option<&str> {
        self.own_id.as_deref()
    }

    fn is_evofw3(&self) -> Option<bool> {
        self.is_evofw3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_cycle_leaks_at_the_configured_rate() {
        let mut dc = DutyCycle::new(0.01);
        let t0 = Instant::now();
        assert!(dc.can_send(100, 115_200, t0));
        dc.record_send(100, 115_200, t0);
        assert!(dc.used > 0.0);
    }

    #[test]
    fn sync_tracker_flags_the_avoidance_window() {
        let mut tracker = SyncTracker::new(4);
        let now = Instant::now();
        tracker.note_cycle(now, Duration::from_millis(50));
        assert!(tracker.is_imminent(now));
    }

    #[test]
    fn sync_tracker_ignores_cycles_outside_the_window() {
        let mut tracker = SyncTracker::new(4);
        let now = Instant::now();
        tracker.note_cycle(now, Duration::from_secs(5));
        assert!(!tracker.is_imminent(now));
    }

    #[test]
    fn extracts_a_plausible_gateway_id_from_a_probe_reply() {
        let line = "# evofw3 HGI80 18:000730 rev3\r\n";
        assert_eq!(extract_device_id(line), Some("18:000730".to_string()));
    }

    #[test]
    fn classifies_evofw3_vs_hgi80_firmware_replies() {
        assert!(extract_firmware_kind("# evofw3 HGI80 18:000730 rev3\r\n"));
        assert!(!extract_firmware_kind("# HGI80 18:000730 rev1\r\n"));
    }
}
