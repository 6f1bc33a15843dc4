//! The per-gateway send/echo/reply/retry state machine (spec.md §4.5),
//! grounded on `protocol/fsm.py` and `protocol/qos.py`.

use std::time::Duration;

use tokio::time::Instant;

use crate::address::DeviceId;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::typing::HeaderT;

/// The `0418|RP` payload meaning "no fault logged at this index" — accepted
/// as a valid reply even when its header doesn't otherwise match
/// (`protocol/fsm.py`'s special case for empty fault-log slots).
const NULL_FAULT_LOG_PAYLOAD: &str = "000000B0000000000000000000007FFFFF7000000000";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsmState {
    Inactive,
    Idle,
    WantEcho,
    WantRply,
}

/// Exponential retry backoff, capped at 2^3 (`protocol/qos.py::QosManager`).
#[derive(Debug, Default)]
struct Backoff {
    multiplier: u8,
}

impl Backoff {
    fn get_and_update_delay(&mut self, base: Duration) -> (Duration, u8) {
        let old = self.multiplier;
        let delay = base * 2u32.pow(self.multiplier as u32);
        self.multiplier = self.multiplier.saturating_sub(1);
        (delay, old)
    }

    fn restore(&mut self, old_multiplier: u8) {
        self.multiplier = (old_multiplier + 1).min(3);
    }
}

struct QueuedCmd {
    cmd: Command,
    tx_header: HeaderT,
}

struct Pending {
    cmd: Command,
    tx_header: HeaderT,
    rx_header: Option<HeaderT>,
    retries_left: u8,
    is_echo_phase: bool,
    deadline: Instant,
    send_deadline: Instant,
}

/// What the caller (the gateway's event loop) should do after feeding the
/// FSM a packet or a timeout tick.
pub enum Outcome {
    /// Nothing resolved yet; keep waiting.
    Ignored,
    /// The header of the command that has now been fully satisfied.
    Completed(HeaderT),
    /// Retries remain: rewrite the same command to the transport.
    Retry { cmd: Command, tx_header: HeaderT },
    /// Retries exhausted, or the overall send timeout expired.
    Failed { header: HeaderT, reason: String },
}

/// Drop the last `|ctx` segment, for the loose match the fault-log special
/// case needs (spec.md §4.5 edge case).
fn header_prefix(h: &HeaderT) -> &str {
    h.as_str().rsplit_once('|').map(|(p, _)| p).unwrap_or(h.as_str())
}

/// A single-gateway-at-a-time protocol state machine: at most one command
/// in flight, a bounded priority queue behind it (spec.md §4.5, §5).
pub struct ProtocolFsm {
    state: FsmState,
    queue: Vec<QueuedCmd>,
    pending: Option<Pending>,
    backoff: Backoff,
    max_queue: usize,
}

impl ProtocolFsm {
    pub fn new(max_queue: usize) -> Self {
        ProtocolFsm {
            state: FsmState::Inactive,
            queue: Vec::new(),
            pending: None,
            backoff: Backoff::default(),
            max_queue,
        }
    }

    pub fn state(&self) -> FsmState {
        self.state
    }

    pub fn connection_made(&mut self) {
        if self.state == FsmState::Inactive {
            self.state = FsmState::Idle;
        }
    }

    pub fn connection_lost(&mut self) {
        self.state = FsmState::Inactive;
        self.pending = None;
        self.queue.clear();
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.state == FsmState::Idle
    }

    /// Enqueue a command. If the queue is already at capacity the new
    /// command is rejected outright with [`Error::SendBufferOverflow`] —
    /// nothing already queued is ever evicted to make room (spec.md §4.5
    /// overflow rule).
    pub fn enqueue(&mut self, cmd: Command, src: &DeviceId) -> Result<HeaderT> {
        let tx_header = cmd.tx_header(src)?;
        if self.queue.len() >= self.max_queue {
            return Err(Error::SendBufferOverflow { header: tx_header });
        }
        let priority = cmd.send.priority;
        let pos = self
            .queue
            .iter()
            .position(|q| q.cmd.send.priority < priority)
            .unwrap_or(self.queue.len());
        self.queue.insert(pos, QueuedCmd { cmd, tx_header: tx_header.clone() });
        Ok(tx_header)
    }

    /// If idle and something is queued, start sending it: moves to
    /// `WantEcho` and returns the command for the transport to write.
    pub fn take_next(&mut self, src: &DeviceId, now: Instant) -> Option<(Command, HeaderT)> {
        if self.state != FsmState::Idle || self.queue.is_empty() {
            return None;
        }
        let queued = self.queue.remove(0);
        let rx_header = queued.cmd.rx_header(src).ok().flatten();
        let (delay, _old) = self.backoff.get_and_update_delay(queued.cmd.qos.echo_timeout);
        let pending = Pending {
            cmd: queued.cmd.clone(),
            tx_header: queued.tx_header.clone(),
            rx_header,
            retries_left: queued.cmd.qos.max_retries,
            is_echo_phase: true,
            deadline: now + delay,
            send_deadline: now + queued.cmd.qos.timeout,
        };
        self.pending = Some(pending);
        self.state = FsmState::WantEcho;
        Some((queued.cmd, queued.tx_header))
    }

    /// Called on a regular tick; resolves expired echo/reply waits.
    pub fn check_timeout(&mut self, now: Instant) -> Outcome {
        let Some(pending) = self.pending.as_mut() else {
            return Outcome::Ignored;
        };
        if now < pending.deadline {
            return Outcome::Ignored;
        }
        if now >= pending.send_deadline {
            let header = pending.tx_header.clone();
            self.pending = None;
            self.state = FsmState::Idle;
            return Outcome::Failed {
                header,
                reason: "global send timeout exceeded".into(),
            };
        }
        if pending.retries_left == 0 {
            let header = pending.tx_header.clone();
            self.pending = None;
            self.state = FsmState::Idle;
            return Outcome::Failed {
                header,
                reason: "retries exhausted".into(),
            };
        }
        pending.retries_left -= 1;
        let base = if pending.is_echo_phase {
            pending.cmd.qos.echo_timeout
        } else {
            pending.cmd.qos.reply_timeout
        };
        let (delay, old) = self.backoff.get_and_update_delay(base);
        self.backoff.restore(old);
        pending.deadline = now + delay;
        Outcome::Retry { cmd: pending.cmd.clone(), tx_header: pending.tx_header.clone() }
    }

    /// Feed a received packet's header/payload to the FSM.
    pub fn on_packet(&mut self, header: &HeaderT, payload: &str, now: Instant) -> Outcome {
        let Some(pending) = self.pending.as_mut() else {
            return Outcome::Ignored;
        };

        if *header == pending.tx_header {
            if !pending.is_echo_phase {
                // Late echo while awaiting the reply: ignored (spec.md §4.5).
                return Outcome::Ignored;
            }
            match pending.rx_header.clone() {
                None => {
                    let done = pending.tx_header.clone();
                    self.pending = None;
                    self.state = FsmState::Idle;
                    Outcome::Completed(done)
                }
                Some(rx_header) => {
                    let (delay, _old) =
                        self.backoff.get_and_update_delay(pending.cmd.qos.reply_timeout);
                    pending.is_echo_phase = false;
                    pending.rx_header = Some(rx_header);
                    pending.deadline = now + delay;
                    self.state = FsmState::WantRply;
                    Outcome::Ignored
                }
            }
        } else if let Some(rx_header) = &pending.rx_header {
            let is_null_fault = pending.cmd.code == 0x0418
                && payload == NULL_FAULT_LOG_PAYLOAD
                && header_prefix(header) == header_prefix(rx_header);
            if header == rx_header || is_null_fault {
                let done = rx_header.clone();
                self.pending = None;
                self.state = FsmState::Idle;
                Outcome::Completed(done)
            } else {
                Outcome::Ignored
            }
        } else {
            Outcome::Ignored
        }
    }
}
