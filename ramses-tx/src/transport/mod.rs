//! Pluggable ingress/egress for frames: exactly one transport is active at a
//! time (spec.md §4.6–§4.8).

mod callback;
mod file;
mod mqtt;
mod serial;

pub use callback::CallbackTransport;
pub use file::FileTransport;
pub use mqtt::MqttTransport;
pub use serial::SerialTransport;

use async_trait::async_trait;

use crate::error::Result;
use crate::packet::Packet;

/// Everything the FSM and gateway need from whatever is actually moving
/// bytes: read the next received packet, write a frame, and report whether
/// writing is currently permitted (duty-cycle/rate-limit back-pressure).
#[async_trait]
pub trait Transport: Send {
    /// Block until the next inbound packet is available, or the transport
    /// closes.
    async fn recv(&mut self) -> Option<Packet>;

    /// Write one frame's wire text. Transports that are read-only (file
    /// replay) reject every write with `Error::Transport`.
    async fn send(&mut self, frame_text: &str) -> Result<()>;

    /// Whether `send` would currently be accepted without blocking on
    /// duty-cycle or rate-limit back-pressure.
    fn can_send(&self) -> bool {
        true
    }

    /// The gateway's own device id, once known (spec.md §4.6: resolved by
    /// the serial transport's fingerprint probe; fixed for other kinds).
    fn own_id(&self) -> Option<&str> {
        None
    }

    /// Whether the attached firmware is evofw3 rather than HGI80, once
    /// known (spec.md §4.6). Only the serial fingerprint probe can ever
    /// resolve this; other transports report `None`.
    fn is_evofw3(&self) -> Option<bool> {
        None
    }
}

/// Exactly one of these may be configured at a time (spec.md §4.6, "exactly
/// one of" constraint enforced by the factory).
pub enum TransportConfig {
    Serial(serial::SerialConfig),
    Mqtt(mqtt::MqttConfig),
    File(file::FileConfig),
    Callback,
}

pub async fn build(config: TransportConfig) -> Result<Box<dyn Transport>> {
    match config {
        TransportConfig::Serial(cfg) => Ok(Box::new(SerialTransport::open(cfg).await?)),
        TransportConfig::Mqtt(cfg) => Ok(Box::new(MqttTransport::connect(cfg).await?)),
        TransportConfig::File(cfg) => Ok(Box::new(FileTransport::open(cfg).await?)),
        TransportConfig::Callback => Ok(Box::new(CallbackTransport::new())),
    }
}
