//! Host-driven ingress: the embedding application pushes packets in and
//! drains writes out directly, with no physical medium underneath
//! (spec.md §4.8). Starts paused so a host can wire up handlers before
//! traffic begins flowing.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::packet::Packet;

use super::Transport;

pub struct CallbackTransport {
    inbound: mpsc::UnboundedReceiver<Packet>,
    inbound_tx: mpsc::UnboundedSender<Packet>,
    outbound: mpsc::UnboundedSender<String>,
    paused: bool,
}

impl CallbackTransport {
    pub fn new() -> Self {
        let (inbound_tx, inbound) = mpsc::unbounded_channel();
        let (outbound, _drained_by_host) = mpsc::unbounded_channel();
        CallbackTransport { inbound, inbound_tx, outbound, paused: true }
    }

    /// A handle the host can use to push inbound packets in from wherever
    /// it sources them.
    pub fn injector(&self) -> mpsc::UnboundedSender<Packet> {
        self.inbound_tx.clone()
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }
}

impl Default for CallbackTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for CallbackTransport {
    async fn recv(&mut self) -> Option<Packet> {
        if self.paused {
            std::future::pending::<()>().await;
        }
        self.inbound.recv().await
    }

    async fn send(&mut self, frame_text: &str) -> Result<()> {
        let _ = self.outbound.send(frame_text.to_string());
        Ok(())
    }

    fn can_send(&self) -> bool {
        !self.paused
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use chrono::Utc;

    #[tokio::test]
    async fn starts_paused_and_never_recvs_until_resumed() {
        let mut t = CallbackTransport::new();
        assert!(!t.can_send());
        t.resume();
        let frame = Frame::parse("RQ --- 18:000730 01:145038 --:------ 1F09 001 00").unwrap();
        let pkt = Packet::from_dict(Utc::now(), frame);
        t.injector().send(pkt).unwrap();
        let received = t.recv().await;
        assert!(received.is_some());
    }
}
