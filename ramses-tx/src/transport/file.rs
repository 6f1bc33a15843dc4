//! Read-only replay of a stored packet log, for deterministic testing and
//! offline analysis (spec.md §4.8).

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::packet::Packet;

use super::Transport;

#[derive(Debug, Clone)]
pub struct FileConfig {
    pub path: String,
}

pub struct FileTransport {
    lines: Mutex<BufReader<tokio::fs::File>>,
}

impl FileTransport {
    pub async fn open(cfg: FileConfig) -> Result<Self> {
        let file = tokio::fs::File::open(&cfg.path)
            .await
            .map_err(|e| Error::Transport(format!("failed to open {}: {e}", cfg.path)))?;
        Ok(FileTransport { lines: Mutex::new(BufReader::new(file)) })
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn recv(&mut self) -> Option<Packet> {
        let mut reader = self.lines.lock().await;
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) | Err(_) => return None,
                Ok(_) => {
                    let trimmed = line.trim_end();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if let Ok(pkt) = Packet::from_file(trimmed) {
                        return Some(pkt);
                    }
                }
            }
        }
    }

    async fn send(&mut self, _frame_text: &str) -> Result<()> {
        Err(Error::Transport("file replay is read-only".into()))
    }

    fn can_send(&self) -> bool {
        false
    }
}
