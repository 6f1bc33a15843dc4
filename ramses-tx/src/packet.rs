//! A timestamped, optionally-annotated frame as it is logged or replayed
//! (spec.md §3, grounded on `packet.py`).

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::typing::HeaderT;

/// Split a raw packet-log line into `(frame_text, comment, had_error_marker)`,
/// mirroring `Packet._partition`'s `#`-then-`*` split.
fn partition(line: &str) -> (&str, Option<&str>, bool) {
    let (before_comment, comment) = match line.split_once('#') {
        Some((a, b)) => (a, Some(b.trim())),
        None => (line, None),
    };
    let (frame_part, had_error) = match before_comment.split_once('*') {
        Some((a, _)) => (a, true),
        None => (before_comment, false),
    };
    (frame_part.trim(), comment, had_error)
}

/// A frame as received off the wire: carries its arrival time, signal
/// strength, and any trailing log commentary.
#[derive(Debug, Clone)]
pub struct Packet {
    pub dtm: DateTime<Utc>,
    pub rssi: Option<i32>,
    pub frame: Frame,
    pub comment: Option<String>,
    pub is_valid: bool,
}

impl Packet {
    /// Parse a line as it appears in a packet log: `<rssi?> <frame> [# comment]`.
    pub fn from_port(dtm: DateTime<Utc>, line: &str) -> Result<Self> {
        let (frame_text, comment, had_error) = partition(line);
        if frame_text.is_empty() {
            return Err(Error::frame(line, "empty frame after partition"));
        }

        let fields: Vec<&str> = frame_text.split_whitespace().collect();
        let (rssi, rest) = if fields.len() == 8 && fields[0].len() == 3 {
            let rssi = i32::from_str_radix(fields[0], 16).ok();
            (rssi, fields[1..].join(" "))
        } else {
            (None, frame_text.to_string())
        };

        let frame = Frame::parse(&rest)?;
        Ok(Packet {
            dtm,
            rssi,
            frame,
            comment: comment.map(str::to_string),
            is_valid: !had_error,
        })
    }

    /// Parse a line from a stored packet log, tab/space-separated as
    /// `<ISO-8601 dtm> <rssi?> <frame> [# comment]`.
    pub fn from_file(line: &str) -> Result<Self> {
        let (dtm_text, rest) = line
            .split_once(char::is_whitespace)
            .ok_or_else(|| Error::frame(line, "missing timestamp field"))?;
        let dtm = DateTime::parse_from_rfc3339(dtm_text)
            .map_err(|e| Error::frame(line, format!("bad timestamp: {e}")))?
            .with_timezone(&Utc);
        Self::from_port(dtm, rest)
    }

    /// Construct directly from an already-parsed frame (used by replay
    /// sources that hand over structured data rather than log text).
    pub fn from_dict(dtm: DateTime<Utc>, frame: Frame) -> Self {
        Packet { dtm, rssi: None, frame, comment: None, is_valid: true }
    }

    pub fn header(&self) -> Result<HeaderT> {
        self.frame.header()
    }
}

impl std::fmt::Display for Packet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.rssi {
            Some(rssi) => write!(f, "{:03X} {}", rssi, self.frame.format()),
            None => write!(f, "{}", self.frame.format()),
        }
    }
}
