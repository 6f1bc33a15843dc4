//! The on-the-wire RAMSES-II frame: parsing, formatting, and header/context
//! derivation (spec.md §3, §4.1, §6).

use std::fmt;

use crate::address::{parse_addresses, AddressKind, DeviceId};
use crate::error::{Error, Result};
use crate::payload::context_for;
use crate::typing::HeaderT;

/// The four verbs a frame can carry (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    I,
    RQ,
    RP,
    W,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::I => "I",
            Verb::RQ => "RQ",
            Verb::RP => "RP",
            Verb::W => "W",
        }
    }

    /// The two-character field as it appears on the wire (space-padded for
    /// the single-letter verbs, per the grammar in spec.md §6).
    pub fn as_wire(&self) -> &'static str {
        match self {
            Verb::I => " I",
            Verb::RQ => "RQ",
            Verb::RP => "RP",
            Verb::W => " W",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "I" => Ok(Verb::I),
            "RQ" => Ok(Verb::RQ),
            "RP" => Ok(Verb::RP),
            "W" => Ok(Verb::W),
            other => Err(Error::frame(other, "unrecognized verb")),
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed, syntactically valid RAMSES-II frame (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub verb: Verb,
    pub seq: Option<u8>,
    pub addr0: DeviceId,
    pub addr1: DeviceId,
    pub addr2: DeviceId,
    pub code: u16,
    pub payload: String, // lowercase/uppercase-preserving hex digits, as received
}

impl Frame {
    /// Parse a frame line (without any leading RSSI). Rejects anything that
    /// does not match the grammar of spec.md §6.
    pub fn parse(text: &str) -> Result<Self> {
        let fields: Vec<&str> = text.split_whitespace().collect();
        if fields.len() != 7 {
            return Err(Error::frame(
                text,
                format!("expected 7 fields, found {}", fields.len()),
            ));
        }
        let [verb, seq, a0, a1, a2, code, len] = fields[..6].try_into().map_err(|_| {
            Error::frame(text, "field count mismatch")
        })?;
        let payload = fields[6];

        let verb = Verb::parse(verb)?;

        let seq = if seq == "---" {
            None
        } else {
            if seq.len() != 3 || !seq.bytes().all(|b| b.is_ascii_digit()) {
                return Err(Error::frame(text, "seq must be '---' or 3 digits"));
            }
            let n: u16 = seq.parse().map_err(|_| Error::frame(text, "seq not numeric"))?;
            if n > 255 {
                return Err(Error::frame(text, "seq out of range 0-255"));
            }
            Some(n as u8)
        };

        let addr0 = DeviceId::parse(a0).map_err(|_| Error::frame(text, "bad addr0"))?;
        let addr1 = DeviceId::parse(a1).map_err(|_| Error::frame(text, "bad addr1"))?;
        let addr2 = DeviceId::parse(a2).map_err(|_| Error::frame(text, "bad addr2"))?;

        if code.len() != 4 || !code.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(Error::frame(text, "code must be 4 hex digits"));
        }
        let code = u16::from_str_radix(code, 16)
            .map_err(|_| Error::frame(text, "code not valid hex"))?;

        if len.len() != 3 || !len.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::frame(text, "len must be 3 digits"));
        }
        let declared_len: usize = len
            .parse()
            .map_err(|_| Error::frame(text, "len not numeric"))?;
        if !(1..=48).contains(&declared_len) {
            return Err(Error::frame(text, "len out of range 1-48"));
        }

        if payload.len() != declared_len * 2
            || !payload.bytes().all(|b| b.is_ascii_hexdigit())
        {
            return Err(Error::frame(
                text,
                format!(
                    "payload length {} does not match declared {} bytes",
                    payload.len() / 2.max(1),
                    declared_len
                ),
            ));
        }

        Ok(Frame {
            verb,
            seq,
            addr0,
            addr1,
            addr2,
            code,
            payload: payload.to_string(),
        })
    }

    /// Format back into the canonical wire grammar. `format(parse(f)) == f`
    /// for every well-formed `f` (spec.md §8, property 1).
    pub fn format(&self) -> String {
        let seq = match self.seq {
            Some(n) => format!("{n:03}"),
            None => "---".to_string(),
        };
        format!(
            "{} {} {} {} {} {:04X} {:03} {}",
            self.verb.as_wire(),
            seq,
            self.addr0,
            self.addr1,
            self.addr2,
            self.code,
            self.payload.len() / 2,
            self.payload,
        )
    }

    /// Resolve the sender/receiver pair (spec.md §4.1).
    pub fn sender_receiver(&self) -> Result<(DeviceId, DeviceId, AddressKind)> {
        parse_addresses(&self.addr0, &self.addr1, &self.addr2)
    }

    fn context(&self) -> String {
        context_for(self.code, self.verb, &self.payload)
    }

    /// The synthetic header `code|verb|sender|context` (spec.md §4.1).
    pub fn header(&self) -> Result<HeaderT> {
        let (sender, _receiver, _kind) = self.sender_receiver()?;
        Ok(HeaderT::new(
            &format!("{:04X}", self.code),
            self.verb.as_str(),
            sender.as_str(),
            &self.context(),
        ))
    }

    /// The header of the reply this frame (if it is a request) would expect:
    /// swap verb and, for RQ, swap sender with destination (spec.md §4.1).
    pub fn rx_header(&self) -> Result<Option<HeaderT>> {
        let (sender, receiver, _kind) = self.sender_receiver()?;
        let reply_verb = match self.verb {
            Verb::RQ => Verb::RP,
            Verb::W => Verb::I,
            Verb::I | Verb::RP => return Ok(None),
        };
        let rx_sender = match self.verb {
            Verb::RQ => receiver,
            _ => sender,
        };
        Ok(Some(HeaderT::new(
            &format!("{:04X}", self.code),
            reply_verb.as_str(),
            rx_sender.as_str(),
            &self.context(),
        )))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}
