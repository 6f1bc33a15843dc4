//! Error taxonomy for the wire-level crate (spec.md §7).

use thiserror::Error;

use crate::typing::HeaderT;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the frame codec, transport, and protocol layers.
#[derive(Debug, Error)]
pub enum Error {
    /// A line did not match the RAMSES-II frame grammar, or failed a field check.
    #[error("invalid frame ({reason}): {frame:?}")]
    FrameInvalid { frame: String, reason: String },

    /// The address triple did not resolve to a valid (sender, receiver) pair.
    #[error("invalid address set: {0}")]
    AddressInvalid(String),

    /// The transport failed to open, write, or stay connected.
    #[error("transport error: {0}")]
    Transport(String),

    /// The FSM was asked to do something invalid for its current state.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Retries exhausted or the global send timeout expired.
    #[error("send failed for {header}: {reason}")]
    SendFailed { header: HeaderT, reason: String },

    /// The caller supplied a malformed command before it reached the FSM.
    #[error("invalid command: {0}")]
    CommandInvalid(String),

    /// Src/dst was rejected by the allow/block list.
    #[error("filtered: {0}")]
    FilterRejected(String),

    /// The send queue was full and the newly-submitted command was rejected
    /// outright rather than displacing anything already queued (spec.md
    /// §4.5 overflow rule).
    #[error("send_buffer_overflow: queue full, rejecting {header}")]
    SendBufferOverflow { header: HeaderT },
}

impl Error {
    pub fn frame(frame: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::FrameInvalid {
            frame: frame.into(),
            reason: reason.into(),
        }
    }
}
