//! Wire-level RAMSES-II support: frame/packet codec, the send/echo/reply
//! protocol state machine, pluggable transports, and message filtering.

pub mod address;
pub mod command;
pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod fsm;
pub mod packet;
pub mod payload;
pub mod regex_hack;
pub mod transport;
pub mod typing;

pub use address::{DeviceClass, DeviceId};
pub use command::{Command, Priority, QosParams, SendParams, PUZZLE_CODE};
pub use error::{Error, Result};
pub use frame::{Frame, Verb};
pub use fsm::{FsmState, Outcome, ProtocolFsm};
pub use packet::Packet;
pub use payload::{HeatingMode, Payload};
pub use typing::HeaderT;
