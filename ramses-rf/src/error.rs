//! Error taxonomy for the device/topology layer (spec.md §7).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Tx(#[from] ramses_tx::Error),

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("unknown zone: {0}")]
    UnknownZone(String),

    #[error("topology error: {0}")]
    Topology(String),

    #[error("eavesdropping inference rejected: {0}")]
    EavesdropRejected(String),

    #[error("schema inconsistent: {0}")]
    SchemaInconsistent(String),

    #[error("state (de)serialization failed: {0}")]
    Decode(String),
}
