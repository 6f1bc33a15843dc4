//! Device, zone and system topology built from a RAMSES-II message stream.

pub mod device;
pub mod eavesdrop;
pub mod error;
pub mod gateway;
pub mod index;
pub mod system;
pub mod topology;
pub mod zone;

pub use error::{Error, Result};
pub use gateway::{Gateway, GatewayState};
pub use index::{Message, MessageIndex, Selector};
pub use system::{FaultLogEntry, System, SystemCapabilities};
pub use topology::Topology;
pub use zone::{DhwZone, Zone, ZoneClass};
