//! ---
//! gdm_section: "02-gateway-bus"
//! gdm_subsection: "module"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Gateway bus abstraction and typed sensor access."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---
//! Access to the gateway's shared value bus.
//!
//! The bus is a flat namespace of slash-separated topic paths carrying
//! numeric or boolean values, shared with unrelated processes on the
//! gateway. Nothing here assumes exclusive access: every read and write
//! is fallible and the typed layers bound each operation with a timeout.

pub mod error;
pub mod gateway;
pub mod memory;
pub mod sim;

pub use error::{BusError, Result};
pub use gateway::{production_bus, BusValue, OutputPublisher, SensorGateway, ValueBus};
pub use memory::MemoryBus;
pub use sim::{SyntheticBus, SyntheticProfile};
