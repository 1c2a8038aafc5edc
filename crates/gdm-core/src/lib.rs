//! ---
//! gdm_section: "04-control-loop"
//! gdm_subsection: "module"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Polling control loop and state machine."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---
//! The stateful heart of the monitor: a single polling loop that keeps
//! the published current limit in step with the sensors and the operator
//! switch. Everything that can fail at runtime is absorbed here; only
//! configuration problems are allowed to stop the process.

pub mod monitor;
pub mod state;

pub use monitor::DerateMonitor;
pub use state::{LoopState, SwitchDebouncer};
