//! ---
//! gdm_section: "03-derating-model"
//! gdm_subsection: "module"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Derate calculation routines for the generator monitor."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---
//! Pure derating arithmetic. No I/O, no clocks, no state: the control
//! loop owns all of those so this crate stays independently testable.

pub mod derate;
pub mod model;

pub use derate::{derated_output, Derating, MissingInputs};
pub use model::{DerateInputs, DerateModel};
