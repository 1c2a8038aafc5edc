//! ---
//! gdm_section: "03-derating-model"
//! gdm_subsection: "module"
//! gdm_type: "source"
//! gdm_scope: "code"
//! gdm_description: "Derate calculation routines for the generator monitor."
//! gdm_version: "v0.1.0"
//! gdm_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Validated derating parameters.
///
/// Construction happens at the configuration layer, which enforces the
/// range invariants (positive rated current, non-negative coefficients,
/// floor below the ceiling) before the loop ever runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DerateModel {
    /// Rated output capacity in amps.
    pub rated_output_current: f64,
    /// Amps lost per degree above `temp_reference`.
    pub temp_derate_coefficient: f64,
    /// Temperature at which derating begins.
    pub temp_reference: f64,
    /// Amps lost per altitude unit above `altitude_reference`.
    pub altitude_derate_coefficient: f64,
    /// Altitude at which derating begins.
    pub altitude_reference: f64,
    /// Floor the published limit never drops below.
    pub min_output_current: f64,
    /// Safety buffer applied to the rated current, in (0, 1].
    pub output_safety_factor: f64,
}

impl DerateModel {
    /// The working ceiling in amps: rated current scaled by the buffer.
    pub fn ceiling(&self) -> f64 {
        self.rated_output_current * self.output_safety_factor
    }
}

/// One tick's worth of sensor values. `None` marks a reading the gateway
/// could not supply; the calculator treats it as sitting at its reference.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DerateInputs {
    pub outdoor_temp: Option<f64>,
    pub generator_temp: Option<f64>,
    pub altitude: Option<f64>,
}
