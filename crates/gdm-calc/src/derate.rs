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

use crate::model::{DerateInputs, DerateModel};

/// Flags marking which inputs were unavailable for a calculation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingInputs {
    pub outdoor_temp: bool,
    pub generator_temp: bool,
    pub altitude: bool,
}

impl MissingInputs {
    pub fn any(&self) -> bool {
        self.outdoor_temp || self.generator_temp || self.altitude
    }
}

/// Outcome of one derate calculation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Derating {
    /// Output current in amps, clamped to `[floor, ceiling]`.
    pub amps: f64,
    /// Degrees above the temperature reference that drove the derate.
    pub temp_excess: f64,
    /// Altitude units above the altitude reference.
    pub altitude_excess: f64,
    /// Inputs that had to fall back to their reference value.
    pub missing: MissingInputs,
}

/// Compute the derated output current for one sensor snapshot.
///
/// The worse of the two temperature readings drives the thermal derate;
/// neither factor contributes below its reference threshold. Unavailable
/// readings contribute zero excess and are flagged in the result so the
/// caller can surface the degraded calculation, and readings below their
/// reference (including negative altitudes) pass through unchanged.
pub fn derated_output(model: &DerateModel, inputs: &DerateInputs) -> Derating {
    let missing = MissingInputs {
        outdoor_temp: inputs.outdoor_temp.is_none(),
        generator_temp: inputs.generator_temp.is_none(),
        altitude: inputs.altitude.is_none(),
    };

    let outdoor = inputs.outdoor_temp.unwrap_or(model.temp_reference);
    let generator = inputs.generator_temp.unwrap_or(model.temp_reference);
    let altitude = inputs.altitude.unwrap_or(model.altitude_reference);

    let temp_excess = (outdoor.max(generator) - model.temp_reference).max(0.0);
    let altitude_excess = (altitude - model.altitude_reference).max(0.0);

    let ceiling = model.ceiling();
    let derated = ceiling
        - temp_excess * model.temp_derate_coefficient
        - altitude_excess * model.altitude_derate_coefficient;
    let amps = derated.clamp(model.min_output_current, ceiling);

    Derating {
        amps,
        temp_excess,
        altitude_excess,
        missing,
    }
}
