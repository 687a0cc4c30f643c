use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::consts::{
    BOLTZMANN, DEFAULT_TEMPERATURE_ERROR_K, DEFAULT_TEMPERATURE_K, DEFAULT_VISCOSITY_PA_S,
    UM2_PER_M2, UM_PER_M,
};
use crate::error::{DdmError, Result};

/// Sample conditions entering the Stokes-Einstein relation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicalConstants {
    /// J/K
    pub boltzmann: f64,
    /// K
    pub temperature: f64,
    /// K
    pub temperature_error: f64,
    /// Pa·s
    pub viscosity: f64,
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self {
            boltzmann: BOLTZMANN,
            temperature: DEFAULT_TEMPERATURE_K,
            temperature_error: DEFAULT_TEMPERATURE_ERROR_K,
            viscosity: DEFAULT_VISCOSITY_PA_S,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleSize {
    pub diameter_um: f64,
    pub error_um: f64,
}

/// Hydrodynamic diameter `d = k_B·T / (3π·η·D)` for D in µm²/s.
///
/// The error combines the relative errors of D and T in quadrature.
pub fn stokes_einstein(
    diffusion_um2_s: f64,
    diffusion_error: f64,
    constants: &PhysicalConstants,
) -> Result<ParticleSize> {
    if !(diffusion_um2_s.is_finite() && diffusion_um2_s > 0.0) {
        return Err(DdmError::FitNonConvergence(format!(
            "cannot size particles from D = {diffusion_um2_s}"
        )));
    }
    if !(constants.temperature > 0.0 && constants.viscosity > 0.0) {
        return Err(DdmError::InvalidConfig(
            "temperature and viscosity must be positive".into(),
        ));
    }

    let d_m2_s = diffusion_um2_s / UM2_PER_M2;
    let diameter_m =
        constants.boltzmann * constants.temperature / (3.0 * PI * constants.viscosity * d_m2_s);
    let diameter_um = diameter_m * UM_PER_M;

    let rel_d = diffusion_error / diffusion_um2_s;
    let rel_t = constants.temperature_error / constants.temperature;
    let error_um = diameter_um * (rel_d * rel_d + rel_t * rel_t).sqrt();

    Ok(ParticleSize {
        diameter_um,
        error_um,
    })
}
