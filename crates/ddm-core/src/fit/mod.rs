//! From the image structure function to diffusion coefficients and particle size.

pub mod decay;
pub mod levenberg;
pub mod particle;
pub mod scaling;

pub use decay::{
    fit_decays, fit_decays_with_span, DecayFitConfig, DecayFits, DecayModel, DecayParams,
    DecaySeed, FitStatus,
};
pub use levenberg::{levenberg_marquardt, SolverConfig};
pub use particle::{stokes_einstein, ParticleSize, PhysicalConstants};
pub use scaling::{fit_scaling, QWindow, ScalingFit, TimeChannel};
