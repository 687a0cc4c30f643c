//! Differential dynamic microscopy: from frame pairs to the image structure function.

pub mod isf;
pub mod lags;
pub mod radial;
pub mod spectrum;
pub mod time_average;

pub use isf::{compute_isf, compute_isf_with_progress, wavevectors, ImageStructureFunction};
pub use lags::log_spaced;
pub use radial::RadialAverager;
pub use spectrum::{display_ceiling, spectrum_diff, SpectralDifferencer};
pub use time_average::{pair_start_indices, time_averaged};
