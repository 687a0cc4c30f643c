use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_MAX_COUPLES, DEFAULT_PIXEL_SIZE_UM, DEFAULT_POINTS_PER_DECADE};
use crate::error::{DdmError, Result};
use crate::fit::decay::DecayFitConfig;
use crate::fit::particle::PhysicalConstants;
use crate::fit::scaling::{QWindow, TimeChannel};
use crate::frame::ChannelSelection;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub input: PathBuf,
    /// Overrides the rate stored in the recording. Required for image sequences.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
    #[serde(default)]
    pub channel: ChannelSelection,
    /// Micrometres per pixel.
    #[serde(default = "default_pixel_size")]
    pub pixel_size: f64,
    #[serde(default)]
    pub sampling: SamplingConfig,
    #[serde(default)]
    pub decay: DecayFitConfig,
    #[serde(default)]
    pub scaling: ScalingConfig,
    #[serde(default)]
    pub physics: PhysicalConstants,
}

fn default_pixel_size() -> f64 {
    DEFAULT_PIXEL_SIZE_UM
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            fps: None,
            channel: ChannelSelection::default(),
            pixel_size: DEFAULT_PIXEL_SIZE_UM,
            sampling: SamplingConfig::default(),
            decay: DecayFitConfig::default(),
            scaling: ScalingConfig::default(),
            physics: PhysicalConstants::default(),
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(fps) = self.fps {
            if !(fps.is_finite() && fps > 0.0) {
                return Err(DdmError::InvalidConfig(format!(
                    "fps must be positive, got {fps}"
                )));
            }
        }
        if !(self.pixel_size.is_finite() && self.pixel_size > 0.0) {
            return Err(DdmError::InvalidConfig(format!(
                "pixel size must be positive, got {}",
                self.pixel_size
            )));
        }
        self.sampling.validate()?;
        if let Some(window) = self.scaling.window {
            if !(window.q_min < window.q_max) {
                return Err(DdmError::InvalidConfig(format!(
                    "empty q window [{}, {})",
                    window.q_min, window.q_max
                )));
            }
        }
        Ok(())
    }
}

/// Which lags are evaluated and how many frame pairs each one averages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub points_per_decade: usize,
    /// Cap on frame pairs per lag.
    pub max_couples: usize,
    /// Worker threads; 0 uses every core.
    pub workers: usize,
    /// Keep only this many leading lags for fitting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tmax: Option<usize>,
    /// Decode every frame into memory before differencing.
    pub preload: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            points_per_decade: DEFAULT_POINTS_PER_DECADE,
            max_couples: DEFAULT_MAX_COUPLES,
            workers: 0,
            tmax: None,
            preload: true,
        }
    }
}

impl SamplingConfig {
    fn validate(&self) -> Result<()> {
        if self.points_per_decade == 0 {
            return Err(DdmError::InvalidConfig(
                "points_per_decade must be at least 1".into(),
            ));
        }
        if self.max_couples == 0 {
            return Err(DdmError::InvalidConfig(
                "max_couples must be at least 1".into(),
            ));
        }
        if self.tmax == Some(0) {
            return Err(DdmError::InvalidConfig("tmax must keep at least one lag".into()));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    pub channel: TimeChannel,
    /// Wavevector range for the power-law fit; every positive q when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window: Option<QWindow>,
}
