use crate::ddm::isf::ImageStructureFunction;
use crate::fit::decay::DecayFits;
use crate::fit::particle::ParticleSize;
use crate::fit::scaling::ScalingFit;
use crate::frame::SourceInfo;

/// Analysis stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnalysisStage {
    Caching,
    StructureFunction,
    DecayFit,
    Scaling,
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Caching => write!(f, "Caching frames"),
            Self::StructureFunction => write!(f, "Computing structure function"),
            Self::DecayFit => write!(f, "Fitting decays"),
            Self::Scaling => write!(f, "Fitting scaling law"),
        }
    }
}

/// Everything a run produces, from the lag axis to the particle size.
#[derive(Clone, Debug)]
pub struct AnalysisOutput {
    pub info: SourceInfo,
    /// Frame rate the lag times were computed with.
    pub fps: f64,
    /// ISF over every sampled lag, including those past `tmax`.
    pub isf: ImageStructureFunction,
    /// Seconds, one per ISF row.
    pub lag_times: Vec<f64>,
    /// Leading ISF rows the decays were fitted to; the width of `decay.curves`.
    pub fitted_lags: usize,
    /// Radians per micrometre, one per ISF column.
    pub wavevectors: Vec<f64>,
    pub decay: DecayFits,
    pub scaling: ScalingFit,
    pub particle: ParticleSize,
}

impl AnalysisOutput {
    /// Lag times of the rows that entered the decay fits.
    pub fn fitted_lag_times(&self) -> &[f64] {
        &self.lag_times[..self.fitted_lags]
    }
}

/// Thread-safe progress reporting for an analysis run.
///
/// All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new stage has started. `total_items` is the number of work items in
    /// this stage (frames, lags), if known.
    fn begin_stage(&self, _stage: AnalysisStage, _total_items: Option<usize>) {}

    /// `items_done` work items of the current stage have completed.
    fn advance(&self, _items_done: usize) {}

    fn finish_stage(&self) {}
}

pub(super) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}
