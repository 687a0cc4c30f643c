pub mod config;
mod orchestrator;
mod types;

pub use config::{AnalysisConfig, SamplingConfig, ScalingConfig};
pub use orchestrator::{analyze_source, run_analysis, run_analysis_reported};
pub use types::{AnalysisOutput, AnalysisStage, ProgressReporter};
