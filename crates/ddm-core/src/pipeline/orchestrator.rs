use std::sync::Arc;

use tracing::info;

use crate::ddm::isf::{compute_isf_with_progress, ImageStructureFunction};
use crate::ddm::lags::log_spaced;
use crate::error::{DdmError, Result};
use crate::fit::decay::fit_decays_with_span;
use crate::fit::particle::stokes_einstein;
use crate::fit::scaling::{fit_scaling, QWindow};
use crate::io::cache::FrameCache;
use crate::io::open_source;
use crate::io::source::FrameSource;

use super::config::AnalysisConfig;
use super::types::{AnalysisOutput, AnalysisStage, NoOpReporter, ProgressReporter};

/// Open `config.input` and run the full analysis with a thread-safe progress reporter.
pub fn run_analysis_reported(
    config: &AnalysisConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<AnalysisOutput> {
    config.validate()?;
    let source = open_source(&config.input, config.channel, config.fps)?;
    info!(
        input = %config.input.display(),
        frames = source.frame_count(),
        width = source.info().width,
        height = source.info().height,
        "Opened frame source"
    );
    analyze_source(source.as_ref(), config, reporter.as_ref())
}

/// Open `config.input` and run the full analysis.
pub fn run_analysis(config: &AnalysisConfig) -> Result<AnalysisOutput> {
    run_analysis_reported(config, Arc::new(NoOpReporter))
}

/// Run the analysis on an already opened source. `config.input` is ignored,
/// `config.fps` still overrides the source's rate.
pub fn analyze_source<S: FrameSource + ?Sized>(
    source: &S,
    config: &AnalysisConfig,
    reporter: &dyn ProgressReporter,
) -> Result<AnalysisOutput> {
    config.validate()?;
    let fps = config.fps.unwrap_or_else(|| source.fps());
    if !(fps.is_finite() && fps > 0.0) {
        return Err(DdmError::InvalidConfig(
            "frame rate unknown; set fps in the configuration".into(),
        ));
    }
    let sampling = &config.sampling;

    let isf = if sampling.preload {
        reporter.begin_stage(AnalysisStage::Caching, Some(source.frame_count()));
        let cache = FrameCache::build_with_progress(source, |n| reporter.advance(n))?;
        reporter.finish_stage();
        structure_function(&cache, config, reporter)?
    } else {
        structure_function(source, config, reporter)?
    };

    let lag_times = isf.lag_times(fps);
    let wavevectors = isf.wavevectors(config.pixel_size);
    // Seeds scale with the range of the whole matrix, not of the fitted lags.
    let span = isf.peak_to_peak();
    let truncated = sampling.tmax.map(|tmax| isf.truncated(tmax));
    let fitted = truncated.as_ref().unwrap_or(&isf);
    let fitted_lags = fitted.lag_count();

    reporter.begin_stage(AnalysisStage::DecayFit, Some(isf.bin_count()));
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(sampling.workers)
        .build()
        .map_err(|e| DdmError::InvalidConfig(format!("cannot start worker pool: {e}")))?;
    let decay = pool.install(|| {
        fit_decays_with_span(fitted, &lag_times[..fitted_lags], span, &config.decay)
    })?;
    reporter.finish_stage();

    reporter.begin_stage(AnalysisStage::Scaling, None);
    let window = config.scaling.window.unwrap_or_else(QWindow::all);
    let scaling = fit_scaling(&wavevectors, &decay, config.scaling.channel, window)?;
    let particle = stokes_einstein(scaling.diffusion, scaling.diffusion_error, &config.physics)?;
    reporter.finish_stage();

    info!(
        diffusion = scaling.diffusion,
        diffusion_error = scaling.diffusion_error,
        exponent = scaling.exponent,
        diameter_um = particle.diameter_um,
        "Analysis complete"
    );

    Ok(AnalysisOutput {
        info: source.info().clone(),
        fps,
        isf,
        lag_times,
        fitted_lags,
        wavevectors,
        decay,
        scaling,
        particle,
    })
}

fn structure_function<S: FrameSource + ?Sized>(
    source: &S,
    config: &AnalysisConfig,
    reporter: &dyn ProgressReporter,
) -> Result<ImageStructureFunction> {
    let sampling = &config.sampling;
    let lags = log_spaced(source.frame_count(), sampling.points_per_decade)?;
    if lags.is_empty() {
        return Err(DdmError::InsufficientPoints {
            needed: 2,
            got: source.frame_count(),
        });
    }
    info!(
        lags = lags.len(),
        first = lags[0],
        last = lags[lags.len() - 1],
        "Sampled lags"
    );

    reporter.begin_stage(AnalysisStage::StructureFunction, Some(lags.len()));
    let isf = compute_isf_with_progress(
        source,
        &lags,
        sampling.max_couples,
        sampling.workers,
        |n| reporter.advance(n),
    )?;
    reporter.finish_stage();
    Ok(isf)
}
