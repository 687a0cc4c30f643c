use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use ddm_core::fit::{
    DecayModel, DecaySeed, FitStatus, ParticleSize, QWindow, ScalingFit, TimeChannel,
};
use ddm_core::frame::ChannelSelection;
use ddm_core::pipeline::{
    run_analysis_reported, AnalysisConfig, AnalysisOutput, AnalysisStage, ProgressReporter,
    SamplingConfig, ScalingConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

use crate::summary::{print_analysis_summary, print_results};

#[derive(Clone, Copy, ValueEnum)]
pub enum ModelArg {
    Double,
    Single,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum SeedArg {
    /// Half the ISF range for both amplitudes, column extrema as times
    Extrema,
    /// From each column's half-rise time
    HalfRise,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum TimeChannelArg {
    Tau1,
    Tau2,
    Dominant,
}

#[derive(Args)]
pub struct RunArgs {
    /// Input SER file or directory of frames
    pub file: PathBuf,

    /// Analysis config file (TOML); options other than the input are ignored when given
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Frame rate, overriding the recording's own
    #[arg(long)]
    pub fps: Option<f64>,

    /// Pixel size in micrometres
    #[arg(long, default_value = "0.469")]
    pub pixel_size: f64,

    /// Lags sampled per decade of frame count
    #[arg(long, default_value = "30")]
    pub points_per_decade: usize,

    /// Maximum frame pairs averaged per lag
    #[arg(long, default_value = "10")]
    pub max_couples: usize,

    /// Worker threads (0 = all cores)
    #[arg(long, default_value = "0")]
    pub workers: usize,

    /// Fit only the first N lags
    #[arg(long)]
    pub tmax: Option<usize>,

    /// Use a single colour channel instead of the channel mean
    #[arg(long)]
    pub color_channel: Option<usize>,

    /// Read frames on demand instead of caching the whole recording
    #[arg(long)]
    pub no_preload: bool,

    /// Decay model fitted per wavevector
    #[arg(long, value_enum, default_value = "double")]
    pub model: ModelArg,

    /// Starting point of each decay fit
    #[arg(long, value_enum, default_value = "extrema")]
    pub seed: SeedArg,

    /// Fall back to a single exponential where the double fit is unresolved
    #[arg(long)]
    pub reduce: bool,

    /// Characteristic time scaled against q
    #[arg(long, value_enum, default_value = "dominant")]
    pub tau: TimeChannelArg,

    /// Lower edge of the q window (µm⁻¹)
    #[arg(long)]
    pub q_min: Option<f64>,

    /// Upper edge of the q window (µm⁻¹)
    #[arg(long)]
    pub q_max: Option<f64>,

    /// Write the ISF, fit parameters and results to a TOML report
    #[arg(short, long)]
    pub report: Option<PathBuf>,
}

pub fn run(args: &RunArgs) -> Result<()> {
    let config = if let Some(ref config_path) = args.config {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config {}", config_path.display()))?;
        let mut config: AnalysisConfig =
            toml::from_str(&contents).context("Invalid analysis config")?;
        config.input = args.file.clone();
        config
    } else {
        build_config_from_args(args)
    };

    print_analysis_summary(&config);

    let reporter = Arc::new(BarReporter::new()?);
    let output = run_analysis_reported(&config, reporter.clone())
        .with_context(|| format!("Analysis of {} failed", config.input.display()))?;
    reporter.bar.finish_and_clear();

    print_results(&output);

    if let Some(ref path) = args.report {
        let report = Report::new(&config, &output);
        let toml_str = toml::to_string_pretty(&report)?;
        std::fs::write(path, toml_str)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!(path = %path.display(), "Report written");
        println!("Report saved to {}", path.display());
    }

    Ok(())
}

fn build_config_from_args(args: &RunArgs) -> AnalysisConfig {
    let mut config = AnalysisConfig {
        input: args.file.clone(),
        fps: args.fps,
        channel: args
            .color_channel
            .map_or(ChannelSelection::Mean, ChannelSelection::Channel),
        pixel_size: args.pixel_size,
        sampling: SamplingConfig {
            points_per_decade: args.points_per_decade,
            max_couples: args.max_couples,
            workers: args.workers,
            tmax: args.tmax,
            preload: !args.no_preload,
        },
        scaling: ScalingConfig {
            channel: match args.tau {
                TimeChannelArg::Tau1 => TimeChannel::Tau1,
                TimeChannelArg::Tau2 => TimeChannel::Tau2,
                TimeChannelArg::Dominant => TimeChannel::Dominant,
            },
            window: None,
        },
        ..Default::default()
    };

    config.decay.model = match args.model {
        ModelArg::Double => DecayModel::DoubleExponential,
        ModelArg::Single => DecayModel::SingleExponential,
    };
    config.decay.seed = match args.seed {
        SeedArg::Extrema => DecaySeed::ColumnExtrema,
        SeedArg::HalfRise => DecaySeed::HalfRise,
    };
    config.decay.reduce_unresolved = args.reduce;
    if args.q_min.is_some() || args.q_max.is_some() {
        let all = QWindow::all();
        config.scaling.window = Some(QWindow::new(
            args.q_min.unwrap_or(all.q_min),
            args.q_max.unwrap_or(all.q_max),
        ));
    }
    config
}

/// Drives one progress bar through the analysis stages.
struct BarReporter {
    bar: ProgressBar,
}

impl BarReporter {
    fn new() -> Result<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:30} [{bar:40}] {pos}/{len}")?
                .progress_chars("=> "),
        );
        Ok(Self { bar })
    }
}

impl ProgressReporter for BarReporter {
    fn begin_stage(&self, stage: AnalysisStage, total_items: Option<usize>) {
        self.bar.reset();
        self.bar.set_length(total_items.unwrap_or(1) as u64);
        self.bar.set_message(stage.to_string());
    }

    fn advance(&self, items_done: usize) {
        self.bar.set_position(items_done as u64);
    }

    fn finish_stage(&self) {
        if let Some(len) = self.bar.length() {
            self.bar.set_position(len);
        }
    }
}

#[derive(Serialize)]
struct Report {
    input: PathBuf,
    fps: f64,
    pixel_size: f64,
    results: Results,
    lags: Vec<usize>,
    lag_times: Vec<f64>,
    /// Leading lags the decays were fitted to.
    fitted_lags: usize,
    wavevectors: Vec<f64>,
    /// One row per lag.
    isf: Vec<Vec<f64>>,
    bins: Vec<BinReport>,
}

#[derive(Serialize)]
struct Results {
    scaling: ScalingFit,
    particle: ParticleSize,
}

#[derive(Serialize)]
struct BinReport {
    q: f64,
    a1: f64,
    tau1: f64,
    a2: f64,
    tau2: f64,
    background: f64,
    model: DecayModel,
    status: FitStatus,
}

impl Report {
    fn new(config: &AnalysisConfig, output: &AnalysisOutput) -> Self {
        let bins = output
            .wavevectors
            .iter()
            .enumerate()
            .map(|(bin, &q)| {
                let p = output.decay.params_at(bin);
                BinReport {
                    q,
                    a1: p.a1,
                    tau1: p.tau1,
                    a2: p.a2,
                    tau2: p.tau2,
                    background: p.background,
                    model: output.decay.models[bin],
                    status: output.decay.status[bin],
                }
            })
            .collect();

        Self {
            input: config.input.clone(),
            fps: output.fps,
            pixel_size: config.pixel_size,
            results: Results {
                scaling: output.scaling.clone(),
                particle: output.particle,
            },
            lags: output.isf.lags.clone(),
            lag_times: output.lag_times.clone(),
            fitted_lags: output.fitted_lags,
            wavevectors: output.wavevectors.clone(),
            isf: output.isf.data.rows().into_iter().map(|r| r.to_vec()).collect(),
            bins,
        }
    }
}
