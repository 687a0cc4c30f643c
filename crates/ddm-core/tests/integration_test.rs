use std::sync::{Arc, Mutex};

use approx::assert_relative_eq;
use ddm_core::error::DdmError;
use ddm_core::fit::{DecayModel, DecaySeed, FitStatus, QWindow, TimeChannel};
use ddm_core::io::source::FrameSource;
use ddm_core::pipeline::{
    analyze_source, run_analysis, run_analysis_reported, AnalysisConfig, AnalysisStage,
    ProgressReporter,
};
use ddm_core::synth::{brownian_source, write_brownian_ser, BrownianConfig};

struct Quiet;
impl ProgressReporter for Quiet {}

#[derive(Default)]
struct StageLog {
    stages: Mutex<Vec<AnalysisStage>>,
    advanced: Mutex<usize>,
}

impl ProgressReporter for StageLog {
    fn begin_stage(&self, stage: AnalysisStage, _total_items: Option<usize>) {
        self.stages.lock().unwrap().push(stage);
    }

    fn advance(&self, _items_done: usize) {
        *self.advanced.lock().unwrap() += 1;
    }
}

/// Settings for recovering D from the default synthetic recording: one
/// relaxation per bin, fitted between q ≈ 0.49 and 1.37 µm⁻¹ where the spots
/// still carry signal and the decays fit inside the recording.
fn brownian_analysis() -> AnalysisConfig {
    let mut config = AnalysisConfig {
        pixel_size: 1.0,
        ..Default::default()
    };
    config.decay.model = DecayModel::SingleExponential;
    config.scaling.channel = TimeChannel::Tau1;
    config.scaling.window = Some(QWindow::new(0.45, 1.4));
    config
}

fn small_recording() -> BrownianConfig {
    BrownianConfig {
        width: 32,
        height: 32,
        frames: 60,
        particles: 15,
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// End to end
// ---------------------------------------------------------------------------

#[test]
fn test_recovers_diffusion_of_synthetic_particles() {
    let recording = BrownianConfig::default();
    let source = brownian_source(&recording).unwrap();
    let config = brownian_analysis();

    let output = analyze_source(&source, &config, &Quiet).unwrap();

    assert_eq!(output.fps, 10.0);
    assert_eq!(output.isf.lags.len(), output.lag_times.len());
    assert_eq!(output.wavevectors.len(), output.isf.bin_count());
    assert_eq!((output.scaling.iq_min, output.scaling.iq_max), (5, 15));

    for k in output.scaling.iq_min..output.scaling.iq_max {
        let status = output.decay.status[k];
        assert!(
            status.has_params() && status != FitStatus::NonPhysical,
            "bin {k}: {status}"
        );
    }
    assert_relative_eq!(output.scaling.diffusion, recording.diffusion, max_relative = 0.3);
    assert!(
        (1.5..2.5).contains(&output.scaling.exponent),
        "exponent {}",
        output.scaling.exponent
    );
    assert!(output.particle.diameter_um > 0.0);
    assert!(output.particle.error_um > 0.0);
}

#[test]
fn test_single_spot_double_exponential_recovers_diffusion() {
    // One spot, 500 frames of 64x64, 30 lags per decade, 10 pairs per lag.
    let recording = BrownianConfig {
        particles: 1,
        seed: 6,
        ..Default::default()
    };
    let source = brownian_source(&recording).unwrap();

    let mut config = AnalysisConfig {
        pixel_size: 1.0,
        ..Default::default()
    };
    config.sampling.points_per_decade = 30;
    config.sampling.max_couples = 10;
    config.decay.model = DecayModel::DoubleExponential;
    config.decay.seed = DecaySeed::HalfRise;
    config.decay.reduce_unresolved = true;
    config.scaling.channel = TimeChannel::Dominant;
    config.scaling.window = Some(QWindow::new(0.75, 1.9));

    let output = analyze_source(&source, &config, &Quiet).unwrap();

    assert_eq!((output.scaling.iq_min, output.scaling.iq_max), (8, 20));
    assert_eq!(output.scaling.points, 12);
    for k in output.scaling.iq_min..output.scaling.iq_max {
        assert_eq!(output.decay.status[k], FitStatus::Converged, "bin {k}");
    }
    assert_relative_eq!(output.scaling.diffusion, recording.diffusion, max_relative = 0.1);
}

#[test]
fn test_ser_recording_through_run_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("brownian.ser");
    let recording = BrownianConfig::default();
    write_brownian_ser(&path, &recording, 16).unwrap();

    let config = AnalysisConfig {
        input: path,
        ..brownian_analysis()
    };
    let output = run_analysis(&config).unwrap();

    assert_eq!(output.info.total_frames, 500);
    assert_eq!(output.info.shape(), (64, 64));
    assert_relative_eq!(output.fps, 10.0, max_relative = 1e-3);
    assert_relative_eq!(output.scaling.diffusion, recording.diffusion, max_relative = 0.3);
}

// ---------------------------------------------------------------------------
// Pipeline options
// ---------------------------------------------------------------------------

#[test]
fn test_preload_does_not_change_results() {
    let source = brownian_source(&small_recording()).unwrap();
    let mut config = AnalysisConfig {
        pixel_size: 1.0,
        ..Default::default()
    };
    config.decay.model = DecayModel::SingleExponential;

    config.sampling.preload = true;
    let cached = analyze_source(&source, &config, &Quiet).unwrap();
    config.sampling.preload = false;
    let direct = analyze_source(&source, &config, &Quiet).unwrap();

    assert_eq!(cached.isf.data, direct.isf.data);
    assert_eq!(cached.isf.lags, direct.isf.lags);
    assert_eq!(cached.scaling, direct.scaling);
}

#[test]
fn test_stages_reported_in_order() {
    let source = brownian_source(&small_recording()).unwrap();
    let mut config = AnalysisConfig::default();
    config.decay.model = DecayModel::SingleExponential;

    let log = StageLog::default();
    analyze_source(&source, &config, &log).unwrap();
    assert_eq!(
        *log.stages.lock().unwrap(),
        vec![
            AnalysisStage::Caching,
            AnalysisStage::StructureFunction,
            AnalysisStage::DecayFit,
            AnalysisStage::Scaling,
        ]
    );
    assert!(*log.advanced.lock().unwrap() >= source.frame_count());

    config.sampling.preload = false;
    let log = StageLog::default();
    analyze_source(&source, &config, &log).unwrap();
    assert_eq!(log.stages.lock().unwrap()[0], AnalysisStage::StructureFunction);
}

#[test]
fn test_tmax_limits_fitted_lags() {
    let source = brownian_source(&small_recording()).unwrap();
    let mut config = AnalysisConfig::default();
    config.decay.model = DecayModel::SingleExponential;
    config.sampling.tmax = Some(12);

    let output = analyze_source(&source, &config, &Quiet).unwrap();
    assert_eq!(output.fitted_lags, 12);
    assert_eq!(output.fitted_lag_times().len(), 12);
    assert_eq!(output.decay.curves.ncols(), 12);
    assert!(output.isf.lag_count() > 12);
    assert_eq!(output.lag_times.len(), output.isf.lag_count());
    assert_relative_eq!(output.lag_times[0], output.isf.lags[0] as f64 / 10.0);

    // The untruncated run sees the same matrix and fits every lag.
    config.sampling.tmax = None;
    let full = analyze_source(&source, &config, &Quiet).unwrap();
    assert_eq!(full.isf.data, output.isf.data);
    assert_eq!(full.fitted_lags, full.isf.lag_count());
}

#[test]
fn test_tmax_keeps_seed_amplitude_of_full_matrix() {
    let source = brownian_source(&small_recording()).unwrap();
    let mut config = AnalysisConfig::default();
    config.decay.solver.max_iterations = 0;

    let full = analyze_source(&source, &config, &Quiet).unwrap();
    config.sampling.tmax = Some(5);
    let short = analyze_source(&source, &config, &Quiet).unwrap();

    // Without iterations the decay rows hold the seeds.
    let half_ptp = full.isf.peak_to_peak() / 2.0;
    assert_eq!(short.isf.data, full.isf.data);
    assert_eq!(short.decay.curves.ncols(), 5);
    for bin in 1..full.decay.bin_count() {
        assert_eq!(full.decay.params[[bin, 0]], half_ptp);
        assert_eq!(short.decay.params[[bin, 0]], half_ptp);
        assert_eq!(short.decay.params[[bin, 2]], half_ptp);
    }
}

#[test]
fn test_fps_override() {
    let source = brownian_source(&small_recording()).unwrap();
    let mut config = AnalysisConfig {
        fps: Some(20.0),
        ..Default::default()
    };
    config.decay.model = DecayModel::SingleExponential;

    let output = analyze_source(&source, &config, &Quiet).unwrap();
    assert_eq!(output.fps, 20.0);
    assert_relative_eq!(output.lag_times[0], output.isf.lags[0] as f64 / 20.0);
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

#[test]
fn test_image_sequence_requires_fps() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..3 {
        image::GrayImage::new(4, 4)
            .save(dir.path().join(format!("{i}.png")))
            .unwrap();
    }
    let config = AnalysisConfig {
        input: dir.path().to_path_buf(),
        ..Default::default()
    };
    assert!(matches!(
        run_analysis_reported(&config, Arc::new(Quiet)),
        Err(DdmError::InvalidConfig(_))
    ));
}

#[test]
fn test_unsupported_input() {
    let config = AnalysisConfig {
        input: "recording.avi".into(),
        ..Default::default()
    };
    assert!(matches!(
        run_analysis(&config),
        Err(DdmError::SourceUnavailable { .. })
    ));
}

#[test]
fn test_single_frame_has_nothing_to_analyze() {
    let source = brownian_source(&BrownianConfig {
        frames: 1,
        ..small_recording()
    })
    .unwrap();
    assert!(matches!(
        analyze_source(&source, &AnalysisConfig::default(), &Quiet),
        Err(DdmError::InsufficientPoints { .. })
    ));
}
