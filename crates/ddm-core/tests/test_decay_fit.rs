use ddm_core::ddm::{log_spaced, ImageStructureFunction};
use ddm_core::error::DdmError;
use ddm_core::fit::{
    fit_decays, fit_decays_with_span, DecayFitConfig, DecayModel, DecayParams, DecaySeed,
    FitStatus, SolverConfig,
};
use ndarray::Array2;

const FPS: f64 = 10.0;

fn lag_axis() -> (Vec<usize>, Vec<f64>) {
    let lags = log_spaced(2000, 30).unwrap();
    let times = lags.iter().map(|&l| l as f64 / FPS).collect();
    (lags, times)
}

/// ISF whose columns are exact model curves.
fn synthetic_isf(columns: &[DecayParams]) -> (ImageStructureFunction, Vec<f64>) {
    let (lags, times) = lag_axis();
    let data = Array2::from_shape_fn((times.len(), columns.len()), |(row, bin)| {
        columns[bin].evaluate(times[row])
    });
    (ImageStructureFunction { lags, data }, times)
}

fn assert_close(actual: f64, expected: f64, rel: f64, what: &str) {
    assert!(
        (actual - expected).abs() <= rel * expected.abs(),
        "{what}: {actual} vs {expected}"
    );
}

// ---------------------------------------------------------------------------
// Double exponential
// ---------------------------------------------------------------------------

#[test]
fn test_double_exponential_recovers_parameters() {
    let truth = DecayParams {
        a1: 1000.0,
        tau1: 0.5,
        a2: 5000.0,
        tau2: 20.0,
        background: 10.0,
    };
    let (isf, times) = synthetic_isf(&[truth]);
    let config = DecayFitConfig {
        model: DecayModel::DoubleExponential,
        seed: DecaySeed::Explicit([700.0, 0.35, 6500.0, 26.0, 13.0]),
        ..Default::default()
    };

    let fits = fit_decays(&isf, &times, &config).unwrap();
    assert_eq!(fits.status, vec![FitStatus::Converged]);

    let p = fits.params_at(0);
    assert_close(p.a1, truth.a1, 1e-3, "A1");
    assert_close(p.tau1, truth.tau1, 1e-3, "tau1");
    assert_close(p.a2, truth.a2, 1e-3, "A2");
    assert_close(p.tau2, truth.tau2, 1e-3, "tau2");
    assert_close(p.background, truth.background, 1e-2, "B");
    assert_eq!(p.dominant_tau(), p.tau2);

    for (row, &t) in times.iter().enumerate() {
        assert_close(fits.curves[[0, row]], truth.evaluate(t), 1e-3, "curve");
    }
}

#[test]
fn test_params_layout_and_shapes() {
    let truth = DecayParams {
        a1: 300.0,
        tau1: 1.0,
        a2: 900.0,
        tau2: 30.0,
        background: 5.0,
    };
    let (isf, times) = synthetic_isf(&[truth, truth, truth]);
    let config = DecayFitConfig {
        seed: DecaySeed::Explicit([250.0, 0.8, 1000.0, 25.0, 4.0]),
        ..Default::default()
    };

    let fits = fit_decays(&isf, &times, &config).unwrap();
    assert_eq!(fits.bin_count(), 3);
    assert_eq!(fits.params.dim(), (3, 5));
    assert_eq!(fits.curves.dim(), (3, times.len()));
    assert_eq!(fits.count(FitStatus::Converged), 3);
    assert_eq!(fits.params.row(0), fits.params.row(2));
}

#[test]
fn test_half_rise_seed_resolves_two_populations() {
    let truth = DecayParams {
        a1: 1000.0,
        tau1: 0.5,
        a2: 5000.0,
        tau2: 20.0,
        background: 10.0,
    };
    let (isf, times) = synthetic_isf(&[truth]);
    let config = DecayFitConfig {
        seed: DecaySeed::HalfRise,
        reduce_unresolved: true,
        ..Default::default()
    };

    let fits = fit_decays(&isf, &times, &config).unwrap();
    assert_eq!(fits.status, vec![FitStatus::Converged]);
    assert_eq!(fits.models, vec![DecayModel::DoubleExponential]);
    let p = fits.params_at(0);
    assert_close(p.tau1, truth.tau1, 1e-3, "tau1");
    assert_close(p.tau2, truth.tau2, 1e-3, "tau2");
    assert_close(p.a2, truth.a2, 1e-3, "A2");
}

#[test]
fn test_relaxation_beyond_last_lag_reduces_to_single() {
    // The weak 5000 s component never relaxes within the 185 s of lags.
    let truth = DecayParams {
        a1: 2000.0,
        tau1: 2.0,
        a2: 50.0,
        tau2: 5000.0,
        background: 20.0,
    };
    let (isf, times) = synthetic_isf(&[truth]);
    let last = times[times.len() - 1];
    let mut config = DecayFitConfig {
        seed: DecaySeed::HalfRise,
        ..Default::default()
    };

    let kept = fit_decays(&isf, &times, &config).unwrap();
    assert_eq!(kept.models, vec![DecayModel::DoubleExponential]);
    assert!(kept.params_at(0).tau2 > last);

    config.reduce_unresolved = true;
    let reduced = fit_decays(&isf, &times, &config).unwrap();
    assert_eq!(reduced.models, vec![DecayModel::SingleExponential]);
    assert_eq!(reduced.status, vec![FitStatus::Converged]);
    let p = reduced.params_at(0);
    assert_close(p.tau1, truth.tau1, 1e-2, "tau");
    assert_eq!(p.a2, 0.0);
    assert_eq!(p.dominant_tau(), p.tau1);
}

#[test]
fn test_seed_span_is_independent_of_fitted_lags() {
    let truth = DecayParams {
        a1: 300.0,
        tau1: 1.0,
        a2: 900.0,
        tau2: 30.0,
        background: 5.0,
    };
    let (full, times) = synthetic_isf(&[truth, truth]);
    let short = full.truncated(12);
    // No iterations: the returned parameters are the seed itself.
    let config = DecayFitConfig {
        solver: SolverConfig {
            max_iterations: 0,
            ..Default::default()
        },
        ..Default::default()
    };

    let whole = fit_decays(&full, &times, &config).unwrap();
    let spanned =
        fit_decays_with_span(&short, &times[..12], full.peak_to_peak(), &config).unwrap();
    let local = fit_decays(&short, &times[..12], &config).unwrap();

    let half_ptp = full.peak_to_peak() / 2.0;
    assert_eq!(whole.params[[0, 0]], half_ptp);
    assert_eq!(spanned.params[[0, 0]], half_ptp);
    assert_eq!(spanned.params[[0, 2]], half_ptp);
    assert_eq!(whole.params.column(0), spanned.params.column(0));
    assert!(local.params[[0, 0]] < half_ptp);
    assert_eq!(spanned.status, vec![FitStatus::MaxIterations; 2]);
}

// ---------------------------------------------------------------------------
// Single exponential
// ---------------------------------------------------------------------------

#[test]
fn test_single_exponential_from_half_rise_seed() {
    let columns: Vec<DecayParams> = [0.4, 3.0, 12.0]
        .iter()
        .map(|&tau| DecayParams {
            a1: 2000.0,
            tau1: tau,
            a2: 0.0,
            tau2: tau,
            background: 50.0,
        })
        .collect();
    let (isf, times) = synthetic_isf(&columns);
    let config = DecayFitConfig {
        model: DecayModel::SingleExponential,
        ..Default::default()
    };

    let fits = fit_decays(&isf, &times, &config).unwrap();
    for (bin, truth) in columns.iter().enumerate() {
        assert_eq!(fits.status[bin], FitStatus::Converged, "bin {bin}");
        let p = fits.params_at(bin);
        assert_close(p.a1, truth.a1, 1e-3, "A");
        assert_close(p.tau1, truth.tau1, 1e-3, "tau");
        assert_close(p.background, truth.background, 1e-2, "B");
        assert_eq!(p.a2, 0.0);
        assert_eq!(p.tau2, p.tau1);
        assert_eq!(p.dominant_tau(), p.tau1);
    }
}

// ---------------------------------------------------------------------------
// Flags and errors
// ---------------------------------------------------------------------------

#[test]
fn test_invalid_column_is_flagged_not_fitted() {
    let good = DecayParams {
        a1: 2000.0,
        tau1: 2.0,
        a2: 0.0,
        tau2: 2.0,
        background: 50.0,
    };
    let (mut isf, times) = synthetic_isf(&[good, good]);
    isf.data[[3, 1]] = 0.0;

    let config = DecayFitConfig {
        model: DecayModel::SingleExponential,
        ..Default::default()
    };
    let fits = fit_decays(&isf, &times, &config).unwrap();

    assert_eq!(fits.status[0], FitStatus::Converged);
    assert_eq!(fits.status[1], FitStatus::InvalidData);
    assert!(!fits.status[1].has_params());
    assert!(fits.params.row(1).iter().all(|v| v.is_nan()));
    assert!(fits.curves.row(1).iter().all(|v| v.is_nan()));
}

#[test]
fn test_all_columns_invalid_is_error() {
    let (lags, times) = lag_axis();
    let isf = ImageStructureFunction {
        data: Array2::zeros((lags.len(), 4)),
        lags,
    };
    assert!(matches!(
        fit_decays(&isf, &times, &DecayFitConfig::default()),
        Err(DdmError::FitNonConvergence(_))
    ));
}

#[test]
fn test_non_finite_seed_is_non_physical() {
    let p = DecayParams {
        a1: 100.0,
        tau1: 1.0,
        a2: 100.0,
        tau2: 10.0,
        background: 1.0,
    };
    let (isf, times) = synthetic_isf(&[p]);
    let config = DecayFitConfig {
        seed: DecaySeed::Explicit([f64::NAN, 1.0, 100.0, 10.0, 1.0]),
        ..Default::default()
    };
    let fits = fit_decays(&isf, &times, &config).unwrap();
    assert_eq!(fits.status, vec![FitStatus::NonPhysical]);
    assert!(fits.status[0].has_params());
}

#[test]
fn test_lag_time_count_must_match() {
    let p = DecayParams::from_array([1.0, 1.0, 1.0, 1.0, 1.0]);
    let (isf, times) = synthetic_isf(&[p]);
    assert!(matches!(
        fit_decays(&isf, &times[1..], &DecayFitConfig::default()),
        Err(DdmError::InvalidConfig(_))
    ));

    let empty = ImageStructureFunction {
        lags: vec![],
        data: Array2::zeros((0, 3)),
    };
    assert!(matches!(
        fit_decays(&empty, &[], &DecayFitConfig::default()),
        Err(DdmError::InsufficientPoints { .. })
    ));
}

#[test]
fn test_model_and_status_display() {
    assert_eq!(DecayModel::default().to_string(), "double exponential");
    assert_eq!(DecayModel::SingleExponential.to_string(), "single exponential");
    assert_eq!(FitStatus::InvalidData.to_string(), "invalid data");
    let p = DecayParams::from_array([1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_eq!(p.to_array(), [1.0, 2.0, 3.0, 4.0, 5.0]);
    assert_eq!(p.evaluate(0.0), 5.0);
}
