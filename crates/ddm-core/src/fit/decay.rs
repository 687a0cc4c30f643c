use ndarray::{Array2, ArrayView1, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::consts::LOG_FLOOR;
use crate::ddm::isf::ImageStructureFunction;
use crate::error::{DdmError, Result};

use super::levenberg::{levenberg_marquardt, Solution, SolverConfig, Termination};

/// Relaxation model fitted to each ISF column.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayModel {
    /// `A1·(1−e^{−t/τ1}) + A2·(1−e^{−t/τ2}) + B`: two particle populations.
    #[default]
    DoubleExponential,
    /// `A·(1−e^{−t/τ}) + B`: a single population.
    SingleExponential,
}

impl std::fmt::Display for DecayModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DoubleExponential => write!(f, "double exponential"),
            Self::SingleExponential => write!(f, "single exponential"),
        }
    }
}

/// Starting point of each column fit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecaySeed {
    /// Amplitudes at half the ISF's peak-to-peak, times at the column's
    /// minimum and maximum values, background 1.
    ///
    /// For the single-exponential model the seed is taken from the column's
    /// half-rise instead.
    #[default]
    ColumnExtrema,
    /// Taken from the column's own rise: τ from the first lag reaching half
    /// of it, background at its minimum. The double-exponential model puts
    /// 90% of the rise on τ and the rest on a component ten times slower.
    HalfRise,
    /// `[A1, τ1, A2, τ2, B]` for every column. The single-exponential model
    /// uses `[A1, τ1, B]`.
    Explicit([f64; 5]),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayFitConfig {
    pub model: DecayModel,
    pub seed: DecaySeed,
    /// Replace a double-exponential fit by the single-exponential fit of the
    /// same bin when it is flagged or a relaxation time falls outside the
    /// fitted lag times.
    pub reduce_unresolved: bool,
    pub solver: SolverConfig,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecayParams {
    pub a1: f64,
    pub tau1: f64,
    pub a2: f64,
    pub tau2: f64,
    pub background: f64,
}

impl DecayParams {
    pub fn from_array(p: [f64; 5]) -> Self {
        Self {
            a1: p[0],
            tau1: p[1],
            a2: p[2],
            tau2: p[3],
            background: p[4],
        }
    }

    pub fn to_array(self) -> [f64; 5] {
        [self.a1, self.tau1, self.a2, self.tau2, self.background]
    }

    fn nan() -> Self {
        Self::from_array([f64::NAN; 5])
    }

    /// Model value at lag time `t`, without the log floor.
    pub fn evaluate(&self, t: f64) -> f64 {
        self.a1 * (1.0 - (-t / self.tau1).exp())
            + self.a2 * (1.0 - (-t / self.tau2).exp())
            + self.background
    }

    /// Time of the component with the larger amplitude.
    pub fn dominant_tau(&self) -> f64 {
        if self.a1.abs() >= self.a2.abs() {
            self.tau1
        } else {
            self.tau2
        }
    }

    fn is_physical(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
            && self.tau1 > 0.0
            && self.tau2 > 0.0
            && self.a1 >= 0.0
            && self.a2 >= 0.0
    }
}

/// Outcome of one column fit. A flag on the result, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    Converged,
    /// Iteration budget ran out; parameters are the last accepted step.
    MaxIterations,
    /// Negative amplitude, non-positive time, or a seed whose model is not finite.
    NonPhysical,
    /// Column holds non-positive or non-finite values and was not fitted.
    InvalidData,
}

impl FitStatus {
    /// Whether the column produced parameters at all.
    pub fn has_params(self) -> bool {
        !matches!(self, Self::InvalidData)
    }
}

impl std::fmt::Display for FitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Converged => write!(f, "converged"),
            Self::MaxIterations => write!(f, "max iterations"),
            Self::NonPhysical => write!(f, "non-physical"),
            Self::InvalidData => write!(f, "invalid data"),
        }
    }
}

/// Per-bin decay fits of an ISF.
#[derive(Clone, Debug)]
pub struct DecayFits {
    /// Shape (bins, 5): `A1, τ1, A2, τ2, B` per radial bin.
    pub params: Array2<f64>,
    /// Shape (bins, lags): fitted model at each lag time.
    pub curves: Array2<f64>,
    pub status: Vec<FitStatus>,
    /// Model whose parameters each bin holds.
    pub models: Vec<DecayModel>,
}

impl DecayFits {
    pub fn bin_count(&self) -> usize {
        self.status.len()
    }

    pub fn params_at(&self, bin: usize) -> DecayParams {
        let row = self.params.row(bin);
        DecayParams::from_array([row[0], row[1], row[2], row[3], row[4]])
    }

    /// Number of bins with the given status.
    pub fn count(&self, status: FitStatus) -> usize {
        self.status.iter().filter(|s| **s == status).count()
    }
}

struct ColumnFit {
    params: DecayParams,
    status: FitStatus,
    model: DecayModel,
}

/// Fit every radial bin of `isf` against `times` (seconds, one per lag row).
///
/// Residuals are taken in log space, so the fit weights every decade of the
/// ISF equally. Columns are independent and fitted in parallel on the current
/// rayon pool.
pub fn fit_decays(
    isf: &ImageStructureFunction,
    times: &[f64],
    config: &DecayFitConfig,
) -> Result<DecayFits> {
    fit_decays_with_span(isf, times, isf.peak_to_peak(), config)
}

/// [`fit_decays`] with the ISF's peak-to-peak range supplied by the caller.
///
/// Seeds built from the range stay the same whether `isf` is the full matrix
/// or its first few lags.
pub fn fit_decays_with_span(
    isf: &ImageStructureFunction,
    times: &[f64],
    span: f64,
    config: &DecayFitConfig,
) -> Result<DecayFits> {
    let (n_t, n_q) = isf.data.dim();
    if times.len() != n_t {
        return Err(DdmError::InvalidConfig(format!(
            "{} lag times for an ISF with {n_t} lags",
            times.len()
        )));
    }
    if n_t == 0 || n_q == 0 {
        return Err(DdmError::InsufficientPoints {
            needed: 1,
            got: n_t.min(n_q),
        });
    }

    let half_ptp = span / 2.0;
    info!(bins = n_q, lags = n_t, model = %config.model, "Fitting decays");

    let fits: Vec<ColumnFit> = (0..n_q)
        .into_par_iter()
        .map(|bin| fit_column(isf.column(bin), times, half_ptp, config))
        .collect();

    let mut params = Array2::<f64>::from_elem((n_q, 5), f64::NAN);
    let mut curves = Array2::<f64>::from_elem((n_q, n_t), f64::NAN);
    let mut status = Vec::with_capacity(n_q);
    let models: Vec<DecayModel> = fits.iter().map(|fit| fit.model).collect();

    for ((fit, mut p_row), mut c_row) in fits
        .iter()
        .zip(params.axis_iter_mut(Axis(0)))
        .zip(curves.axis_iter_mut(Axis(0)))
    {
        status.push(fit.status);
        if !fit.status.has_params() {
            continue;
        }
        for (dst, v) in p_row.iter_mut().zip(fit.params.to_array()) {
            *dst = v;
        }
        for (dst, &t) in c_row.iter_mut().zip(times) {
            *dst = log_model(&fit.params, t).exp();
        }
    }

    let fits = DecayFits {
        params,
        curves,
        status,
        models,
    };

    let invalid = fits.count(FitStatus::InvalidData);
    if invalid == n_q {
        return Err(DdmError::FitNonConvergence(
            "no radial bin holds fittable data".into(),
        ));
    }
    if config.model != DecayModel::SingleExponential {
        let reduced = fits
            .models
            .iter()
            .zip(&fits.status)
            .filter(|(m, s)| **m == DecayModel::SingleExponential && s.has_params())
            .count();
        if reduced > 0 {
            info!(reduced, "Bins reduced to a single exponential");
        }
    }
    let flagged = n_q - fits.count(FitStatus::Converged);
    if flagged > 0 {
        warn!(
            flagged,
            invalid,
            non_physical = fits.count(FitStatus::NonPhysical),
            max_iterations = fits.count(FitStatus::MaxIterations),
            "Some decay fits are flagged"
        );
    }
    Ok(fits)
}

/// `log(max(model(t), ε))`.
pub fn log_model(p: &DecayParams, t: f64) -> f64 {
    p.evaluate(t).max(LOG_FLOOR).ln()
}

fn fit_column(
    column: ArrayView1<'_, f64>,
    times: &[f64],
    half_ptp: f64,
    config: &DecayFitConfig,
) -> ColumnFit {
    if column.iter().any(|&v| !(v.is_finite() && v > 0.0)) {
        return ColumnFit {
            params: DecayParams::nan(),
            status: FitStatus::InvalidData,
            model: config.model,
        };
    }
    let log_data: Vec<f64> = column.iter().map(|v| v.ln()).collect();

    let fit = match config.model {
        DecayModel::DoubleExponential => {
            let seed = match config.seed {
                DecaySeed::Explicit(p) => p,
                DecaySeed::ColumnExtrema => {
                    let (lo, hi) = extrema(column);
                    [half_ptp, lo, half_ptp, hi, 1.0]
                }
                DecaySeed::HalfRise => {
                    let [amplitude, tau, background] = half_rise_seed(column, times);
                    [0.9 * amplitude, tau, 0.1 * amplitude, 10.0 * tau, background]
                }
            };
            let fit = fit_double(&log_data, times, seed, config);
            if config.reduce_unresolved && !resolved(&fit, times) {
                let reduced = fit_single(&log_data, times, half_rise_seed(column, times), config);
                debug!(
                    tau1 = fit.params.tau1,
                    tau2 = fit.params.tau2,
                    status = %fit.status,
                    "Double exponential unresolved, using single"
                );
                reduced
            } else {
                fit
            }
        }
        DecayModel::SingleExponential => {
            let seed = match config.seed {
                DecaySeed::Explicit(p) => [p[0], p[1], p[4]],
                DecaySeed::ColumnExtrema | DecaySeed::HalfRise => half_rise_seed(column, times),
            };
            fit_single(&log_data, times, seed, config)
        }
    };

    if fit.status != FitStatus::Converged {
        debug!(params = ?fit.params, status = %fit.status, "Decay fit flagged");
    }
    fit
}

fn fit_double(
    log_data: &[f64],
    times: &[f64],
    seed: [f64; 5],
    config: &DecayFitConfig,
) -> ColumnFit {
    let sol = levenberg_marquardt(
        |p: &[f64; 5], out: &mut [f64]| {
            let params = DecayParams::from_array(*p);
            for ((o, &t), &d) in out.iter_mut().zip(times).zip(log_data) {
                *o = log_model(&params, t) - d;
            }
        },
        seed,
        times.len(),
        &config.solver,
    );
    let params = DecayParams::from_array(sol.params);
    ColumnFit {
        params,
        status: status_of(&params, sol.termination),
        model: DecayModel::DoubleExponential,
    }
}

fn fit_single(
    log_data: &[f64],
    times: &[f64],
    seed: [f64; 3],
    config: &DecayFitConfig,
) -> ColumnFit {
    let sol: Solution<3> = levenberg_marquardt(
        |p: &[f64; 3], out: &mut [f64]| {
            let params = single(p);
            for ((o, &t), &d) in out.iter_mut().zip(times).zip(log_data) {
                *o = log_model(&params, t) - d;
            }
        },
        seed,
        times.len(),
        &config.solver,
    );
    let params = single(&sol.params);
    ColumnFit {
        params,
        status: status_of(&params, sol.termination),
        model: DecayModel::SingleExponential,
    }
}

fn status_of(params: &DecayParams, termination: Termination) -> FitStatus {
    match termination {
        Termination::InvalidStart => FitStatus::NonPhysical,
        _ if !params.is_physical() => FitStatus::NonPhysical,
        Termination::MaxIterations => FitStatus::MaxIterations,
        Termination::Converged | Termination::Stalled => FitStatus::Converged,
    }
}

/// Converged with both relaxation times inside the fitted lag times.
fn resolved(fit: &ColumnFit, times: &[f64]) -> bool {
    let (first, last) = (times[0], times[times.len() - 1]);
    let inside = |tau: f64| (first..=last).contains(&tau);
    fit.status == FitStatus::Converged && inside(fit.params.tau1) && inside(fit.params.tau2)
}

/// Single-exponential parameters `[A, τ, B]` in the five-slot layout.
fn single(p: &[f64; 3]) -> DecayParams {
    DecayParams {
        a1: p[0],
        tau1: p[1],
        a2: 0.0,
        tau2: p[1],
        background: p[2],
    }
}

fn extrema(column: ArrayView1<'_, f64>) -> (f64, f64) {
    column
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Background at the smallest value, amplitude up to the largest, and τ from
/// the first lag that reaches half of the rise (`t½ = τ·ln 2`).
fn half_rise_seed(column: ArrayView1<'_, f64>, times: &[f64]) -> [f64; 3] {
    let (lo, hi) = extrema(column);
    let amplitude = hi - lo;
    let half = lo + amplitude / 2.0;
    let tau = column
        .iter()
        .zip(times)
        .find(|(v, _)| **v >= half)
        .map(|(_, &t)| t / std::f64::consts::LN_2)
        .unwrap_or(times[times.len() / 2]);
    // A lag time of 0 would make the first model evaluation 0/0.
    let tau = if tau > 0.0 { tau } else { times[times.len() - 1].max(1.0) };
    [amplitude.max(LOG_FLOOR), tau, lo]
}
