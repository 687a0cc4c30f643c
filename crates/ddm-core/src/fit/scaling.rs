use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DdmError, Result};

use super::decay::{DecayFits, FitStatus};

/// Which characteristic time of the decay fits to scale against q.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeChannel {
    Tau1,
    Tau2,
    /// Per bin, the time of the component with the larger amplitude.
    #[default]
    Dominant,
}

impl std::fmt::Display for TimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tau1 => write!(f, "tau1"),
            Self::Tau2 => write!(f, "tau2"),
            Self::Dominant => write!(f, "dominant"),
        }
    }
}

/// Range of wavevectors used for the power-law fit, in the units of the q axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct QWindow {
    pub q_min: f64,
    pub q_max: f64,
}

impl QWindow {
    pub fn new(q_min: f64, q_max: f64) -> Self {
        Self { q_min, q_max }
    }

    /// Every positive wavevector.
    pub fn all() -> Self {
        Self {
            q_min: f64::MIN_POSITIVE,
            q_max: f64::INFINITY,
        }
    }

    /// Index range `[lo, hi)` on an ascending q axis, bounds found by a
    /// left-sided sorted search.
    pub fn index_range(&self, qs: &[f64]) -> (usize, usize) {
        let lo = qs.partition_point(|&q| q < self.q_min);
        let hi = qs.partition_point(|&q| q < self.q_max);
        (lo, hi.max(lo))
    }
}

/// Power law `τ = 1 / (X·q^α)` fitted over a q window, and the diffusion
/// coefficient obtained with α fixed at 2.
///
/// Two estimates of D come out of the window. `prefactor` is X from the
/// free fit, `exp(−c0)`, which is a diffusion coefficient only when α comes
/// out at 2. `diffusion` is `exp(−c0')` from the fit with α pinned to 2 and is
/// the value carried into the particle size. The two agree for purely
/// Brownian times and drift apart as α departs from 2.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScalingFit {
    /// X of the free fit, in units of q^−α/s.
    pub prefactor: f64,
    /// α of the free fit; 2 for Brownian motion.
    pub exponent: f64,
    /// `log τ + 2 log q` averaged over the window, i.e. `−log D`.
    pub intercept: f64,
    /// D from the α = 2 fit, in units of q⁻²/s. Not the same as `prefactor`.
    pub diffusion: f64,
    pub diffusion_error: f64,
    pub iq_min: usize,
    pub iq_max: usize,
    /// Bins inside the window that entered the fit.
    pub points: usize,
}

/// Pick one characteristic time per bin.
pub fn select_times(fits: &DecayFits, channel: TimeChannel) -> Vec<f64> {
    (0..fits.bin_count())
        .map(|bin| {
            let p = fits.params_at(bin);
            match channel {
                TimeChannel::Tau1 => p.tau1,
                TimeChannel::Tau2 => p.tau2,
                TimeChannel::Dominant => p.dominant_tau(),
            }
        })
        .collect()
}

/// Fit `log|τ| = c0 − α·log|q|` over `window`, then refit with α = 2.
pub fn fit_scaling(
    qs: &[f64],
    fits: &DecayFits,
    channel: TimeChannel,
    window: QWindow,
) -> Result<ScalingFit> {
    if qs.len() != fits.bin_count() {
        return Err(DdmError::InvalidConfig(format!(
            "{} wavevectors for {} fitted bins",
            qs.len(),
            fits.bin_count()
        )));
    }
    if !(window.q_min < window.q_max) {
        return Err(DdmError::InvalidConfig(format!(
            "empty q window [{}, {})",
            window.q_min, window.q_max
        )));
    }

    let taus = select_times(fits, channel);
    let (iq_min, iq_max) = window.index_range(qs);

    let points: Vec<(f64, f64)> = (iq_min..iq_max)
        .filter(|&k| fits.status[k] != FitStatus::InvalidData)
        .filter_map(|k| {
            let x = qs[k].abs().ln();
            let y = taus[k].abs().ln();
            (x.is_finite() && y.is_finite()).then_some((x, y))
        })
        .collect();
    debug!(
        iq_min,
        iq_max,
        usable = points.len(),
        %channel,
        "Scaling window"
    );

    let fit = power_law(&points)?;
    let fit = ScalingFit {
        iq_min,
        iq_max,
        ..fit
    };
    info!(
        exponent = fit.exponent,
        diffusion = fit.diffusion,
        diffusion_error = fit.diffusion_error,
        points = fit.points,
        "Scaling fit complete"
    );
    Ok(fit)
}

/// Closed-form fits on `(log q, log τ)` points.
pub fn power_law(points: &[(f64, f64)]) -> Result<ScalingFit> {
    let n = points.len();
    if n < 2 {
        return Err(DdmError::InsufficientPoints { needed: 2, got: n });
    }
    let nf = n as f64;

    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / nf;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / nf;
    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    let sxy: f64 = points
        .iter()
        .map(|p| (p.0 - mean_x) * (p.1 - mean_y))
        .sum();
    if !(sxx > 0.0) {
        return Err(DdmError::FitNonConvergence(
            "all wavevectors in the window coincide".into(),
        ));
    }

    // log τ = c0 − α log q
    let exponent = -sxy / sxx;
    let c0 = mean_y + exponent * mean_x;
    let prefactor = (-c0).exp();

    // α = 2: c0' is the mean of log τ + 2 log q.
    let intercept = points.iter().map(|p| p.1 + 2.0 * p.0).sum::<f64>() / nf;
    let diffusion = (-intercept).exp();
    if !(diffusion.is_finite() && diffusion > 0.0) {
        return Err(DdmError::FitNonConvergence(format!(
            "diffusion coefficient {diffusion} from intercept {intercept}"
        )));
    }

    let rss: f64 = points
        .iter()
        .map(|p| (p.1 + 2.0 * p.0 - intercept).powi(2))
        .sum();
    let intercept_var = rss / (nf - 1.0) / nf;
    let diffusion_error = diffusion * intercept_var.sqrt();

    Ok(ScalingFit {
        prefactor,
        exponent,
        intercept,
        diffusion,
        diffusion_error,
        iq_min: 0,
        iq_max: n,
        points: n,
    })
}
