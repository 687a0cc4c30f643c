//! Levenberg-Marquardt least squares for small, fixed-size parameter vectors.
//!
//! Minimizes `Σ r_i(p)²` for a caller-supplied residual function. The Jacobian
//! is taken by forward differences and the normal equations are damped with
//! Marquardt's diagonal scaling, so parameters of very different magnitude
//! (amplitudes in the millions, times below one second) share one solver.

use serde::{Deserialize, Serialize};

use crate::consts::{
    DEFAULT_LM_INITIAL_LAMBDA, DEFAULT_LM_MAX_ITERATIONS, DEFAULT_LM_TOLERANCE, LM_MAX_LAMBDA,
};

/// sqrt(f64::EPSILON): relative step of the finite-difference Jacobian.
const JACOBIAN_STEP: f64 = 1.490_116_119_384_765_6e-8;

/// Floor for diagonal entries of JᵀJ before damping.
const DIAGONAL_FLOOR: f64 = 1e-30;

const LAMBDA_UP: f64 = 10.0;
const LAMBDA_DOWN: f64 = 0.1;

/// Solver limits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum accepted-or-rejected Jacobian evaluations.
    pub max_iterations: usize,
    /// Relative cost reduction and relative step size below which the fit stops.
    pub tolerance: f64,
    /// Initial damping.
    pub initial_lambda: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_LM_MAX_ITERATIONS,
            tolerance: DEFAULT_LM_TOLERANCE,
            initial_lambda: DEFAULT_LM_INITIAL_LAMBDA,
        }
    }
}

/// Why the solver stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// Cost or step fell below tolerance.
    Converged,
    /// No downhill step exists at any damping: a minimum to working precision.
    Stalled,
    /// Iteration budget exhausted.
    MaxIterations,
    /// Residuals were not finite at the seed.
    InvalidStart,
}

#[derive(Clone, Debug)]
pub struct Solution<const N: usize> {
    pub params: [f64; N],
    /// Sum of squared residuals at `params`.
    pub cost: f64,
    pub iterations: usize,
    pub termination: Termination,
}

impl<const N: usize> Solution<N> {
    pub fn converged(&self) -> bool {
        matches!(self.termination, Termination::Converged | Termination::Stalled)
    }
}

/// Minimize the squared norm of `residuals`, which writes `m` values for a
/// parameter vector.
pub fn levenberg_marquardt<const N: usize, F>(
    residuals: F,
    seed: [f64; N],
    m: usize,
    config: &SolverConfig,
) -> Solution<N>
where
    F: Fn(&[f64; N], &mut [f64]),
{
    let mut params = seed;
    let mut r = vec![0.0; m];
    residuals(&params, &mut r);
    let mut cost = sum_squares(&r);

    if !cost.is_finite() {
        return Solution {
            params,
            cost,
            iterations: 0,
            termination: Termination::InvalidStart,
        };
    }

    let mut lambda = config.initial_lambda;
    let mut jac = vec![[0.0f64; N]; m];
    let mut r_trial = vec![0.0; m];
    let mut iterations = 0;

    while iterations < config.max_iterations {
        iterations += 1;

        if cost == 0.0 {
            return Solution {
                params,
                cost,
                iterations,
                termination: Termination::Converged,
            };
        }

        // Forward-difference Jacobian of the residuals.
        for j in 0..N {
            let step = match JACOBIAN_STEP * params[j].abs() {
                h if h > 0.0 => h,
                _ => JACOBIAN_STEP,
            };
            let mut shifted = params;
            shifted[j] += step;
            residuals(&shifted, &mut r_trial);
            for i in 0..m {
                let d = (r_trial[i] - r[i]) / step;
                jac[i][j] = if d.is_finite() { d } else { 0.0 };
            }
        }

        let (jtj, jtr) = normal_equations(&jac, &r);

        // Raise damping until a step lowers the cost.
        loop {
            let mut damped = jtj;
            for (k, row) in damped.iter_mut().enumerate() {
                row[k] += lambda * jtj[k][k].max(DIAGONAL_FLOOR);
            }

            let step = solve(damped, jtr.map(|g| -g));
            let accepted = step.and_then(|delta| {
                let mut candidate = params;
                for (p, d) in candidate.iter_mut().zip(delta.iter()) {
                    *p += d;
                }
                residuals(&candidate, &mut r_trial);
                let new_cost = sum_squares(&r_trial);
                (new_cost.is_finite() && new_cost < cost).then_some((candidate, delta, new_cost))
            });

            match accepted {
                Some((candidate, delta, new_cost)) => {
                    let reduction = (cost - new_cost) / cost;
                    let max_rel_step = delta
                        .iter()
                        .zip(candidate.iter())
                        .map(|(d, p)| d.abs() / (p.abs() + config.tolerance))
                        .fold(0.0f64, f64::max);

                    // Heavily damped steps are short whatever the distance to
                    // the minimum, so they do not count toward convergence.
                    let near_gauss_newton = lambda <= 1.0;

                    params = candidate;
                    cost = new_cost;
                    r.copy_from_slice(&r_trial);
                    lambda *= LAMBDA_DOWN;

                    if near_gauss_newton
                        && (reduction < config.tolerance || max_rel_step < config.tolerance)
                    {
                        return Solution {
                            params,
                            cost,
                            iterations,
                            termination: Termination::Converged,
                        };
                    }
                    break;
                }
                None => {
                    lambda *= LAMBDA_UP;
                    if lambda > LM_MAX_LAMBDA {
                        return Solution {
                            params,
                            cost,
                            iterations,
                            termination: Termination::Stalled,
                        };
                    }
                }
            }
        }
    }

    Solution {
        params,
        cost,
        iterations,
        termination: Termination::MaxIterations,
    }
}

fn sum_squares(r: &[f64]) -> f64 {
    r.iter().map(|v| v * v).sum()
}

fn normal_equations<const N: usize>(jac: &[[f64; N]], r: &[f64]) -> ([[f64; N]; N], [f64; N]) {
    let mut jtj = [[0.0; N]; N];
    let mut jtr = [0.0; N];
    for (row, &ri) in jac.iter().zip(r) {
        for a in 0..N {
            jtr[a] += row[a] * ri;
            for b in a..N {
                jtj[a][b] += row[a] * row[b];
            }
        }
    }
    for a in 0..N {
        for b in 0..a {
            jtj[a][b] = jtj[b][a];
        }
    }
    (jtj, jtr)
}

/// Gaussian elimination with partial pivoting. `None` for a singular system.
fn solve<const N: usize>(mut a: [[f64; N]; N], mut b: [f64; N]) -> Option<[f64; N]> {
    for col in 0..N {
        let pivot = (col..N).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if !(a[pivot][col].abs() > 0.0) || !a[pivot][col].is_finite() {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..N {
            let factor = a[row][col] / a[col][col];
            for k in col..N {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = [0.0; N];
    for row in (0..N).rev() {
        let tail: f64 = (row + 1..N).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    x.iter().all(|v| v.is_finite()).then_some(x)
}
