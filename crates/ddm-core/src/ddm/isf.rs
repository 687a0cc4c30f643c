use std::f64::consts::PI;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{s, Array1, Array2, ArrayView1, Axis};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{DdmError, Result};
use crate::io::source::FrameSource;

use super::radial::RadialAverager;
use super::spectrum::SpectralDifferencer;
use super::time_average::time_averaged_with;

/// Image structure function: one radial profile of the time-averaged
/// difference spectrum per lag.
#[derive(Clone, Debug)]
pub struct ImageStructureFunction {
    /// Lags in frames, one per row, in the order they were requested.
    pub lags: Vec<usize>,
    /// Shape (lags, radial bins).
    pub data: Array2<f64>,
}

impl ImageStructureFunction {
    pub fn lag_count(&self) -> usize {
        self.data.nrows()
    }

    pub fn bin_count(&self) -> usize {
        self.data.ncols()
    }

    /// Lags converted to seconds.
    pub fn lag_times(&self, fps: f64) -> Vec<f64> {
        self.lags.iter().map(|&dt| dt as f64 / fps).collect()
    }

    /// Wavevector of each radial bin in radians per unit of `pixel_size`.
    pub fn wavevectors(&self, pixel_size: f64) -> Vec<f64> {
        wavevectors(self.bin_count(), pixel_size)
    }

    /// Keep only the first `tmax` lags.
    pub fn truncated(&self, tmax: usize) -> Self {
        let keep = tmax.min(self.lag_count());
        Self {
            lags: self.lags[..keep].to_vec(),
            data: self.data.slice(s![..keep, ..]).to_owned(),
        }
    }

    /// ISF as a function of lag for radial bin `bin`.
    pub fn column(&self, bin: usize) -> ArrayView1<'_, f64> {
        self.data.column(bin)
    }

    /// Range of all finite values in the matrix.
    pub fn peak_to_peak(&self) -> f64 {
        let (lo, hi) = self
            .data
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        if hi >= lo { hi - lo } else { 0.0 }
    }
}

/// `q_k = 2π / (2 · bins · pixel_size) · k` for `k in 0..bins`.
pub fn wavevectors(bins: usize, pixel_size: f64) -> Vec<f64> {
    let dq = 2.0 * PI / (2.0 * bins as f64 * pixel_size);
    (0..bins).map(|k| dq * k as f64).collect()
}

/// Build the ISF over `lags` on a pool of `workers` threads (0 = all cores).
pub fn compute_isf<S: FrameSource + ?Sized>(
    source: &S,
    lags: &[usize],
    max_couples: usize,
    workers: usize,
) -> Result<ImageStructureFunction> {
    compute_isf_with_progress(source, lags, max_couples, workers, |_| {})
}

/// [`compute_isf`] reporting the number of finished lags as they complete.
///
/// Each lag is averaged independently against the read-only source; rows are
/// collected by position, so the result does not depend on scheduling.
pub fn compute_isf_with_progress<S, F>(
    source: &S,
    lags: &[usize],
    max_couples: usize,
    workers: usize,
    on_progress: F,
) -> Result<ImageStructureFunction>
where
    S: FrameSource + ?Sized,
    F: Fn(usize) + Sync,
{
    if lags.is_empty() {
        return Err(DdmError::InvalidConfig("no lags to evaluate".into()));
    }

    let shape = source.shape();
    let differencer = SpectralDifferencer::new(shape);
    let averager = RadialAverager::new(shape)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| DdmError::InvalidConfig(format!("cannot start worker pool: {e}")))?;
    info!(
        lags = lags.len(),
        max_couples,
        threads = pool.current_num_threads(),
        "Computing image structure function"
    );

    let done = AtomicUsize::new(0);
    let profiles: Vec<Array1<f64>> = pool.install(|| -> Result<Vec<Array1<f64>>> {
        let averaged: Vec<Array2<f64>> = lags
            .par_iter()
            .map(|&dt| {
                let avg = time_averaged_with(source, &differencer, dt, max_couples)?;
                debug!(lag = dt, "Time average complete");
                on_progress(done.fetch_add(1, Ordering::Relaxed) + 1);
                Ok(avg)
            })
            .collect::<Result<_>>()?;

        averaged.par_iter().map(|avg| averager.apply(avg)).collect()
    })?;

    let mut data = Array2::<f64>::zeros((lags.len(), averager.bin_count()));
    for (mut row, profile) in data.axis_iter_mut(Axis(0)).zip(&profiles) {
        row.assign(profile);
    }

    Ok(ImageStructureFunction {
        lags: lags.to_vec(),
        data,
    })
}
