use ndarray::Array2;
use tracing::debug;

use crate::error::{DdmError, Result};
use crate::io::source::FrameSource;

use super::spectrum::SpectralDifferencer;

/// Start indices of the frame pairs averaged at lag `dt`.
///
/// Starts are spread evenly over `[0, n - dt)` with a fractional increment of
/// `max(1, (n - dt) / max_couples)` and floored, so there are at most
/// `max_couples` of them and at least one.
pub fn pair_start_indices(n: usize, dt: usize, max_couples: usize) -> Result<Vec<usize>> {
    if max_couples == 0 {
        return Err(DdmError::InvalidConfig(
            "max_couples must be at least 1".into(),
        ));
    }
    if dt == 0 || dt >= n {
        return Err(DdmError::DegenerateLag {
            lag: dt,
            frame_count: n,
        });
    }

    let span = (n - dt) as f64;
    let increment = (span / max_couples as f64).max(1.0);
    // Float rounding can push `count` one past the cap or a start onto n - dt.
    let count = ((span / increment).ceil() as usize).min(max_couples);
    Ok((0..count)
        .map(|k| (k as f64 * increment).floor() as usize)
        .filter(|&t| t < n - dt)
        .collect())
}

/// Mean spectral difference over regularly spaced frame pairs separated by `dt`.
///
/// Pairs where either frame is missing are skipped and do not count toward
/// the divisor. Works identically on a cached stack and on a direct source.
pub fn time_averaged<S: FrameSource + ?Sized>(
    source: &S,
    dt: usize,
    max_couples: usize,
) -> Result<Array2<f64>> {
    let differencer = SpectralDifferencer::new(source.shape());
    time_averaged_with(source, &differencer, dt, max_couples)
}

/// [`time_averaged`] reusing an already planned differencer.
pub fn time_averaged_with<S: FrameSource + ?Sized>(
    source: &S,
    differencer: &SpectralDifferencer,
    dt: usize,
    max_couples: usize,
) -> Result<Array2<f64>> {
    let starts = pair_start_indices(source.frame_count(), dt, max_couples)?;

    let mut sum = Array2::<f64>::zeros(differencer.shape());
    let mut used = 0usize;

    for &t in &starts {
        let (Some(im0), Some(im1)) = (source.read_frame(t)?, source.read_frame(t + dt)?) else {
            continue;
        };
        sum += &differencer.compute(im0.view(), im1.view())?;
        used += 1;
    }

    let skipped = starts.len() - used;
    if skipped > 0 {
        debug!(lag = dt, skipped, used, "Skipped pairs with missing frames");
    }
    if used == 0 {
        return Err(DdmError::NoValidPairs { lag: dt });
    }

    sum /= used as f64;
    Ok(sum)
}
