use crate::error::{DdmError, Result};

/// Log-spaced integer lags smaller than `frame_count`.
///
/// `points_per_decade * log10(frame_count)` exponents are spread evenly over
/// `[0, log10(frame_count))`, raised to base 10, truncated and de-duplicated.
/// Short lags come out dense and long lags sparse, matching the logarithmic
/// relaxation of diffusive dynamics.
pub fn log_spaced(frame_count: usize, points_per_decade: usize) -> Result<Vec<usize>> {
    if frame_count == 0 {
        return Err(DdmError::EmptySequence);
    }
    if points_per_decade == 0 {
        return Err(DdmError::InvalidConfig(
            "points_per_decade must be at least 1".into(),
        ));
    }

    let decades = (frame_count as f64).log10();
    let num = (decades * points_per_decade as f64) as usize;
    if num == 0 {
        return Ok(Vec::new());
    }
    let step = decades / num as f64;

    let mut lags: Vec<usize> = (0..num)
        .map(|k| 10f64.powf(k as f64 * step) as usize)
        .filter(|&lag| lag >= 1 && lag < frame_count)
        .collect();
    lags.dedup();
    Ok(lags)
}
