use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use num_complex::Complex;
use num_traits::Zero;
use rustfft::{Fft, FftPlanner};

use crate::error::{DdmError, Result};

/// Squared modulus of the 2D Fourier transform of frame differences, with the
/// row and column transforms planned once for a fixed frame shape.
pub struct SpectralDifferencer {
    height: usize,
    width: usize,
    fft_row: Arc<dyn Fft<f64>>,
    fft_col: Arc<dyn Fft<f64>>,
}

impl SpectralDifferencer {
    pub fn new(shape: (usize, usize)) -> Self {
        let (height, width) = shape;
        let mut planner = FftPlanner::new();
        Self {
            height,
            width,
            fft_row: planner.plan_fft_forward(width),
            fft_col: planner.plan_fft_forward(height),
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.height, self.width)
    }

    /// `|FFT2(later - earlier)|²`, with the difference taken in f64.
    pub fn compute(
        &self,
        earlier: ArrayView2<'_, f32>,
        later: ArrayView2<'_, f32>,
    ) -> Result<Array2<f64>> {
        self.check_shape(earlier.dim())?;
        self.check_shape(later.dim())?;

        let (h, w) = (self.height, self.width);
        let mut buf: Vec<Complex<f64>> = later
            .iter()
            .zip(earlier.iter())
            .map(|(&b, &a)| Complex::new(b as f64 - a as f64, 0.0))
            .collect();

        // rustfft transforms every `w`-long chunk, i.e. every row.
        self.fft_row.process(&mut buf);

        let mut transposed = vec![Complex::zero(); h * w];
        for row in 0..h {
            for col in 0..w {
                transposed[col * h + row] = buf[row * w + col];
            }
        }
        self.fft_col.process(&mut transposed);

        let mut power = Array2::<f64>::zeros((h, w));
        for ((row, col), p) in power.indexed_iter_mut() {
            *p = transposed[col * h + row].norm_sqr();
        }
        Ok(power)
    }

    fn check_shape(&self, actual: (usize, usize)) -> Result<()> {
        if actual != (self.height, self.width) {
            return Err(DdmError::ShapeMismatch {
                expected: (self.height, self.width),
                actual,
            });
        }
        Ok(())
    }
}

/// One-shot spectral difference between two frames of identical shape.
pub fn spectrum_diff(earlier: &Array2<f32>, later: &Array2<f32>) -> Result<Array2<f64>> {
    SpectralDifferencer::new(earlier.dim()).compute(earlier.view(), later.view())
}

/// Move the zero-frequency cell to the centre of the array.
pub fn fftshift<T: Clone + Zero>(data: &Array2<T>) -> Array2<T> {
    let (h, w) = data.dim();
    let mut shifted = Array2::<T>::zeros((h, w));
    for ((row, col), v) in data.indexed_iter() {
        shifted[[(row + h / 2) % h, (col + w / 2) % w]] = v.clone();
    }
    shifted
}

/// Linearly interpolated percentile (0..=100) of all finite cells.
pub fn percentile(data: &Array2<f64>, q: f64) -> Option<f64> {
    let mut sorted: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (q.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Colour-scale ceiling for displaying a spectrum: the given percentile of the
/// centred spectrum, so a few bright low-frequency cells do not wash out the map.
pub fn display_ceiling(spectrum: &Array2<f64>, q: f64) -> Option<f64> {
    percentile(&fftshift(spectrum), q)
}
