use ndarray::{Array1, Array2};
use tracing::debug;

use crate::error::{DdmError, Result};

/// Radial average of 2D spectra centred on (0, 0), as produced by an unshifted FFT.
///
/// An averager is tied to one shape: the frequency-magnitude field, the bin
/// edges and each cell's bin are computed once and reused for every spectrum.
#[derive(Clone, Debug)]
pub struct RadialAverager {
    shape: (usize, usize),
    dists: Array2<f64>,
    edges: Vec<f64>,
    /// Bin of every cell in row-major order, `None` outside the binned range.
    bin_of: Vec<Option<usize>>,
    counts: Vec<usize>,
}

impl RadialAverager {
    pub fn new(shape: (usize, usize)) -> Result<Self> {
        let (h, w) = shape;
        if h == 0 || w == 0 {
            return Err(DdmError::InvalidDimensions {
                width: w as u32,
                height: h as u32,
            });
        }

        let fy = fftfreq(h);
        let fx = fftfreq(w);
        let mut dists =
            Array2::from_shape_fn((h, w), |(r, c)| (fy[r] * fy[r] + fx[c] * fx[c]).sqrt());
        // Fold the zero-frequency cross into the DC bin.
        dists.row_mut(0).fill(0.0);
        dists.column_mut(0).fill(0.0);

        let longest = h.max(w);
        let n_edges = longest / 2 + 1 + longest % 2;
        let edges: Vec<f64> = (0..n_edges).map(|k| k as f64 / longest as f64).collect();

        let bin_of: Vec<Option<usize>> = dists.iter().map(|&d| bin_index(&edges, d)).collect();
        let mut counts = vec![0usize; edges.len() - 1];
        for bin in bin_of.iter().flatten() {
            counts[*bin] += 1;
        }

        let empty = counts.iter().filter(|c| **c == 0).count();
        if empty > 0 {
            debug!(empty, bins = counts.len(), "Radial bins without cells");
        }

        Ok(Self {
            shape,
            dists,
            edges,
            bin_of,
            counts,
        })
    }

    /// Average `spectrum` over each frequency-magnitude bin.
    ///
    /// Bins that no cell falls into read as 0.
    pub fn apply(&self, spectrum: &Array2<f64>) -> Result<Array1<f64>> {
        if spectrum.dim() != self.shape {
            return Err(DdmError::ShapeMismatch {
                expected: self.shape,
                actual: spectrum.dim(),
            });
        }

        let mut sums = vec![0.0f64; self.counts.len()];
        for (bin, &v) in self.bin_of.iter().zip(spectrum.iter()) {
            if let Some(b) = bin {
                sums[*b] += v;
            }
        }

        Ok(sums
            .iter()
            .zip(&self.counts)
            .map(|(&s, &n)| if n > 0 { s / n as f64 } else { 0.0 })
            .collect())
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Number of radial bins, i.e. the length of every profile.
    pub fn bin_count(&self) -> usize {
        self.counts.len()
    }

    /// Cells per bin.
    pub fn counts(&self) -> &[usize] {
        &self.counts
    }

    /// Bin edges in cycles per pixel, from 0 up to (at least) Nyquist.
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Frequency magnitude of every cell, in cycles per pixel.
    pub fn distances(&self) -> &Array2<f64> {
        &self.dists
    }
}

/// Sample frequencies of an unshifted FFT of length `n`, in cycles per sample.
pub fn fftfreq(n: usize) -> Vec<f64> {
    let positive = (n - 1) / 2 + 1;
    (0..n)
        .map(|k| {
            if k < positive {
                k as f64 / n as f64
            } else {
                (k as f64 - n as f64) / n as f64
            }
        })
        .collect()
}

/// Histogram bin of `x`: half-open bins except the last, which is closed.
fn bin_index(edges: &[f64], x: f64) -> Option<usize> {
    let first = *edges.first()?;
    let last = *edges.last()?;
    if !(first..=last).contains(&x) {
        return None;
    }
    let at_or_below = edges.partition_point(|&e| e <= x);
    Some((at_or_below - 1).min(edges.len() - 2))
}
