//! Synthetic recordings of Brownian particles with a known diffusion coefficient.

use std::f64::consts::PI;
use std::path::Path;

use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{DdmError, Result};
use crate::io::ser::SerHeader;
use crate::io::ser_writer::SerWriter;
use crate::io::source::ArraySource;

/// Configuration for a synthetic video.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrownianConfig {
    pub width: usize,
    pub height: usize,
    pub frames: usize,
    pub fps: f64,
    /// Micrometres per pixel.
    pub pixel_size: f64,
    /// µm²/s
    pub diffusion: f64,
    pub particles: usize,
    /// Gaussian spot radius in pixels.
    pub spot_sigma: f64,
    /// Peak spot intensity in counts above background.
    pub amplitude: f64,
    pub background: f64,
    /// Random seed for reproducibility
    pub seed: u64,
}

impl Default for BrownianConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            frames: 500,
            fps: 10.0,
            pixel_size: 1.0,
            diffusion: 0.5,
            particles: 40,
            spot_sigma: 1.5,
            amplitude: 100.0,
            background: 20.0,
            seed: 42,
        }
    }
}

impl BrownianConfig {
    fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DdmError::InvalidDimensions {
                width: self.width as u32,
                height: self.height as u32,
            });
        }
        if self.frames == 0 {
            return Err(DdmError::EmptySequence);
        }
        let positive = [self.fps, self.pixel_size, self.spot_sigma];
        if positive.iter().any(|v| !(v.is_finite() && *v > 0.0)) {
            return Err(DdmError::InvalidConfig(
                "fps, pixel size and spot sigma must be positive".into(),
            ));
        }
        if !(self.diffusion.is_finite() && self.diffusion >= 0.0) {
            return Err(DdmError::InvalidConfig(format!(
                "diffusion coefficient must be non-negative, got {}",
                self.diffusion
            )));
        }
        Ok(())
    }

    /// Per-axis displacement standard deviation between frames, in pixels.
    pub fn step_sigma_px(&self) -> f64 {
        (2.0 * self.diffusion / self.fps).sqrt() / self.pixel_size
    }
}

/// Render a `(frames, height, width)` stack of particles diffusing in a
/// periodic box.
pub fn brownian_stack(config: &BrownianConfig) -> Result<Array3<f32>> {
    config.validate()?;
    let (w, h) = (config.width, config.height);
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut positions: Vec<(f64, f64)> = (0..config.particles)
        .map(|_| (rng.random::<f64>() * w as f64, rng.random::<f64>() * h as f64))
        .collect();

    let step = config.step_sigma_px();
    let mut stack = Array3::<f32>::zeros((config.frames, h, w));

    for (t, mut frame) in stack.axis_iter_mut(Axis(0)).enumerate() {
        if t > 0 {
            for (x, y) in positions.iter_mut() {
                *x = (*x + step * standard_normal(&mut rng)).rem_euclid(w as f64);
                *y = (*y + step * standard_normal(&mut rng)).rem_euclid(h as f64);
            }
        }

        let mut image = Array2::<f64>::from_elem((h, w), config.background);
        for &(x, y) in &positions {
            render_spot(&mut image, x, y, config.spot_sigma, config.amplitude);
        }
        frame.assign(&image.mapv(|v| v as f32));
    }

    info!(
        frames = config.frames,
        width = w,
        height = h,
        particles = config.particles,
        diffusion = config.diffusion,
        "Generated Brownian stack"
    );
    Ok(stack)
}

/// [`brownian_stack`] wrapped as an in-memory frame source at the configured rate.
pub fn brownian_source(config: &BrownianConfig) -> Result<ArraySource> {
    ArraySource::from_stack(&brownian_stack(config)?, config.fps)
}

/// Render a stack and save it as a mono SER file of `bit_depth` bits whose
/// timestamp trailer encodes the configured frame rate.
pub fn write_brownian_ser(path: &Path, config: &BrownianConfig, bit_depth: u32) -> Result<()> {
    if !(1..=16).contains(&bit_depth) {
        return Err(DdmError::InvalidConfig(format!(
            "bit depth must be between 1 and 16, got {bit_depth}"
        )));
    }
    let stack = brownian_stack(config)?;
    let header = SerHeader::mono(
        config.width as u32,
        config.height as u32,
        bit_depth,
        config.frames as u32,
    );

    let mut writer = SerWriter::create(path, &header)?;
    for frame in stack.axis_iter(Axis(0)) {
        writer.write_frame(&frame.to_owned())?;
    }
    writer.write_frame_rate(config.fps)?;
    writer.finalize()?;

    info!(path = %path.display(), bit_depth, "Wrote synthetic SER");
    Ok(())
}

/// Add a Gaussian spot centred on `(x, y)`, wrapping around the frame edges.
fn render_spot(image: &mut Array2<f64>, x: f64, y: f64, sigma: f64, amplitude: f64) {
    let (h, w) = image.dim();
    let reach = (4.0 * sigma).ceil() as i64;
    let (reach_x, reach_y) = (reach.min((w as i64 - 1) / 2), reach.min((h as i64 - 1) / 2));
    let (cx, cy) = (x.floor() as i64, y.floor() as i64);
    let inv_two_sigma_sq = 1.0 / (2.0 * sigma * sigma);

    for py in cy - reach_y..=cy + reach_y {
        let dy = py as f64 - y;
        let row = py.rem_euclid(h as i64) as usize;
        for px in cx - reach_x..=cx + reach_x {
            let dx = px as f64 - x;
            let col = px.rem_euclid(w as i64) as usize;
            image[[row, col]] += amplitude * (-(dx * dx + dy * dy) * inv_two_sigma_sq).exp();
        }
    }
}

/// Box-Muller transform.
fn standard_normal(rng: &mut StdRng) -> f64 {
    let u1 = 1.0 - rng.random::<f64>();
    let u2 = rng.random::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_shape_and_floor() {
        let config = BrownianConfig {
            width: 32,
            height: 24,
            frames: 5,
            ..Default::default()
        };
        let stack = brownian_stack(&config).unwrap();
        assert_eq!(stack.dim(), (5, 24, 32));
        assert!(stack.iter().all(|&v| v >= config.background as f32));
    }

    #[test]
    fn test_same_seed_reproduces() {
        let config = BrownianConfig {
            frames: 3,
            ..Default::default()
        };
        assert_eq!(brownian_stack(&config).unwrap(), brownian_stack(&config).unwrap());
    }

    #[test]
    fn test_spot_wraps_across_edge() {
        let mut image = Array2::<f64>::zeros((16, 16));
        render_spot(&mut image, 0.0, 0.0, 1.0, 1.0);
        assert!((image[[0, 0]] - 1.0).abs() < 1e-12);
        assert!((image[[0, 15]] - image[[0, 1]]).abs() < 1e-12);
        assert!((image[[15, 0]] - image[[1, 0]]).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_zero_fps() {
        let config = BrownianConfig {
            fps: 0.0,
            ..Default::default()
        };
        assert!(brownian_stack(&config).is_err());
    }
}
