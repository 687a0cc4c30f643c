use std::path::{Path, PathBuf};

use image::DynamicImage;
use ndarray::Array2;
use tracing::warn;

use crate::error::{DdmError, Result};
use crate::frame::{reduce_channels, ChannelSelection, ColorMode, SourceInfo};
use crate::io::source::FrameSource;

const FRAME_EXTENSIONS: [&str; 6] = ["png", "tif", "tiff", "bmp", "jpg", "jpeg"];

/// A directory of still images, one frame per file, ordered by file name.
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    info: SourceInfo,
    channel: ChannelSelection,
}

impl ImageSequence {
    /// Open every image file in `dir`. The first frame fixes the shape.
    pub fn open(dir: &Path, fps: f64, channel: ChannelSelection) -> Result<Self> {
        let entries = std::fs::read_dir(dir).map_err(|e| DdmError::SourceUnavailable {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_frame_file(p))
            .collect();
        paths.sort();

        let first = paths.first().ok_or(DdmError::EmptySequence)?;
        let img = image::open(first).map_err(|e| DdmError::SourceUnavailable {
            path: first.clone(),
            reason: e.to_string(),
        })?;

        let color = img.color();
        let color_mode = if color.has_color() {
            ColorMode::RGB
        } else {
            ColorMode::Mono
        };
        let bit_depth = (color.bits_per_pixel() / color.channel_count() as u16) as u8;

        if let ChannelSelection::Channel(c) = channel {
            if c >= color_mode.planes() {
                return Err(DdmError::InvalidConfig(format!(
                    "channel {c} requested but the images have {} plane(s)",
                    color_mode.planes()
                )));
            }
        }
        if !(fps.is_finite() && fps > 0.0) {
            return Err(DdmError::InvalidConfig(format!(
                "image sequences need a positive frame rate, got {fps}"
            )));
        }

        let info = SourceInfo {
            filename: dir.to_path_buf(),
            total_frames: paths.len(),
            width: img.width(),
            height: img.height(),
            bit_depth,
            color_mode,
            fps,
        };

        Ok(Self {
            paths,
            info,
            channel,
        })
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl FrameSource for ImageSequence {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_frame(&self, index: usize) -> Result<Option<Array2<f32>>> {
        let path = self
            .paths
            .get(index)
            .ok_or(DdmError::FrameIndexOutOfRange {
                index: index as i64,
                total: self.paths.len(),
            })?;

        let img = match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Undecodable frame");
                return Ok(None);
            }
        };

        let (h, w) = self.info.shape();
        if (img.height() as usize, img.width() as usize) != (h, w) {
            return Err(DdmError::ShapeMismatch {
                expected: (h, w),
                actual: (img.height() as usize, img.width() as usize),
            });
        }

        Ok(Some(image_to_counts(&img, self.info.color_mode, self.channel)))
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Convert an image to raw intensity counts at its native bit depth.
fn image_to_counts(img: &DynamicImage, mode: ColorMode, channel: ChannelSelection) -> Array2<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let wide = img.color().bits_per_pixel() / img.color().channel_count() as u16 > 8;
    let mut data = Array2::<f32>::zeros((h, w));

    match (mode, wide) {
        (ColorMode::Mono, false) => {
            let gray = img.to_luma8();
            for (x, y, p) in gray.enumerate_pixels() {
                data[[y as usize, x as usize]] = p.0[0] as f32;
            }
        }
        (ColorMode::Mono, true) => {
            let gray = img.to_luma16();
            for (x, y, p) in gray.enumerate_pixels() {
                data[[y as usize, x as usize]] = p.0[0] as f32;
            }
        }
        (_, false) => {
            let rgb = img.to_rgb8();
            for (x, y, p) in rgb.enumerate_pixels() {
                let samples = p.0.map(|v| v as f32);
                data[[y as usize, x as usize]] = reduce_channels(&samples, channel);
            }
        }
        (_, true) => {
            let rgb = img.to_rgb16();
            for (x, y, p) in rgb.enumerate_pixels() {
                let samples = p.0.map(|v| v as f32);
                data[[y as usize, x as usize]] = reduce_channels(&samples, channel);
            }
        }
    }

    data
}
