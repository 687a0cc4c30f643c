use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A single intensity frame in raw sensor counts.
#[derive(Clone, Debug)]
pub struct Frame {
    /// Pixel data, row-major, shape = (height, width)
    pub data: Array2<f32>,
    /// Position of the frame in its source.
    pub index: usize,
}

impl Frame {
    pub fn new(data: Array2<f32>, index: usize) -> Self {
        Self { data, index }
    }

    pub fn width(&self) -> usize {
        self.data.ncols()
    }

    pub fn height(&self) -> usize {
        self.data.nrows()
    }
}

/// Color layout of the source data.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum ColorMode {
    Mono,
    BayerRGGB,
    BayerGRBG,
    BayerGBRG,
    BayerBGGR,
    RGB,
    BGR,
}

impl ColorMode {
    /// Number of interleaved samples per pixel.
    pub fn planes(&self) -> usize {
        match self {
            Self::RGB | Self::BGR => 3,
            _ => 1,
        }
    }
}

/// How multi-channel pixels are reduced to a single intensity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelSelection {
    /// Mean of all channels, truncated to an integer count.
    #[default]
    Mean,
    /// A single channel by its index in the stored pixel layout.
    Channel(usize),
}

impl std::fmt::Display for ChannelSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mean => write!(f, "Mean"),
            Self::Channel(c) => write!(f, "Channel {c}"),
        }
    }
}

/// Reduce one pixel's samples to an intensity.
pub(crate) fn reduce_channels(samples: &[f32], selection: ChannelSelection) -> f32 {
    match selection {
        ChannelSelection::Channel(c) => samples[c],
        ChannelSelection::Mean => {
            let sum: f32 = samples.iter().sum();
            (sum / samples.len() as f32).trunc()
        }
    }
}

/// Metadata about a frame source, queried once when it is opened.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    pub filename: PathBuf,
    pub total_frames: usize,
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_mode: ColorMode,
    /// Sampling rate in frames per second.
    pub fps: f64,
}

impl SourceInfo {
    /// Frame shape as (height, width).
    pub fn shape(&self) -> (usize, usize) {
        (self.height as usize, self.width as usize)
    }

    /// Duration of the recording in seconds.
    pub fn duration(&self) -> f64 {
        self.total_frames as f64 / self.fps
    }
}
