use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DdmError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cannot open frame source {path}: {reason}")]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("Invalid SER file: {0}")]
    InvalidSer(String),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Frame index {index} out of range (total: {total})")]
    FrameIndexOutOfRange { index: i64, total: usize },

    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Lag {lag} is not usable with {frame_count} frames")]
    DegenerateLag { lag: usize, frame_count: usize },

    #[error("No valid frame pairs at lag {lag}")]
    NoValidPairs { lag: usize },

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Empty frame sequence")]
    EmptySequence,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Not enough points to fit: need {needed}, got {got}")]
    InsufficientPoints { needed: usize, got: usize },

    #[error("Fit did not converge: {0}")]
    FitNonConvergence(String),
}

pub type Result<T> = std::result::Result<T, DdmError>;
