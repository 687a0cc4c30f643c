use ndarray::{Array2, Array3, Axis};

use crate::error::{DdmError, Result};
use crate::frame::{ColorMode, Frame, SourceInfo};

/// Random access to a finite sequence of equally shaped intensity frames.
///
/// Implementors must be usable from several threads at once: the ISF builder
/// reads frames concurrently for different lags. A read never depends on the
/// position left behind by an earlier read.
pub trait FrameSource: Send + Sync {
    fn info(&self) -> &SourceInfo;

    /// Decode frame `index`. `Ok(None)` marks a frame the source could not
    /// produce; callers decide whether to skip it.
    fn read_frame(&self, index: usize) -> Result<Option<Array2<f32>>>;

    fn frame_count(&self) -> usize {
        self.info().total_frames
    }

    fn fps(&self) -> f64 {
        self.info().fps
    }

    /// Frame shape as (height, width).
    fn shape(&self) -> (usize, usize) {
        self.info().shape()
    }

    /// Read a frame by signed index: negative indices count from the end.
    fn frame_at(&self, index: i64) -> Result<Option<Frame>> {
        let i = resolve_index(index, self.frame_count())?;
        Ok(self.read_frame(i)?.map(|data| Frame::new(data, i)))
    }
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn info(&self) -> &SourceInfo {
        (**self).info()
    }

    fn read_frame(&self, index: usize) -> Result<Option<Array2<f32>>> {
        (**self).read_frame(index)
    }
}

/// Map a possibly negative index onto `0..total`.
pub fn resolve_index(index: i64, total: usize) -> Result<usize> {
    let resolved = if index < 0 {
        total as i64 + index
    } else {
        index
    };
    if resolved < 0 || resolved >= total as i64 {
        return Err(DdmError::FrameIndexOutOfRange { index, total });
    }
    Ok(resolved as usize)
}

/// Frames held in memory, optionally with gaps standing in for frames a
/// decoder failed to produce.
pub struct ArraySource {
    info: SourceInfo,
    frames: Vec<Option<Array2<f32>>>,
}

impl ArraySource {
    /// Wrap a list of frames recorded at `fps`.
    pub fn new(frames: Vec<Array2<f32>>, fps: f64) -> Result<Self> {
        Self::with_gaps(frames.into_iter().map(Some).collect(), fps)
    }

    /// Like [`ArraySource::new`], but `None` entries read back as missing frames.
    pub fn with_gaps(frames: Vec<Option<Array2<f32>>>, fps: f64) -> Result<Self> {
        let (h, w) = frames
            .iter()
            .flatten()
            .next()
            .map(|f| f.dim())
            .ok_or(DdmError::EmptySequence)?;
        if h == 0 || w == 0 {
            return Err(DdmError::InvalidDimensions {
                width: w as u32,
                height: h as u32,
            });
        }
        if let Some(bad) = frames.iter().flatten().find(|f| f.dim() != (h, w)) {
            return Err(DdmError::ShapeMismatch {
                expected: (h, w),
                actual: bad.dim(),
            });
        }
        if !(fps.is_finite() && fps > 0.0) {
            return Err(DdmError::InvalidConfig(format!(
                "frame rate must be positive, got {fps}"
            )));
        }

        let info = SourceInfo {
            filename: "<memory>".into(),
            total_frames: frames.len(),
            width: w as u32,
            height: h as u32,
            bit_depth: 32,
            color_mode: ColorMode::Mono,
            fps,
        };
        Ok(Self { info, frames })
    }

    /// Split a `(frames, height, width)` stack into an in-memory source.
    pub fn from_stack(stack: &Array3<f32>, fps: f64) -> Result<Self> {
        let frames = stack.axis_iter(Axis(0)).map(|f| f.to_owned()).collect();
        Self::new(frames, fps)
    }
}

impl FrameSource for ArraySource {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_frame(&self, index: usize) -> Result<Option<Array2<f32>>> {
        match self.frames.get(index) {
            Some(frame) => Ok(frame.clone()),
            None => Err(DdmError::FrameIndexOutOfRange {
                index: index as i64,
                total: self.frames.len(),
            }),
        }
    }
}
