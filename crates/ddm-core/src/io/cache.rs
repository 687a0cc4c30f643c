use ndarray::{Array2, Array3, ArrayView2, Axis};
use tracing::{debug, info};

use crate::error::{DdmError, Result};
use crate::frame::SourceInfo;
use crate::io::source::FrameSource;

/// A frame source materialized into one contiguous `(frames, height, width)` array.
///
/// Built in a single pass over the source; afterwards every read is a copy out
/// of memory and the cache answers exactly what the source would have answered,
/// including frames the source could not produce.
pub struct FrameCache {
    info: SourceInfo,
    frames: Array3<f32>,
    present: Vec<bool>,
}

impl FrameCache {
    /// Read every frame of `source` once.
    pub fn build<S: FrameSource + ?Sized>(source: &S) -> Result<Self> {
        Self::build_with_progress(source, |_| {})
    }

    /// Like [`FrameCache::build`], calling `on_progress` with the number of frames read.
    pub fn build_with_progress<S, F>(source: &S, on_progress: F) -> Result<Self>
    where
        S: FrameSource + ?Sized,
        F: Fn(usize),
    {
        let info = source.info().clone();
        let total = info.total_frames;
        if total == 0 {
            return Err(DdmError::EmptySequence);
        }
        let (h, w) = info.shape();

        let mut frames = Array3::<f32>::zeros((total, h, w));
        let mut present = vec![false; total];

        for (i, mut slot) in frames.axis_iter_mut(Axis(0)).enumerate() {
            if let Some(frame) = source.read_frame(i)? {
                if frame.dim() != (h, w) {
                    return Err(DdmError::ShapeMismatch {
                        expected: (h, w),
                        actual: frame.dim(),
                    });
                }
                slot.assign(&frame);
                present[i] = true;
            }
            on_progress(i + 1);
        }

        let missing = present.iter().filter(|p| !**p).count();
        if missing > 0 {
            debug!(missing, "Source produced missing frames");
        }
        info!(
            frames = total,
            height = h,
            width = w,
            megabytes = frames.len() * std::mem::size_of::<f32>() / (1024 * 1024),
            "Cached frame stack"
        );

        Ok(Self {
            info,
            frames,
            present,
        })
    }

    /// Borrow frame `index` without copying. `None` for frames the source lacked.
    pub fn view(&self, index: usize) -> Option<ArrayView2<'_, f32>> {
        if *self.present.get(index)? {
            Some(self.frames.index_axis(Axis(0), index))
        } else {
            None
        }
    }

    /// The whole stack.
    pub fn stack(&self) -> &Array3<f32> {
        &self.frames
    }

    /// Compare every frame against `source`, returning the first index whose
    /// pixels (or availability) differ.
    pub fn verify_against<S: FrameSource + ?Sized>(&self, source: &S) -> Result<Option<usize>> {
        if source.frame_count() != self.info.total_frames {
            return Ok(Some(source.frame_count().min(self.info.total_frames)));
        }
        for i in 0..self.info.total_frames {
            let cached = self.view(i);
            let direct = source.read_frame(i)?;
            let same = match (cached, direct.as_ref()) {
                (Some(c), Some(d)) => c == d.view(),
                (None, None) => true,
                _ => false,
            };
            if !same {
                debug!(index = i, "Cached frame differs from source");
                return Ok(Some(i));
            }
        }
        Ok(None)
    }
}

impl FrameSource for FrameCache {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_frame(&self, index: usize) -> Result<Option<Array2<f32>>> {
        if index >= self.info.total_frames {
            return Err(DdmError::FrameIndexOutOfRange {
                index: index as i64,
                total: self.info.total_frames,
            });
        }
        Ok(self.view(index).map(|v| v.to_owned()))
    }
}
