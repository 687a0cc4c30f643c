pub mod cache;
pub mod image_seq;
pub mod ser;
pub mod ser_writer;
pub mod source;

use std::path::Path;

use crate::error::{DdmError, Result};
use crate::frame::ChannelSelection;

use self::image_seq::ImageSequence;
use self::ser::SerReader;
use self::source::FrameSource;

/// Open a recording as a frame source: a SER file or a directory of images.
///
/// `fps` overrides the rate stored in the recording; image sequences carry no
/// rate of their own and require it.
pub fn open_source(
    path: &Path,
    channel: ChannelSelection,
    fps: Option<f64>,
) -> Result<Box<dyn FrameSource>> {
    if path.is_dir() {
        let fps = fps.ok_or_else(|| {
            DdmError::InvalidConfig("a frame rate is required for image sequences".into())
        })?;
        return Ok(Box::new(ImageSequence::open(path, fps, channel)?));
    }

    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("ser") => {
            let reader = SerReader::open_with_channel(path, channel)?;
            Ok(Box::new(match fps {
                Some(fps) => reader.with_fps(fps),
                None => reader,
            }))
        }
        _ => Err(DdmError::SourceUnavailable {
            path: path.to_path_buf(),
            reason: "expected a .ser file or a directory of frames".into(),
        }),
    }
}
