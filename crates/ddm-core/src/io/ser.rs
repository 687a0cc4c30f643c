use std::fs::File;
use std::path::Path;

use byteorder::{LittleEndian, ReadBytesExt};
use memmap2::Mmap;
use ndarray::Array2;
use tracing::debug;

use crate::error::{DdmError, Result};
use crate::frame::{reduce_channels, ChannelSelection, ColorMode, SourceInfo};
use crate::io::source::FrameSource;

pub const SER_HEADER_SIZE: usize = 178;
pub const SER_MAGIC: &[u8; 14] = b"LUCAM-RECORDER";

/// SER timestamps count 100 ns ticks.
const SER_TICKS_PER_SECOND: f64 = 1e7;

/// SER file header (178 bytes).
#[derive(Clone, Debug)]
pub struct SerHeader {
    pub color_id: i32,
    pub little_endian: bool,
    pub width: u32,
    pub height: u32,
    pub pixel_depth: u32,
    pub frame_count: u32,
    pub observer: String,
    pub instrument: String,
    pub telescope: String,
    pub date_time: u64,
    pub date_time_utc: u64,
}

impl SerHeader {
    /// Header for a mono recording, as written by the synthetic video generator.
    pub fn mono(width: u32, height: u32, pixel_depth: u32, frame_count: u32) -> Self {
        Self {
            color_id: 0,
            little_endian: true,
            width,
            height,
            pixel_depth,
            frame_count,
            observer: String::new(),
            instrument: String::new(),
            telescope: String::new(),
            date_time: 0,
            date_time_utc: 0,
        }
    }

    /// Bytes per pixel plane (1 for 8-bit, 2 for 9-16 bit).
    pub fn bytes_per_pixel_plane(&self) -> usize {
        if self.pixel_depth <= 8 { 1 } else { 2 }
    }

    /// Number of planes per pixel (1 for mono/bayer, 3 for RGB/BGR).
    pub fn planes_per_pixel(&self) -> usize {
        self.color_mode().planes()
    }

    /// Total bytes per frame. Fails when the header's dimensions cannot be
    /// addressed on this platform.
    pub fn frame_byte_size(&self) -> Result<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|n| n.checked_mul(self.bytes_per_pixel_plane()))
            .and_then(|n| n.checked_mul(self.planes_per_pixel()))
            .ok_or(DdmError::InvalidDimensions {
                width: self.width,
                height: self.height,
            })
    }

    /// Bytes from the start of the file to the end of the last frame.
    pub fn data_end(&self) -> Result<usize> {
        self.frame_byte_size()?
            .checked_mul(self.frame_count as usize)
            .and_then(|n| n.checked_add(SER_HEADER_SIZE))
            .ok_or_else(|| {
                DdmError::InvalidSer(format!(
                    "{} frames of {}x{} do not fit in addressable memory",
                    self.frame_count, self.width, self.height
                ))
            })
    }

    pub fn color_mode(&self) -> ColorMode {
        match self.color_id {
            0 => ColorMode::Mono,
            8 => ColorMode::BayerRGGB,
            9 => ColorMode::BayerGRBG,
            10 => ColorMode::BayerGBRG,
            11 => ColorMode::BayerBGGR,
            100 => ColorMode::RGB,
            101 => ColorMode::BGR,
            _ => ColorMode::Mono,
        }
    }
}

/// Memory-mapped SER video used as a frame source.
pub struct SerReader {
    mmap: Mmap,
    pub header: SerHeader,
    info: SourceInfo,
    channel: ChannelSelection,
}

impl SerReader {
    /// Open a SER file, reducing colour pixels to their mean intensity.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_channel(path, ChannelSelection::Mean)
    }

    /// Open a SER file with an explicit channel reduction.
    ///
    /// The frame rate is derived from the timestamp trailer when present and
    /// is 0 otherwise; use [`SerReader::with_fps`] to supply it.
    pub fn open_with_channel(path: &Path, channel: ChannelSelection) -> Result<Self> {
        let unavailable = |reason: String| DdmError::SourceUnavailable {
            path: path.to_path_buf(),
            reason,
        };
        let file = File::open(path).map_err(|e| unavailable(e.to_string()))?;
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| unavailable(e.to_string()))?;

        if mmap.len() < SER_HEADER_SIZE {
            return Err(DdmError::InvalidSer("File too small for SER header".into()));
        }

        if &mmap[0..14] != SER_MAGIC {
            return Err(DdmError::InvalidSer("Missing LUCAM-RECORDER magic".into()));
        }

        let header = parse_header(&mmap[..SER_HEADER_SIZE])?;

        let expected_data_size = header.data_end()?;
        if mmap.len() < expected_data_size {
            return Err(DdmError::InvalidSer(format!(
                "File truncated: expected at least {} bytes, got {}",
                expected_data_size,
                mmap.len()
            )));
        }

        if let ChannelSelection::Channel(c) = channel {
            if c >= header.planes_per_pixel() {
                return Err(DdmError::InvalidConfig(format!(
                    "channel {c} requested but the source has {} plane(s)",
                    header.planes_per_pixel()
                )));
            }
        }

        let info = SourceInfo {
            filename: path.to_path_buf(),
            total_frames: header.frame_count as usize,
            width: header.width,
            height: header.height,
            bit_depth: header.pixel_depth as u8,
            color_mode: header.color_mode(),
            fps: 0.0,
        };

        let mut reader = Self {
            mmap,
            header,
            info,
            channel,
        };
        if let Some(fps) = reader.fps_from_timestamps() {
            debug!(fps, "Frame rate from SER timestamps");
            reader.info.fps = fps;
        }
        Ok(reader)
    }

    /// Override the frame rate.
    pub fn with_fps(mut self, fps: f64) -> Self {
        self.info.fps = fps;
        self
    }

    /// Get the raw bytes for a single frame (zero-copy from mmap).
    pub fn frame_raw(&self, index: usize) -> Result<&[u8]> {
        let count = self.info.total_frames;
        if index >= count {
            return Err(DdmError::FrameIndexOutOfRange {
                index: index as i64,
                total: count,
            });
        }
        // open() checked that every frame lies inside the mapping.
        let size = self.header.frame_byte_size()?;
        let offset = SER_HEADER_SIZE + index * size;
        Ok(&self.mmap[offset..offset + size])
    }

    /// Per-frame timestamp from the optional trailer.
    pub fn timestamp(&self, index: usize) -> Option<u64> {
        let trailer_offset = self.header.data_end().ok()?;
        let ts_offset = trailer_offset.checked_add(index.checked_mul(8)?)?;
        if ts_offset.checked_add(8)? <= self.mmap.len() {
            let bytes = &self.mmap[ts_offset..ts_offset + 8];
            Some(u64::from_le_bytes(bytes.try_into().ok()?))
        } else {
            None
        }
    }

    fn fps_from_timestamps(&self) -> Option<f64> {
        let n = self.info.total_frames;
        if n < 2 {
            return None;
        }
        let first = self.timestamp(0)?;
        let last = self.timestamp(n - 1)?;
        if last <= first {
            return None;
        }
        let seconds = (last - first) as f64 / SER_TICKS_PER_SECOND;
        Some((n - 1) as f64 / seconds)
    }
}

impl FrameSource for SerReader {
    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn read_frame(&self, index: usize) -> Result<Option<Array2<f32>>> {
        let raw = self.frame_raw(index)?;
        let data = decode_frame(
            raw,
            self.info.height as usize,
            self.info.width as usize,
            self.header.bytes_per_pixel_plane(),
            self.header.planes_per_pixel(),
            self.header.little_endian,
            self.channel,
        );
        Ok(Some(data))
    }
}

fn parse_header(buf: &[u8]) -> Result<SerHeader> {
    let mut cursor = std::io::Cursor::new(&buf[14..]); // skip magic

    let _lu_id = cursor.read_i32::<LittleEndian>()?;
    let color_id = cursor.read_i32::<LittleEndian>()?;
    let le_flag = cursor.read_i32::<LittleEndian>()?;
    let width = cursor.read_i32::<LittleEndian>()? as u32;
    let height = cursor.read_i32::<LittleEndian>()? as u32;
    let pixel_depth = cursor.read_i32::<LittleEndian>()? as u32;
    let frame_count = cursor.read_i32::<LittleEndian>()? as u32;

    let observer = read_fixed_string(&buf[42..82]);
    let instrument = read_fixed_string(&buf[82..122]);
    let telescope = read_fixed_string(&buf[122..162]);

    let mut cursor = std::io::Cursor::new(&buf[162..]);
    let date_time = cursor.read_u64::<LittleEndian>()?;
    let date_time_utc = cursor.read_u64::<LittleEndian>()?;

    if width == 0 || height == 0 {
        return Err(DdmError::InvalidDimensions { width, height });
    }
    if pixel_depth == 0 || pixel_depth > 16 {
        return Err(DdmError::InvalidSer(format!(
            "Unsupported pixel depth {pixel_depth}"
        )));
    }

    // Treat 0 as little-endian, following Siril; most writers set 0 for LE data.
    let little_endian = le_flag != 1;

    Ok(SerHeader {
        color_id,
        little_endian,
        width,
        height,
        pixel_depth,
        frame_count,
        observer,
        instrument,
        telescope,
        date_time,
        date_time_utc,
    })
}

fn read_fixed_string(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf)
        .trim_end_matches('\0')
        .trim()
        .to_string()
}

/// Decode one frame of interleaved samples into raw intensity counts.
fn decode_frame(
    raw: &[u8],
    height: usize,
    width: usize,
    bytes_per_sample: usize,
    planes: usize,
    little_endian: bool,
    channel: ChannelSelection,
) -> Array2<f32> {
    let sample = |idx: usize| -> f32 {
        if bytes_per_sample == 1 {
            raw[idx] as f32
        } else {
            let pair = [raw[idx], raw[idx + 1]];
            if little_endian {
                u16::from_le_bytes(pair) as f32
            } else {
                u16::from_be_bytes(pair) as f32
            }
        }
    };

    let mut data = Array2::<f32>::zeros((height, width));
    let mut samples = vec![0.0f32; planes];

    for row in 0..height {
        for col in 0..width {
            let pixel_offset = (row * width + col) * planes * bytes_per_sample;
            data[[row, col]] = if planes == 1 {
                sample(pixel_offset)
            } else {
                for (p, s) in samples.iter_mut().enumerate() {
                    *s = sample(pixel_offset + p * bytes_per_sample);
                }
                reduce_channels(&samples, channel)
            };
        }
    }

    data
}
