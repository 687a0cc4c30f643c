use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::Array2;

use crate::error::{DdmError, Result};
use crate::io::ser::{SerHeader, SER_HEADER_SIZE, SER_MAGIC};

/// Writes a valid SER file at the raw byte level.
pub struct SerWriter {
    writer: BufWriter<File>,
    header: SerHeader,
    frames_written: u32,
}

impl SerWriter {
    /// Create a new SER file and write the header.
    pub fn create(path: &Path, header: &SerHeader) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        write_header(&mut writer, header)?;
        Ok(Self {
            writer,
            header: header.clone(),
            frames_written: 0,
        })
    }

    /// Write a single raw frame (bytes must match the header's frame_byte_size).
    pub fn write_raw_frame(&mut self, data: &[u8]) -> Result<()> {
        let expected = self.header.frame_byte_size()?;
        if data.len() != expected {
            return Err(DdmError::InvalidSer(format!(
                "frame has {} bytes, header expects {expected}",
                data.len()
            )));
        }
        self.writer.write_all(data)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Write a mono intensity frame, rounding and clamping to the header's bit depth.
    pub fn write_frame(&mut self, frame: &Array2<f32>) -> Result<()> {
        let (h, w) = frame.dim();
        if (h, w) != (self.header.height as usize, self.header.width as usize) {
            return Err(DdmError::ShapeMismatch {
                expected: (self.header.height as usize, self.header.width as usize),
                actual: (h, w),
            });
        }
        let max_val = ((1u32 << self.header.pixel_depth) - 1) as f32;
        let mut bytes = Vec::with_capacity(self.header.frame_byte_size()?);
        for &v in frame.iter() {
            let count = v.round().clamp(0.0, max_val);
            if self.header.bytes_per_pixel_plane() == 1 {
                bytes.push(count as u8);
            } else {
                bytes.extend_from_slice(&(count as u16).to_le_bytes());
            }
        }
        self.write_raw_frame(&bytes)
    }

    /// Write the optional timestamp trailer (one u64 per frame, little-endian).
    pub fn write_timestamps(&mut self, timestamps: &[u64]) -> Result<()> {
        for &ts in timestamps {
            self.writer.write_all(&ts.to_le_bytes())?;
        }
        Ok(())
    }

    /// Write evenly spaced timestamps encoding a constant frame rate.
    pub fn write_frame_rate(&mut self, fps: f64) -> Result<()> {
        let step = 1e7 / fps;
        let timestamps: Vec<u64> = (0..self.frames_written)
            .map(|i| (i as f64 * step).round() as u64)
            .collect();
        self.write_timestamps(&timestamps)
    }

    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// Flush and finalize the file.
    pub fn finalize(mut self) -> Result<()> {
        if self.frames_written != self.header.frame_count {
            return Err(DdmError::InvalidSer(format!(
                "header declares {} frames, {} written",
                self.header.frame_count, self.frames_written
            )));
        }
        self.writer.flush()?;
        Ok(())
    }
}

fn write_header(w: &mut impl Write, header: &SerHeader) -> Result<()> {
    w.write_all(SER_MAGIC)?;
    // LuID
    w.write_all(&0i32.to_le_bytes())?;
    w.write_all(&header.color_id.to_le_bytes())?;
    // 0 = little-endian (Siril convention)
    let le_flag: i32 = if header.little_endian { 0 } else { 1 };
    w.write_all(&le_flag.to_le_bytes())?;
    w.write_all(&(header.width as i32).to_le_bytes())?;
    w.write_all(&(header.height as i32).to_le_bytes())?;
    w.write_all(&(header.pixel_depth as i32).to_le_bytes())?;
    w.write_all(&(header.frame_count as i32).to_le_bytes())?;
    write_fixed_string(w, &header.observer, 40)?;
    write_fixed_string(w, &header.instrument, 40)?;
    write_fixed_string(w, &header.telescope, 40)?;
    w.write_all(&header.date_time.to_le_bytes())?;
    w.write_all(&header.date_time_utc.to_le_bytes())?;

    debug_assert_eq!(
        14 + 4 + 4 + 4 + 4 + 4 + 4 + 4 + 40 + 40 + 40 + 8 + 8,
        SER_HEADER_SIZE
    );
    Ok(())
}

fn write_fixed_string(w: &mut impl Write, s: &str, len: usize) -> Result<()> {
    let bytes = s.as_bytes();
    let to_write = bytes.len().min(len);
    w.write_all(&bytes[..to_write])?;
    w.write_all(&vec![0u8; len - to_write])?;
    Ok(())
}
