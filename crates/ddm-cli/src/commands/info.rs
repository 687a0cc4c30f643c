use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ddm_core::frame::ChannelSelection;
use ddm_core::io::open_source;

#[derive(Args)]
pub struct InfoArgs {
    /// Input SER file or directory of frames
    pub file: PathBuf,

    /// Frame rate (required for image directories)
    #[arg(long)]
    pub fps: Option<f64>,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    let source = open_source(&args.file, ChannelSelection::Mean, args.fps)
        .with_context(|| format!("Failed to open {}", args.file.display()))?;
    let info = source.info();

    println!("File:        {}", info.filename.display());
    println!("Frames:      {}", info.total_frames);
    println!("Dimensions:  {}x{}", info.width, info.height);
    println!("Bit depth:   {}", info.bit_depth);
    println!("Color mode:  {:?}", info.color_mode);
    if info.fps > 0.0 {
        println!("Frame rate:  {:.3} fps", info.fps);
        println!("Duration:    {:.2} s", info.duration());
    } else {
        println!("Frame rate:  unknown (pass --fps)");
    }

    let sample_bytes = if info.bit_depth <= 8 { 1 } else { 2 };
    let total_mb = (info.width as usize * info.height as usize * sample_bytes * info.total_frames)
        as f64
        / (1024.0 * 1024.0);
    println!("Data size:   {:.1} MB", total_mb);

    Ok(())
}
