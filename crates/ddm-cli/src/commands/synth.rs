use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use ddm_core::synth::{write_brownian_ser, BrownianConfig};

#[derive(Args)]
pub struct SynthArgs {
    /// Output SER file
    pub output: PathBuf,

    /// Frame width and height in pixels
    #[arg(long, default_value = "64")]
    pub size: usize,

    /// Number of frames
    #[arg(long, default_value = "500")]
    pub frames: usize,

    /// Frame rate
    #[arg(long, default_value = "10")]
    pub fps: f64,

    /// Pixel size in micrometres
    #[arg(long, default_value = "1.0")]
    pub pixel_size: f64,

    /// Diffusion coefficient in µm²/s
    #[arg(long, default_value = "0.5")]
    pub diffusion: f64,

    /// Number of particles
    #[arg(long, default_value = "40")]
    pub particles: usize,

    /// Spot radius (Gaussian sigma) in pixels
    #[arg(long, default_value = "1.5")]
    pub spot_sigma: f64,

    /// Bits per sample (8 or 16)
    #[arg(long, default_value = "8")]
    pub bit_depth: u32,

    /// Random seed
    #[arg(long, default_value = "42")]
    pub seed: u64,
}

pub fn run(args: &SynthArgs) -> Result<()> {
    let config = BrownianConfig {
        width: args.size,
        height: args.size,
        frames: args.frames,
        fps: args.fps,
        pixel_size: args.pixel_size,
        diffusion: args.diffusion,
        particles: args.particles,
        spot_sigma: args.spot_sigma,
        seed: args.seed,
        ..Default::default()
    };

    write_brownian_ser(&args.output, &config, args.bit_depth)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    println!(
        "Wrote {} frames of {}x{} to {}",
        config.frames,
        config.width,
        config.height,
        args.output.display()
    );
    println!(
        "  D = {} µm²/s, {} particles, {} fps, {} µm/px",
        config.diffusion, config.particles, config.fps, config.pixel_size
    );
    Ok(())
}
