mod config;

use std::path::PathBuf;

use clap::Parser;
use config::FileConfig;
use pixelart_core::{Engine, EngineParams, LabImage};
use tracing::info;

/// Pixelate a photograph into a small output image with a learned palette.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Args {
    /// Path to the input image.
    #[arg(short, long)]
    input: PathBuf,

    /// Path to write the output image.
    #[arg(short, long)]
    output: PathBuf,

    /// Output width in superpixels.
    #[arg(long)]
    width: u32,

    /// Output height in superpixels.
    #[arg(long)]
    height: u32,

    /// Target palette size.
    #[arg(short = 'c', long = "colors")]
    palette_size: usize,

    /// Maximum number of iterations before giving up on convergence.
    #[arg(long, default_value_t = 512)]
    max_iterations: u64,

    /// Optional TOML file with `slic_factor`/`sigma_color`/`sigma_pos`/
    /// `smooth_pos`/`saturation` overrides.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    slic_factor: Option<f64>,
    #[arg(long)]
    sigma_color: Option<f64>,
    #[arg(long)]
    sigma_pos: Option<f64>,
    #[arg(long)]
    smooth_pos: Option<f64>,
    #[arg(long)]
    saturation: Option<f64>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let mut params = EngineParams::default();
    if let Some(config_path) = &args.config {
        let file_config = FileConfig::load(config_path)?;
        if let Some(v) = file_config.slic_factor {
            params.slic_factor = v;
        }
        if let Some(v) = file_config.sigma_color {
            params.sigma_color = v;
        }
        if let Some(v) = file_config.sigma_pos {
            params.sigma_pos = v;
        }
        if let Some(v) = file_config.smooth_pos {
            params.smooth_pos = v;
        }
        if let Some(v) = file_config.saturation {
            params.saturation = v;
        }
    }
    if let Some(v) = args.slic_factor {
        params.slic_factor = v;
    }
    if let Some(v) = args.sigma_color {
        params.sigma_color = v;
    }
    if let Some(v) = args.sigma_pos {
        params.sigma_pos = v;
    }
    if let Some(v) = args.smooth_pos {
        params.smooth_pos = v;
    }
    if let Some(v) = args.saturation {
        params.saturation = v;
    }

    let bytes = std::fs::read(&args.input)?;
    let input: LabImage = image::load_from_memory(&bytes)?.into();

    let out_size = glam::UVec2::new(args.width, args.height);
    let mut engine = Engine::new(input, out_size, args.palette_size, params)?;

    for i in 0..args.max_iterations {
        if engine.has_converged() {
            info!(iterations = i, "converged");
            break;
        }
        engine.iterate();
    }

    let output = engine.get_output_image();
    output.save(&args.output)?;

    info!(path = %args.output.display(), "wrote output image");
    Ok(())
}
