//! Predict textures and their reprojections for standalone view images.

use anyhow::{Context, Result};
use std::path::PathBuf;
use structopt::StructOpt;
use tch::Device;
use tracing::{info, warn};
use train::args::DeviceArg;
use uv_cycle::{checkpoint, image};

#[derive(Debug, Clone, StructOpt)]
/// Predict the UV texture of view images with a trained checkpoint
struct Args {
    #[structopt(long)]
    pub checkpoint: PathBuf,
    #[structopt(long = "image", required = true)]
    /// input view image, may be repeated
    pub images: Vec<PathBuf>,
    #[structopt(long, default_value = "results/inference")]
    pub output_dir: PathBuf,
    #[structopt(long, default_value = "256")]
    pub image_size: usize,
    #[structopt(long, default_value = "64")]
    /// base channels of both models
    pub base_channels: usize,
    #[structopt(long, default_value = "auto")]
    pub device: DeviceArg,
}

fn main() -> Result<()> {
    train::utils::init_tracing();

    let Args {
        checkpoint,
        images,
        output_dir,
        image_size,
        base_channels,
        device: DeviceArg(device),
    } = Args::from_args();

    let mut model = train::config::ModelConfig::with_base_channels(base_channels)?
        .to_init()
        .build(device);
    checkpoint::load_checkpoint(&checkpoint, &mut model)?;
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("unable to create '{}'", output_dir.display()))?;

    for path in images {
        if !path.is_file() {
            warn!("skipping missing image '{}'", path.display());
            continue;
        }
        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".into());

        let view = image::load_normalized(&path, image_size)?
            .unsqueeze(0)
            .to_device(device);
        let (uv, reproj) = tch::no_grad(|| {
            let uv = model.predict(&view, false);
            let reproj = model.render(&uv, false);
            (uv, reproj)
        });

        let uv_path = output_dir.join(format!("{}_uv.png", stem));
        let reproj_path = output_dir.join(format!("{}_reproj.png", stem));
        image::save_normalized(&uv.squeeze_dim(0).to_device(Device::Cpu), &uv_path)?;
        image::save_normalized(&reproj.squeeze_dim(0).to_device(Device::Cpu), &reproj_path)?;
        info!(
            "saved '{}' and '{}'",
            uv_path.display(),
            reproj_path.display()
        );
    }

    Ok(())
}
