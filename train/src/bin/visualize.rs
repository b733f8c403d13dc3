//! Render side-by-side comparisons of a trained model on dataset samples.

use anyhow::{ensure, Context, Result};
use rand::{rngs::StdRng, SeedableRng};
use std::path::PathBuf;
use structopt::StructOpt;
use tch::{Device, Tensor};
use tch_tensor_like::TensorLike as _;
use tracing::info;
use train::args::DeviceArg;
use uv_cycle::{
    checkpoint,
    dataset::{PairedViewDataset, TrainingBatch},
    image,
    model::ModelPairInit,
};

#[derive(Debug, Clone, StructOpt)]
/// Write input, reprojection and texture tiles for dataset samples
struct Args {
    #[structopt(long)]
    pub checkpoint: PathBuf,
    #[structopt(long)]
    /// manifest file or dataset directory
    pub dataset: PathBuf,
    #[structopt(long)]
    pub output: PathBuf,
    #[structopt(long, default_value = "12")]
    pub num_samples: usize,
    #[structopt(long, default_value = "256")]
    pub image_size: usize,
    #[structopt(long, default_value = "64")]
    /// base channels of both models
    pub base_channels: usize,
    #[structopt(long, default_value = "1337")]
    pub seed: u64,
    #[structopt(long, default_value = "auto")]
    pub device: DeviceArg,
}

fn main() -> Result<()> {
    train::utils::init_tracing();

    let Args {
        checkpoint,
        dataset,
        output,
        num_samples,
        image_size,
        base_channels,
        seed,
        device: DeviceArg(device),
    } = Args::from_args();
    ensure!(num_samples > 0, "num_samples must be positive");

    let mut model = train::config::ModelConfig::with_base_channels(base_channels)?
        .to_init()
        .build(device);
    let metrics = checkpoint::load_checkpoint(&checkpoint, &mut model)?;
    info!("loaded '{}' with metrics {:?}", checkpoint.display(), metrics.to_map());

    let dataset = PairedViewDataset::open(&dataset, image_size)?;
    let mut rng = StdRng::seed_from_u64(seed);
    std::fs::create_dir_all(&output)
        .with_context(|| format!("unable to create '{}'", output.display()))?;

    for index in 0..num_samples.min(dataset.len()) {
        let sample = dataset.get(index, &mut rng)?;
        let batch = TrainingBatch::from_samples(&[sample])?.to_device(device);

        let tiles = tch::no_grad(|| {
            let uv_pred = model.predict(&batch.view_a, false);
            let reproj_pred = model.render(&uv_pred, false);
            let reproj_gt = model.render(&batch.uv_gt, false);
            [
                batch.view_a.shallow_clone(),
                reproj_pred,
                reproj_gt,
                uv_pred,
                batch.uv_gt.shallow_clone(),
                batch.view_b.shallow_clone(),
            ]
        });
        let grid = tile_grid(&tiles, 3);

        let path = output.join(format!("sample_{:03}.png", index));
        image::save_normalized(&grid.to_device(Device::Cpu), &path)?;
        info!("wrote '{}'", path.display());
    }

    Ok(())
}

/// Arrange `[1, 3, H, W]` tiles into rows of `columns` tiles.
fn tile_grid(tiles: &[Tensor], columns: usize) -> Tensor {
    let rows: Vec<Tensor> = tiles
        .chunks(columns)
        .map(|row| {
            let row: Vec<Tensor> = row.iter().map(|tile| tile.squeeze_dim(0)).collect();
            Tensor::cat(&row, 2)
        })
        .collect();
    Tensor::cat(&rows, 1)
}
