//! Command line arguments of the training program.
//!
//! Every flag is optional and overrides the configuration file, which in turn
//! overrides the defaults.

use crate::{
    common::*,
    config::{Config, LearningRateSchedule},
};
use std::str::FromStr;

#[derive(Debug, Clone, StructOpt)]
/// Train the texture predictor and renderer with cycle consistency
pub struct Args {
    #[structopt(long)]
    /// configuration file in JSON5 format
    pub config_file: Option<PathBuf>,
    #[structopt(long)]
    /// manifest file or dataset directory
    pub dataset: Option<PathBuf>,
    #[structopt(long)]
    pub epochs: Option<NonZeroUsize>,
    #[structopt(long)]
    pub batch_size: Option<NonZeroUsize>,
    #[structopt(long)]
    pub lr: Option<f64>,
    #[structopt(long)]
    /// constant or cosine
    pub lr_scheduler: Option<LrSchedulerKind>,
    #[structopt(long)]
    /// the annealing period of the cosine scheduler in epochs
    pub lr_scheduler_tmax: Option<NonZeroUsize>,
    #[structopt(long)]
    /// the final learning rate of the cosine scheduler
    pub lr_min: Option<f64>,
    #[structopt(long)]
    pub image_size: Option<NonZeroUsize>,
    #[structopt(long)]
    /// fraction of samples held out for evaluation
    pub val_split: Option<f64>,
    #[structopt(long)]
    pub seed: Option<u64>,
    #[structopt(long)]
    pub num_workers: Option<NonZeroUsize>,
    #[structopt(long)]
    /// cpu, cuda, cuda:N or auto
    pub device: Option<DeviceArg>,
    #[structopt(long)]
    pub w_cycle: Option<f64>,
    #[structopt(long)]
    pub w_uv: Option<f64>,
    #[structopt(long)]
    pub w_direct: Option<f64>,
    #[structopt(long)]
    pub w_cross: Option<f64>,
    #[structopt(long)]
    /// the cycle weight at the last epoch
    pub w_cycle_end: Option<f64>,
    #[structopt(long)]
    pub w_uv_end: Option<f64>,
    #[structopt(long)]
    pub w_direct_end: Option<f64>,
    #[structopt(long)]
    pub w_cross_end: Option<f64>,
    #[structopt(long)]
    /// file name of the best checkpoint
    pub checkpoint_name: Option<String>,
    #[structopt(long)]
    /// also save a checkpoint every this many epochs
    pub checkpoint_every: Option<usize>,
    #[structopt(long)]
    /// directory of the checkpoints
    pub output_dir: Option<PathBuf>,
    #[structopt(long)]
    /// directory of the tensorboard logs
    pub log_dir: Option<PathBuf>,
    #[structopt(long)]
    /// TorchScript LPIPS network for the perceptual metric
    pub lpips_model: Option<PathBuf>,
}

impl Args {
    /// Layer the arguments over the configuration file or the defaults.
    pub fn into_config(self) -> Result<Config> {
        let mut config = match &self.config_file {
            Some(path) => Config::open(path)
                .with_context(|| format!("failed to load config file '{}'", path.display()))?,
            None => Config::default(),
        };
        self.apply(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply(self, config: &mut Config) -> Result<()> {
        let Self {
            config_file: _,
            dataset,
            epochs,
            batch_size,
            lr,
            lr_scheduler,
            lr_scheduler_tmax,
            lr_min,
            image_size,
            val_split,
            seed,
            num_workers,
            device,
            w_cycle,
            w_uv,
            w_direct,
            w_cross,
            w_cycle_end,
            w_uv_end,
            w_direct_end,
            w_cross_end,
            checkpoint_name,
            checkpoint_every,
            output_dir,
            log_dir,
            lpips_model,
        } = self;

        if let Some(path) = dataset {
            config.dataset.path = path;
        }
        if let Some(size) = image_size {
            config.dataset.image_size = size;
        }
        if let Some(fraction) = val_split {
            ensure!(fraction.is_finite(), "val_split must be finite");
            config.dataset.val_fraction = r64(fraction);
        }
        if let Some(num) = num_workers {
            config.dataset.num_workers = num;
        }

        let training = &mut config.training;
        if let Some(epochs) = epochs {
            training.epochs = epochs;
        }
        if let Some(batch_size) = batch_size {
            training.batch_size = batch_size;
        }
        if let Some(seed) = seed {
            training.seed = seed;
        }
        if let Some(DeviceArg(device)) = device {
            training.device = device;
        }

        // learning rate
        if lr.is_some() || lr_scheduler.is_some() {
            ensure!(
                lr.map_or(true, f64::is_finite),
                "lr must be finite"
            );
            let base_lr = r64(lr.unwrap_or_else(|| training.lr_schedule.initial_lr()));
            let kind = lr_scheduler.unwrap_or(match training.lr_schedule {
                LearningRateSchedule::Cosine { .. } => LrSchedulerKind::Cosine,
                _ => LrSchedulerKind::Constant,
            });
            training.lr_schedule = match kind {
                LrSchedulerKind::Constant => LearningRateSchedule::Constant { lr: base_lr },
                LrSchedulerKind::Cosine => LearningRateSchedule::Cosine {
                    lr: base_lr,
                    t_max: training.epochs,
                    eta_min: r64(0.0),
                },
            };
        }
        if let LearningRateSchedule::Cosine { t_max, eta_min, .. } = &mut training.lr_schedule {
            if let Some(tmax) = lr_scheduler_tmax {
                *t_max = tmax;
            }
            if let Some(min) = lr_min {
                ensure!(min.is_finite(), "lr_min must be finite");
                *eta_min = r64(min);
            }
        } else if lr_scheduler_tmax.is_some() || lr_min.is_some() {
            warn!("--lr-scheduler-tmax and --lr-min only apply to the cosine scheduler");
        }

        // loss weights
        let schedule = &mut training.loss_weights;
        let set = |target: &mut f64, value: Option<f64>| -> Result<()> {
            if let Some(value) = value {
                ensure!(value.is_finite(), "loss weights must be finite");
                *target = value;
            }
            Ok(())
        };
        set(&mut schedule.start.cycle, w_cycle)?;
        set(&mut schedule.start.uv_recon, w_uv)?;
        set(&mut schedule.start.direct, w_direct)?;
        set(&mut schedule.start.cross, w_cross)?;

        if [w_cycle_end, w_uv_end, w_direct_end, w_cross_end]
            .iter()
            .any(Option::is_some)
        {
            let mut end = schedule.end.unwrap_or(schedule.start);
            set(&mut end.cycle, w_cycle_end)?;
            set(&mut end.uv_recon, w_uv_end)?;
            set(&mut end.direct, w_direct_end)?;
            set(&mut end.cross, w_cross_end)?;
            schedule.end = Some(end);
        }

        // outputs
        if let Some(name) = checkpoint_name {
            config.output.checkpoint_name = name;
        }
        if let Some(every) = checkpoint_every {
            config.output.checkpoint_every = NonZeroUsize::new(every);
        }
        if let Some(dir) = output_dir {
            config.output.dir = dir;
        }
        if let Some(dir) = log_dir {
            config.logging.dir = dir;
        }
        if let Some(path) = lpips_model {
            config.evaluation.perceptual_model = Some(path);
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LrSchedulerKind {
    Constant,
    Cosine,
}

impl FromStr for LrSchedulerKind {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(match text {
            "constant" | "none" => Self::Constant,
            "cosine" => Self::Cosine,
            _ => bail!("unsupported learning rate scheduler '{}'", text),
        })
    }
}

/// A parsed device name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceArg(pub Device);

impl FromStr for DeviceArg {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let device = match text {
            "cpu" => Device::Cpu,
            "cuda" => Device::Cuda(0),
            "auto" => Device::cuda_if_available(),
            _ => {
                let index = text
                    .strip_prefix("cuda:")
                    .and_then(|index| index.parse().ok())
                    .ok_or_else(|| format_err!("invalid device '{}'", text))?;
                Device::Cuda(index)
            }
        };
        Ok(Self(device))
    }
}
