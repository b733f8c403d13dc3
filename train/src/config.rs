//! Training program configuration format.

use crate::common::*;

pub use dataset::*;
pub use output::*;
pub use training::*;

/// The main training configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub dataset: DatasetConfig,
    pub model: ModelConfig,
    pub training: TrainingConfig,
    pub evaluation: EvaluationConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let text = std::fs::read_to_string(path)?;
        let config = json5::from_str(&text)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let image_size = self.dataset.image_size.get();
        ensure!(
            image_size % 16 == 0,
            "image_size must be a multiple of 16, but get {}",
            image_size
        );
        let val_fraction = self.dataset.val_fraction.raw();
        ensure!(
            (0.0..1.0).contains(&val_fraction),
            "val_fraction must be in range [0, 1), but get {}",
            val_fraction
        );
        ensure!(
            !self.output.checkpoint_name.is_empty(),
            "checkpoint_name must not be empty"
        );
        self.training.loss_weights.validate()?;
        self.training.lr_schedule.validate()?;
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dataset: DatasetConfig::default(),
            model: ModelConfig::default(),
            training: TrainingConfig::default(),
            evaluation: EvaluationConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

mod dataset {
    use super::*;

    /// Dataset options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct DatasetConfig {
        /// The manifest file or the directory containing `metadata.json`.
        pub path: PathBuf,
        /// The side length images are resized to.
        pub image_size: NonZeroUsize,
        /// The fraction of samples held out for evaluation.
        pub val_fraction: R64,
        /// The maximum number of samples decoded concurrently.
        pub num_workers: NonZeroUsize,
    }

    impl Default for DatasetConfig {
        fn default() -> Self {
            Self {
                path: PathBuf::from("results/augmented_dataset"),
                image_size: NonZeroUsize::new(256).unwrap(),
                val_fraction: r64(0.1),
                num_workers: NonZeroUsize::new(4).unwrap(),
            }
        }
    }
}

/// The model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Channels of the first predictor stage.
    pub predictor_channels: NonZeroUsize,
    /// Channels of the renderer's first layers.
    pub renderer_channels: NonZeroUsize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            predictor_channels: NonZeroUsize::new(64).unwrap(),
            renderer_channels: NonZeroUsize::new(64).unwrap(),
        }
    }
}

impl ModelConfig {
    /// Use the same base channels for both models.
    pub fn with_base_channels(base_channels: usize) -> Result<Self> {
        let channels = NonZeroUsize::new(base_channels)
            .ok_or_else(|| format_err!("base_channels must be positive"))?;
        Ok(Self {
            predictor_channels: channels,
            renderer_channels: channels,
        })
    }

    pub fn to_init(&self) -> ModelPairInit {
        ModelPairInit {
            predictor: TexturePredictorInit {
                base_c: self.predictor_channels.get(),
                ..Default::default()
            },
            renderer: RendererInit {
                base_c: self.renderer_channels.get(),
                ..Default::default()
            },
        }
    }
}

mod training {
    use super::*;

    /// The training options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct TrainingConfig {
        pub epochs: NonZeroUsize,
        pub batch_size: NonZeroUsize,
        /// Seeds the data split, the partner draws and the weight initialization.
        pub seed: u64,
        /// Learning rate scheduling strategy, stepped once per epoch.
        pub lr_schedule: LearningRateSchedule,
        /// The exponential decay rates of Adam.
        pub beta1: R64,
        pub beta2: R64,
        pub weight_decay: R64,
        pub loss_weights: LossWeightSchedule,
        #[serde(with = "tch_serde::serde_device")]
        pub device: Device,
    }

    impl Default for TrainingConfig {
        fn default() -> Self {
            Self {
                epochs: NonZeroUsize::new(50).unwrap(),
                batch_size: NonZeroUsize::new(6).unwrap(),
                seed: 1337,
                lr_schedule: LearningRateSchedule::Constant { lr: r64(2e-4) },
                beta1: r64(0.5),
                beta2: r64(0.999),
                weight_decay: r64(0.0),
                loss_weights: LossWeightSchedule::constant(LossWeights::default()),
                device: Device::cuda_if_available(),
            }
        }
    }

    /// The learning rate scheduling strategy.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type")]
    pub enum LearningRateSchedule {
        /// Use constant learning rate.
        Constant { lr: R64 },
        /// Use specific learning rate starting from specified epochs.
        ///
        /// Epochs are counted from zero.
        StepWise { steps: Vec<(usize, R64)> },
        /// Cosine annealing from `lr` to `eta_min` over `t_max` epochs.
        Cosine {
            lr: R64,
            t_max: NonZeroUsize,
            #[serde(default = "zero_r64")]
            eta_min: R64,
        },
    }

    impl LearningRateSchedule {
        /// The learning rate of the first epoch.
        pub fn initial_lr(&self) -> f64 {
            match self {
                Self::Constant { lr } => lr.raw(),
                Self::StepWise { steps } => steps.first().map(|(_, lr)| lr.raw()).unwrap_or(0.0),
                Self::Cosine { lr, .. } => lr.raw(),
            }
        }

        pub fn validate(&self) -> Result<()> {
            match self {
                Self::Constant { lr } => {
                    ensure!(lr.raw() > 0.0, "lr must be positive");
                }
                Self::StepWise { steps } => {
                    ensure!(
                        !steps.is_empty() && steps[0].0 == 0,
                        "the steps must start from zero"
                    );
                    ensure!(
                        steps.iter().tuple_windows().all(|(lhs, rhs)| lhs.0 < rhs.0),
                        "the steps must be monotonic"
                    );
                    ensure!(
                        steps.iter().all(|(_, lr)| lr.raw() > 0.0),
                        "lr must be positive"
                    );
                }
                Self::Cosine { lr, eta_min, .. } => {
                    ensure!(lr.raw() > 0.0, "lr must be positive");
                    ensure!(
                        eta_min.raw() >= 0.0 && eta_min <= lr,
                        "eta_min must be in range [0, lr]"
                    );
                }
            }
            Ok(())
        }
    }

    fn zero_r64() -> R64 {
        r64(0.0)
    }
}

/// Evaluation options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// A TorchScript LPIPS network. Without it the perceptual metric is NaN.
    pub perceptual_model: Option<PathBuf>,
}

mod output {
    use super::*;

    /// Checkpoint output options.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct OutputConfig {
        pub dir: PathBuf,
        /// The file name of the best checkpoint.
        pub checkpoint_name: String,
        /// If set, also save a checkpoint every this many epochs.
        pub checkpoint_every: Option<NonZeroUsize>,
    }

    impl Default for OutputConfig {
        fn default() -> Self {
            Self {
                dir: PathBuf::from("results"),
                checkpoint_name: "best_model.ckpt".into(),
                checkpoint_every: None,
            }
        }
    }

    impl OutputConfig {
        pub fn best_checkpoint_path(&self) -> PathBuf {
            self.dir.join(&self.checkpoint_name)
        }

        /// The path of the periodic checkpoint of a 1-based epoch.
        pub fn periodic_checkpoint_path(&self, epoch: usize) -> PathBuf {
            let name = Path::new(&self.checkpoint_name);
            let stem = name
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.checkpoint_name.clone());
            let file_name = match name.extension() {
                Some(ext) => format!("{}_epoch{:03}.{}", stem, epoch, ext.to_string_lossy()),
                None => format!("{}_epoch{:03}", stem, epoch),
            };
            self.dir.join(file_name)
        }
    }
}

/// Data logging options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    /// Write predicted textures and reprojections of each evaluation.
    pub enable_images: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            enable_images: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.training.epochs.get(), 50);
        assert_eq!(config.training.batch_size.get(), 6);
        assert_eq!(config.training.seed, 1337);
        assert_eq!(config.dataset.image_size.get(), 256);
    }

    #[test]
    fn periodic_checkpoint_keeps_extension() {
        let output = OutputConfig {
            dir: PathBuf::from("out"),
            checkpoint_name: "run_short.ckpt".into(),
            checkpoint_every: None,
        };
        assert_eq!(
            output.periodic_checkpoint_path(7),
            PathBuf::from("out/run_short_epoch007.ckpt")
        );
    }

    #[test]
    fn config_file_is_parsed_as_json5() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("train.json5");
        let mut config = Config::default();
        config.training.device = Device::Cpu;
        config.training.lr_schedule = LearningRateSchedule::Cosine {
            lr: r64(2e-4),
            t_max: NonZeroUsize::new(20).unwrap(),
            eta_min: r64(0.0),
        };
        fs::write(&path, serde_json::to_string_pretty(&config)?)?;

        let loaded = Config::open(&path)?;
        assert_eq!(loaded.training.lr_schedule, config.training.lr_schedule);
        assert_eq!(loaded.training.device, Device::Cpu);
        Ok(())
    }

    #[test]
    fn invalid_step_schedule_is_rejected() {
        let schedule = LearningRateSchedule::StepWise {
            steps: vec![(0, r64(1e-3)), (5, r64(1e-4)), (3, r64(1e-5))],
        };
        assert!(schedule.validate().is_err());
    }
}
