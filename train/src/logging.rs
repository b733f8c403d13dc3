//! Data logging toolkit.

use crate::{common::*, config::Config, utils::Throughput};
use async_std::{fs::File, io::BufWriter};

pub use logging_message::*;
pub use logging_worker::*;

mod logging_worker {
    use super::*;

    /// The data logging worker.
    #[derive(Debug)]
    pub struct LoggingWorker {
        config: Arc<Config>,
        event_writer: EventWriter<BufWriter<File>>,
        rx: broadcast::Receiver<LoggingMessage>,
    }

    impl LoggingWorker {
        /// Create a data logging worker.
        async fn new(
            config: Arc<Config>,
            logging_dir: Arc<Path>,
            rx: broadcast::Receiver<LoggingMessage>,
        ) -> Result<Self> {
            // prepare dirs
            let event_dir = logging_dir.join("events");
            let event_path_prefix = event_dir
                .join("uv-cycle")
                .into_os_string()
                .into_string()
                .map_err(|path| format_err!("non-UTF-8 logging path {:?}", path))?;

            tokio::fs::create_dir_all(&event_dir).await?;

            let event_writer = EventWriterInit::default()
                .from_prefix_async(event_path_prefix, None)
                .await?;

            Ok(Self {
                config,
                event_writer,
                rx,
            })
        }

        /// Start the data logging worker.
        async fn start(mut self) -> Result<()> {
            loop {
                let LoggingMessage { tag, kind } = match self.rx.recv().await {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("logging worker lagged behind by {} messages", skipped);
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                match kind {
                    LoggingMessageKind::Epoch(msg) => {
                        self.log_epoch(&tag, msg).await?;
                    }
                    LoggingMessageKind::Images(msg) => {
                        if self.config.logging.enable_images {
                            self.log_images(&tag, msg).await?;
                        }
                    }
                }
            }

            Ok(())
        }

        async fn log_epoch(&mut self, tag: &str, msg: EpochLog) -> Result<()> {
            let EpochLog {
                epoch,
                lr,
                weights,
                train,
                eval,
                throughput,
            } = msg;
            let step = epoch as i64;

            // log parameters
            self.event_writer
                .write_scalar_async(format!("{}/params/learning_rate", tag), step, lr as f32)
                .await?;
            let LossWeights {
                cycle,
                uv_recon,
                direct,
                cross,
            } = weights;
            for (name, value) in [
                ("cycle", cycle),
                ("uv_recon", uv_recon),
                ("direct", direct),
                ("cross", cross),
            ] {
                self.event_writer
                    .write_scalar_async(format!("{}/weight/{}", tag, name), step, value as f32)
                    .await?;
            }

            // log metrics
            for (phase, metrics) in [("train", &train), ("eval", &eval)] {
                for (name, value) in metrics.to_map() {
                    if !value.is_finite() {
                        continue;
                    }
                    self.event_writer
                        .write_scalar_async(
                            format!("{}/{}/{}", tag, phase, name),
                            step,
                            value as f32,
                        )
                        .await?;
                }
            }

            // log training speed
            let Throughput {
                batches_per_sec,
                samples_per_sec,
            } = throughput;
            for (name, value) in [
                ("batches_per_sec", batches_per_sec),
                ("samples_per_sec", samples_per_sec),
            ] {
                self.event_writer
                    .write_scalar_async(format!("{}/speed/{}", tag, name), step, value as f32)
                    .await?;
            }

            Ok(())
        }

        async fn log_images(&mut self, tag: &str, msg: ImageLog) -> Result<()> {
            let ImageLog { epoch, images } = msg;
            let step = epoch as i64;

            for (name, image) in images {
                // map from [-1, 1] to [0, 1]
                let image = tch::no_grad(|| ((image.to_device(Device::Cpu) + 1.0) / 2.0).clamp(0.0, 1.0));
                self.event_writer
                    .write_image_list_async(format!("{}/image/{}", tag, name), step, image)
                    .await?;
            }

            Ok(())
        }
    }

    /// Run the logging worker until every sender is dropped.
    pub async fn logging_worker(
        config: Arc<Config>,
        logging_dir: Arc<Path>,
        rx: broadcast::Receiver<LoggingMessage>,
    ) -> Result<()> {
        LoggingWorker::new(config, logging_dir, rx)
            .await?
            .start()
            .await
    }
}

mod logging_message {
    use super::*;

    /// The message type that is accepted by data logger.
    #[derive(Debug, Clone)]
    pub struct LoggingMessage {
        pub tag: Cow<'static, str>,
        pub kind: LoggingMessageKind,
    }

    impl LoggingMessage {
        pub fn new_epoch<S>(tag: S, log: EpochLog) -> Self
        where
            S: Into<Cow<'static, str>>,
        {
            Self {
                tag: tag.into(),
                kind: LoggingMessageKind::Epoch(log),
            }
        }

        /// Create a message of named image batches `[B, 3, H, W]` in `[-1, 1]`.
        pub fn new_images<S, I, N>(tag: S, epoch: usize, images: I) -> Self
        where
            S: Into<Cow<'static, str>>,
            I: IntoIterator<Item = (N, Tensor)>,
            N: Into<Cow<'static, str>>,
        {
            Self {
                tag: tag.into(),
                kind: LoggingMessageKind::Images(ImageLog {
                    epoch,
                    images: images
                        .into_iter()
                        .map(|(name, image)| (name.into(), image.detach()))
                        .collect(),
                }),
            }
        }
    }

    #[derive(Debug, Clone)]
    pub enum LoggingMessageKind {
        Epoch(EpochLog),
        Images(ImageLog),
    }

    /// Scalars of one finished epoch.
    #[derive(Debug, Clone)]
    pub struct EpochLog {
        pub epoch: usize,
        pub lr: f64,
        pub weights: LossWeights,
        pub train: EpochMetrics,
        pub eval: EpochMetrics,
        pub throughput: Throughput,
    }

    #[derive(Debug)]
    pub struct ImageLog {
        pub epoch: usize,
        pub images: Vec<(Cow<'static, str>, Tensor)>,
    }

    impl Clone for ImageLog {
        fn clone(&self) -> Self {
            Self {
                epoch: self.epoch,
                images: self
                    .images
                    .iter()
                    .map(|(name, image)| (name.clone(), image.shallow_clone()))
                    .collect(),
            }
        }
    }
}
