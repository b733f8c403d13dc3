//! The training program of the texture cycle-consistency model.

pub mod args;
pub mod common;
pub mod config;
pub mod data;
pub mod logging;
pub mod training;
pub mod utils;

use crate::{common::*, data::DataFeeder, training::TrainingReport};

/// The entry of training program.
pub async fn start(config: Arc<config::Config>) -> Result<TrainingReport> {
    config.validate()?;

    let start_time = Local::now();
    let logging_dir: Arc<Path> = {
        let dir = config
            .logging
            .dir
            .join(format!("{}", start_time.format(utils::FILE_STRFTIME)));
        dir.into_boxed_path().into()
    };

    // create dirs and save config
    {
        tokio::fs::create_dir_all(&*logging_dir).await?;
        tokio::fs::create_dir_all(&config.output.dir).await?;
        let path = logging_dir.join("config.json5");
        let text = serde_json::to_string_pretty(&*config)?;
        tokio::fs::write(&path, text).await?;
    }

    // load dataset
    info!("loading dataset");
    let dataset = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || {
            PairedViewDataset::open(&config.dataset.path, config.dataset.image_size.get())
        })
        .await??
    };
    let dataset = Arc::new(dataset);

    let mut rng = StdRng::seed_from_u64(config.training.seed);
    let split = DatasetSplit::new(dataset.len(), config.dataset.val_fraction.raw(), &mut rng)?;
    info!(
        "{} samples, {} for training and {} for evaluation",
        dataset.len(),
        split.train.len(),
        split.val.len()
    );

    // create channels
    let (logging_tx, logging_rx) = broadcast::channel(4);
    let (data_tx, data_rx) = mpsc::channel(2);

    // start logger
    let logging_future = logging::logging_worker(config.clone(), logging_dir.clone(), logging_rx);

    // feeding worker
    let feeder = DataFeeder::new(
        dataset,
        split,
        config.training.epochs.get(),
        config.training.batch_size.get(),
        config.dataset.num_workers.get(),
        rng,
    )?;
    info!("{} training batches per epoch", feeder.num_train_batches());
    let feeding_future = tokio::task::spawn(feeder.run(data_tx).instrument(info_span!("feeder")))
        .map(|result| Fallible::Ok(result??));

    // training worker
    let training_future = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || {
            training::training_worker(config, data_rx, logging_tx)
        })
        .map(|result| Fallible::Ok(result??))
    };

    let (_, report, _) = futures::try_join!(feeding_future, training_future, logging_future)?;
    Ok(report)
}
