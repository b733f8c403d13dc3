//! The training worker.

use crate::{
    common::*,
    config::Config,
    data::{FeedMessage, Phase},
    logging::{EpochLog, LoggingMessage},
    utils::{LrScheduler, Throughput, ThroughputMeter},
};

/// The outcome of a finished training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// The 1-based epoch of the best evaluation total, if any epoch was finite.
    pub best_epoch: Option<usize>,
    pub best_metrics: Option<EpochMetrics>,
    pub checkpoint: Option<PathBuf>,
    /// Evaluation metrics of every epoch in order.
    pub eval_history: Vec<EpochMetrics>,
}

/// Train and evaluate on the batches received from `data_rx`.
///
/// It blocks the calling thread and is meant to run in `spawn_blocking`.
pub fn training_worker(
    config: Arc<Config>,
    mut data_rx: mpsc::Receiver<FeedMessage>,
    logging_tx: broadcast::Sender<LoggingMessage>,
) -> Result<TrainingReport> {
    let Config {
        ref training,
        ref output,
        ref evaluation,
        ..
    } = *config;
    let device = training.device;
    let num_epochs = training.epochs.get();
    info!("use device {:?}", device);

    // init model
    info!("initializing model");
    tch::manual_seed(training.seed as i64);
    let model = config.model.to_init().build(device);

    let mut lr_scheduler = LrScheduler::new(&training.lr_schedule, None)?;
    let build_optimizer = |vs: &nn::VarStore| -> Result<nn::Optimizer<nn::Adam>> {
        let opt = nn::Adam {
            beta1: training.beta1.raw(),
            beta2: training.beta2.raw(),
            wd: training.weight_decay.raw(),
        }
        .build(vs, lr_scheduler.lr())?;
        Ok(opt)
    };
    let mut predictor_opt = build_optimizer(&model.predictor_vs)?;
    let mut renderer_opt = build_optimizer(&model.renderer_vs)?;

    let mut loss_fn = CycleLossInit {
        weights: training.loss_weights.at(1, num_epochs),
    }
    .build()?;
    let ssim = SsimInit::default().build()?;
    let perceptual = load_perceptual_metric(evaluation.perceptual_model.as_deref(), device);

    let best_path = output.best_checkpoint_path();
    let mut best_tracker = BestTracker::new();
    let mut report = TrainingReport {
        best_epoch: None,
        best_metrics: None,
        checkpoint: None,
        eval_history: vec![],
    };

    info!("start training");
    let mut train_acc = EpochMetricsAccumulator::new();
    let mut eval_acc = EpochMetricsAccumulator::new();
    let mut train_metrics = None;
    let mut meter = ThroughputMeter::with_second_interval();

    while let Some(msg) = data_rx.blocking_recv() {
        match msg {
            FeedMessage::Batch {
                epoch,
                phase: Phase::Train,
                batch,
            } => {
                if train_acc.num_batches() == 0 {
                    meter.start_epoch();
                }
                let batch = batch.to_device(device);
                let preds = CyclePredictions::new(&model, &batch, true);
                let losses = loss_fn.forward(&preds, &batch);

                predictor_opt.zero_grad();
                renderer_opt.zero_grad();
                losses.total.backward();
                predictor_opt.step();
                renderer_opt.step();

                train_acc.push_losses(&losses.values());

                meter.record(batch.batch_size() as usize);
                if let Some(Throughput {
                    batches_per_sec,
                    samples_per_sec,
                }) = meter.poll()
                {
                    info!(
                        "epoch: {}\tbatch: {}\t{:.2} batches/s\t{:.2} samples/s",
                        epoch,
                        train_acc.num_batches(),
                        batches_per_sec,
                        samples_per_sec
                    );
                }
            }
            FeedMessage::Batch {
                epoch,
                phase: Phase::Eval,
                batch,
            } => {
                let batch = batch.to_device(device);
                let (values, quality, preds) = tch::no_grad(|| -> Result<_> {
                    let preds = CyclePredictions::new(&model, &batch, false);
                    let values = loss_fn.forward(&preds, &batch).values();
                    let quality = QualityMetrics::compute(&preds, &batch, &ssim, &*perceptual)?;
                    Ok((values, quality, preds))
                })?;
                eval_acc.push_losses(&values);
                eval_acc.push_quality(&quality);

                // send the first evaluation batch of each epoch to the logger
                if eval_acc.num_batches() == 1 {
                    send_log(
                        &logging_tx,
                        LoggingMessage::new_images(
                            "eval",
                            epoch,
                            [
                                ("view_a", batch.view_a.shallow_clone()),
                                ("view_recon_a", preds.view_recon_a.shallow_clone()),
                                ("uv_pred_a", preds.uv_pred_a.shallow_clone()),
                                ("uv_gt", batch.uv_gt.shallow_clone()),
                            ],
                        ),
                    );
                }
            }
            FeedMessage::EndOfPhase {
                phase: Phase::Train,
                ..
            } => {
                train_metrics = Some((train_acc.finish()?, meter.finish_epoch()));
                train_acc = EpochMetricsAccumulator::new();
            }
            FeedMessage::EndOfPhase {
                epoch,
                phase: Phase::Eval,
            } => {
                let (train, throughput) = train_metrics
                    .take()
                    .ok_or_else(|| format_err!("evaluation finished before training in epoch {}", epoch))?;
                let eval = eval_acc.finish()?;
                eval_acc = EpochMetricsAccumulator::new();
                let lr = lr_scheduler.lr();

                log_epoch_summary(epoch, num_epochs, &train, &eval);
                report.eval_history.push(eval.clone());

                if best_tracker.update(eval.total) {
                    checkpoint::save_checkpoint(&best_path, &model, &eval)?;
                    info!(
                        "saved best checkpoint '{}' with total {:.4}",
                        best_path.display(),
                        eval.total
                    );
                    report.best_epoch = Some(epoch);
                    report.best_metrics = Some(eval.clone());
                    report.checkpoint = Some(best_path.clone());
                }

                if let Some(every) = output.checkpoint_every {
                    if epoch % every.get() == 0 {
                        let path = output.periodic_checkpoint_path(epoch);
                        checkpoint::save_checkpoint(&path, &model, &eval)?;
                        info!("saved checkpoint '{}'", path.display());
                    }
                }

                send_log(
                    &logging_tx,
                    LoggingMessage::new_epoch(
                        "epoch",
                        EpochLog {
                            epoch,
                            lr,
                            weights: *loss_fn.weights(),
                            train,
                            eval,
                            throughput,
                        },
                    ),
                );

                // prepare the next epoch
                let next_lr = lr_scheduler.next();
                predictor_opt.set_lr(next_lr);
                renderer_opt.set_lr(next_lr);
                loss_fn.set_weights(training.loss_weights.at(epoch + 1, num_epochs))?;
            }
        }
    }

    match &report.best_metrics {
        Some(metrics) => info!(
            "best epoch {} with metrics {:?}",
            report.best_epoch.unwrap_or(0),
            metrics.to_map()
        ),
        None => warn!("no finite evaluation total, no checkpoint was written"),
    }

    Ok(report)
}

fn log_epoch_summary(epoch: usize, num_epochs: usize, train: &EpochMetrics, eval: &EpochMetrics) {
    let (ssim_view, ssim_uv, lpips_view) = eval
        .quality
        .map(|quality| (quality.ssim_view, quality.ssim_uv, quality.lpips_view))
        .unwrap_or((f64::NAN, f64::NAN, f64::NAN));
    info!(
        "epoch {:03}/{}\ttrain total: {:.4}\tval total: {:.4}\tval ssim(view): {:.3}\tval ssim(uv): {:.3}\tval lpips(view): {:.3}",
        epoch, num_epochs, train.total, eval.total, ssim_view, ssim_uv, lpips_view
    );
}

/// Logging is best effort, the run continues without a subscriber.
fn send_log(tx: &broadcast::Sender<LoggingMessage>, msg: LoggingMessage) {
    if tx.send(msg).is_err() {
        tracing::debug!("no logging worker is listening");
    }
}
