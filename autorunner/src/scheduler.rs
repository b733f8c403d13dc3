//! The budgeted walk over the template graph.

use crate::{
    clock::Clock,
    common::*,
    job::{JobOutcome, JobRunner, JobSpec, VisualizeOutcome, VisualizeSpec},
    metrics::MetricsReader,
    summary::{RunRecord, Summary},
    template::{ExperimentTemplate, TemplateGraph},
};

/// Exponentially smoothed seconds per epoch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuntimeEstimate {
    seconds_per_epoch: f64,
}

impl RuntimeEstimate {
    pub fn new(seconds_per_epoch: f64) -> Self {
        Self { seconds_per_epoch }
    }

    pub fn seconds_per_epoch(&self) -> f64 {
        self.seconds_per_epoch
    }

    pub fn predict(&self, epochs: usize) -> f64 {
        self.seconds_per_epoch * epochs as f64
    }

    /// Blend in a measured run with equal weight.
    pub fn update(&mut self, measured: Duration, epochs: usize) {
        let measured_per_epoch = measured.as_secs_f64() / epochs as f64;
        self.seconds_per_epoch = 0.5 * self.seconds_per_epoch + 0.5 * measured_per_epoch;
    }
}

/// Convert a time budget in hours into a duration.
pub fn budget_from_hours(hours: f64) -> Result<Duration> {
    ensure!(
        hours.is_finite() && hours >= 0.0,
        "the time budget must be a non-negative number of hours, but get {}",
        hours
    );
    Duration::try_from_secs_f64(hours * 3600.0)
        .map_err(|_| format_err!("the time budget of {} hours is too large", hours))
}

/// Fixed arguments of every training command.
#[derive(Debug, Clone)]
pub struct TrainingDefaults {
    pub dataset: PathBuf,
    pub batch_size: usize,
    pub lr: f64,
    /// TorchScript LPIPS network. Runs without it report a NaN `lpips_view`.
    pub lpips_model: Option<PathBuf>,
}

impl Default for TrainingDefaults {
    fn default() -> Self {
        Self {
            dataset: PathBuf::from("results/augmented_dataset"),
            batch_size: 6,
            lr: 2e-4,
            lpips_model: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerInit {
    pub max_duration: Duration,
    pub initial_seconds_per_epoch: f64,
    pub start: String,
    pub run_tag: String,
    /// Where the training program writes checkpoints. Runs are collected
    /// under `<results_dir>/<run_tag>`.
    pub results_dir: PathBuf,
    pub training: TrainingDefaults,
    pub num_visual_samples: usize,
    pub seed: u64,
}

impl SchedulerInit {
    pub fn build<R, M, C>(
        self,
        graph: TemplateGraph,
        runner: R,
        reader: M,
        clock: C,
    ) -> Result<Scheduler<R, M, C>>
    where
        R: JobRunner,
        M: MetricsReader,
        C: Clock,
    {
        let Self {
            max_duration,
            initial_seconds_per_epoch,
            start,
            run_tag,
            results_dir,
            training,
            num_visual_samples,
            seed,
        } = self;

        ensure!(
            graph.contains(&start),
            "unknown start template '{}'",
            start
        );
        ensure!(
            initial_seconds_per_epoch.is_finite() && initial_seconds_per_epoch > 0.0,
            "initial_seconds_per_epoch must be positive"
        );
        ensure!(!run_tag.is_empty(), "run_tag must not be empty");

        if training.lpips_model.is_none() {
            let needs_lpips = graph.templates().any(|template| {
                template
                    .success_thresholds
                    .iter()
                    .any(|threshold| threshold.metric == "lpips_view")
            });
            if needs_lpips {
                warn!("no LPIPS model is given, thresholds on 'lpips_view' always fail");
            }
        }

        let run_dir = results_dir.join(&run_tag);
        let started = clock.now();

        Ok(Scheduler {
            graph,
            runner,
            reader,
            clock,
            max_duration,
            started,
            run_tag,
            results_dir,
            run_dir,
            training,
            num_visual_samples,
            queue: VecDeque::from(vec![start]),
            estimate: RuntimeEstimate::new(initial_seconds_per_epoch),
            records: vec![],
            rng: StdRng::seed_from_u64(seed),
        })
    }
}

/// Runs templates one at a time under a wall-clock budget.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Scheduler<R, M, C> {
    graph: TemplateGraph,
    #[derivative(Debug = "ignore")]
    runner: R,
    #[derivative(Debug = "ignore")]
    reader: M,
    #[derivative(Debug = "ignore")]
    clock: C,
    max_duration: Duration,
    started: Duration,
    run_tag: String,
    results_dir: PathBuf,
    run_dir: PathBuf,
    training: TrainingDefaults,
    num_visual_samples: usize,
    queue: VecDeque<String>,
    estimate: RuntimeEstimate,
    records: Vec<RunRecord>,
    rng: StdRng,
}

impl<R, M, C> Scheduler<R, M, C>
where
    R: JobRunner,
    M: MetricsReader,
    C: Clock,
{
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn estimate(&self) -> RuntimeEstimate {
        self.estimate
    }

    /// Drain the queue and persist the summary into the run directory.
    pub fn run(mut self) -> Result<Summary> {
        while let Some(name) = self.queue.pop_front() {
            let template = match self.graph.get(&name) {
                Some(template) => template.clone(),
                None => {
                    warn!("unknown template '{}', dropped", name);
                    continue;
                }
            };
            self.step(&template)?;
        }

        let summary = Summary {
            run_tag: self.run_tag.clone(),
            elapsed_seconds: self.elapsed().as_secs_f64(),
            seconds_per_epoch: self.estimate.seconds_per_epoch(),
            runs: self.records,
        };
        let path = self.run_dir.join("summary.json");
        summary.save(&path)?;
        info!("finished, summary written to '{}'", path.display());

        Ok(summary)
    }

    fn step(&mut self, template: &ExperimentTemplate) -> Result<()> {
        let epochs = template.epochs.get();

        // admission control
        let predicted = self.estimate.predict(epochs);
        let remaining = self
            .max_duration
            .saturating_sub(self.elapsed())
            .as_secs_f64();
        if predicted > remaining {
            info!(
                "skipping '{}': predicted {:.2}h exceeds remaining budget {:.2}h",
                template.name,
                predicted / 3600.0,
                remaining / 3600.0
            );
            self.records.push(RunRecord::Skipped {
                experiment: template.name.clone(),
                predicted_seconds: predicted,
                remaining_seconds: remaining,
                reason: "predicted runtime exceeds the remaining budget".into(),
            });
            return Ok(());
        }

        // run the job
        let spec = self.job_spec(template);
        let before = self.clock.now();
        let outcome = self.runner.run(&spec).unwrap_or_else(|err| {
            warn!("unable to run '{}': {:#}", template.name, err);
            JobOutcome { exit_code: None }
        });
        let duration = self.clock.now().saturating_sub(before);
        self.estimate.update(duration, epochs);
        info!(
            "'{}' took {:.1} min, estimate is now {:.1}s per epoch",
            template.name,
            duration.as_secs_f64() / 60.0,
            self.estimate.seconds_per_epoch()
        );

        if !outcome.success() {
            warn!(
                "run '{}' failed with code {:?}",
                template.name, outcome.exit_code
            );
            self.records.push(RunRecord::Failed {
                experiment: template.name.clone(),
                duration_seconds: duration.as_secs_f64(),
                seed: spec.seed,
                returncode: outcome.exit_code,
            });
            return Ok(());
        }

        // collect results
        let checkpoint = self.relocate_checkpoints(template, &spec.checkpoint_path);
        let metrics = match self.reader.read(&checkpoint) {
            Ok(metrics) => metrics,
            Err(err) => {
                warn!(
                    "unable to read metrics of '{}': {:#}",
                    checkpoint.display(),
                    err
                );
                Metrics::new()
            }
        };
        info!("completed '{}' with metrics {:?}", template.name, metrics);

        let next = template.decide_next(&metrics).map(str::to_owned);
        match &next {
            Some(next) if self.graph.contains(next) => {
                info!("'{}' is followed by '{}'", template.name, next);
                self.queue.push_back(next.clone());
            }
            Some(next) => {
                warn!("unknown follow-up template '{}'", next);
            }
            None => (),
        }

        self.records.push(RunRecord::Completed {
            experiment: template.name.clone(),
            duration_seconds: duration.as_secs_f64(),
            seed: spec.seed,
            metrics,
            checkpoint: checkpoint.clone(),
            next,
        });

        if template.run_visuals {
            self.visualize(template, &checkpoint);
        }

        Ok(())
    }

    fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.started)
    }

    fn job_spec(&mut self, template: &ExperimentTemplate) -> JobSpec {
        let epochs = template.epochs.get().to_string();
        let checkpoint_name = template.checkpoint_name(&self.run_tag);
        let seed: u32 = self.rng.gen();
        let seed = seed as u64;

        let mut args: Vec<String> = vec![
            "--dataset".into(),
            self.training.dataset.display().to_string(),
            "--epochs".into(),
            epochs.clone(),
            "--batch-size".into(),
            self.training.batch_size.to_string(),
            "--lr".into(),
            self.training.lr.to_string(),
            "--lr-scheduler".into(),
            "cosine".into(),
            "--lr-scheduler-tmax".into(),
            epochs,
            "--checkpoint-name".into(),
            checkpoint_name.clone(),
            "--output-dir".into(),
            self.results_dir.display().to_string(),
            "--seed".into(),
            seed.to_string(),
        ];
        if let Some(path) = &self.training.lpips_model {
            args.push("--lpips-model".into());
            args.push(path.display().to_string());
        }
        if template.checkpoint_every > 0 {
            args.push("--checkpoint-every".into());
            args.push(template.checkpoint_every.to_string());
        }
        args.extend(template.train_args.iter().cloned());

        JobSpec {
            template: template.name.clone(),
            args,
            checkpoint_path: self.results_dir.join(checkpoint_name),
            seed,
        }
    }

    /// Move the best and periodic checkpoints of a run into the run directory.
    ///
    /// Returns where the best checkpoint ends up. A file that cannot be moved
    /// stays in place.
    fn relocate_checkpoints(&self, template: &ExperimentTemplate, best: &Path) -> PathBuf {
        if let Err(err) = fs::create_dir_all(&self.run_dir) {
            warn!(
                "unable to create run directory '{}': {:#}",
                self.run_dir.display(),
                err
            );
            return best.to_owned();
        }

        let checkpoint = match best.file_name() {
            Some(name) if best.is_file() => {
                let target = self.run_dir.join(name);
                match move_file(best, &target) {
                    Ok(()) => target,
                    Err(err) => {
                        warn!("{:#}, keeping it in place", err);
                        best.to_owned()
                    }
                }
            }
            _ => {
                warn!("checkpoint '{}' was not produced", best.display());
                best.to_owned()
            }
        };

        let periodic_prefix = format!("{}_{}_epoch", self.run_tag, template.checkpoint_stem);
        let entries = match fs::read_dir(&self.results_dir) {
            Ok(entries) => entries,
            Err(_) => return checkpoint,
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = match path.file_name().and_then(|name| name.to_str()) {
                Some(name) if name.starts_with(&periodic_prefix) && path.is_file() => name,
                _ => continue,
            };
            if let Err(err) = move_file(&path, &self.run_dir.join(name)) {
                warn!("{:#}, keeping it in place", err);
            }
        }

        checkpoint
    }

    fn visualize(&mut self, template: &ExperimentTemplate, checkpoint: &Path) {
        let spec = VisualizeSpec {
            checkpoint: checkpoint.to_owned(),
            dataset: self.training.dataset.clone(),
            output_dir: self.run_dir.join(format!("visuals_{}", template.name)),
            num_samples: self.num_visual_samples,
        };

        match self.runner.visualize(&spec) {
            Ok(VisualizeOutcome::Done) => (),
            Ok(VisualizeOutcome::Unavailable) => {
                info!("visualizer is missing, skipping visuals of '{}'", template.name);
            }
            Ok(VisualizeOutcome::Failed(code)) => {
                warn!("visualizer failed on '{}' with code {:?}", template.name, code);
            }
            Err(err) => {
                warn!("unable to visualize '{}': {:#}", template.name, err);
            }
        }
    }
}

/// Rename, or copy and delete across filesystems.
fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_err() {
        fs::copy(from, to).with_context(|| {
            format!("unable to move '{}' to '{}'", from.display(), to.display())
        })?;
        fs::remove_file(from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn budget_rejects_invalid_hours() -> Result<()> {
        assert_eq!(budget_from_hours(1.5)?, Duration::from_secs(5400));
        assert_eq!(budget_from_hours(0.0)?, Duration::ZERO);
        assert!(budget_from_hours(-1.0).is_err());
        assert!(budget_from_hours(f64::NAN).is_err());
        assert!(budget_from_hours(f64::INFINITY).is_err());
        assert!(budget_from_hours(1e300).is_err());
        Ok(())
    }

    #[test]
    fn estimate_is_smoothed_with_equal_weight() {
        let mut estimate = RuntimeEstimate::new(180.0);
        assert_abs_diff_eq!(estimate.predict(40), 7200.0, epsilon = 1e-9);

        estimate.update(Duration::from_secs(6000), 40);
        assert_abs_diff_eq!(estimate.seconds_per_epoch(), 165.0, epsilon = 1e-9);
    }
}
