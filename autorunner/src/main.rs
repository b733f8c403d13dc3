use anyhow::Result;
use autorunner::{
    budget_from_hours, CheckpointMetricsReader, ProcessJobRunner, SchedulerInit, SystemClock,
    TemplateGraph, TrainingDefaults,
};
use chrono::Local;
use std::path::PathBuf;
use structopt::StructOpt;
use tracing::{info, trace_span};

#[derive(Debug, Clone, StructOpt)]
/// Run training experiments back to back within a time budget
struct Args {
    #[structopt(long, default_value = "5.0")]
    /// the total time budget in hours
    max_hours: f64,
    #[structopt(long)]
    /// name of the run directory, defaults to a timestamp
    run_tag: Option<String>,
    #[structopt(long, default_value = "180.0")]
    /// the runtime estimate before any run is measured
    initial_seconds_per_epoch: f64,
    #[structopt(long, default_value = "direct_decay_probe")]
    /// the first template to run
    start: String,
    #[structopt(long)]
    /// template file in JSON5 format, defaults to the built-in templates
    templates: Option<PathBuf>,
    #[structopt(long, default_value = "results/augmented_dataset")]
    dataset: PathBuf,
    #[structopt(long, default_value = "results")]
    results_dir: PathBuf,
    #[structopt(long, default_value = "6")]
    batch_size: usize,
    #[structopt(long, default_value = "0.0002")]
    lr: f64,
    #[structopt(long)]
    /// TorchScript LPIPS network forwarded to every training run
    lpips_model: Option<PathBuf>,
    #[structopt(long, default_value = "12")]
    /// samples rendered by the visualizer
    num_samples: usize,
    #[structopt(long, default_value = "1337")]
    /// seeds the per-run training seeds
    seed: u64,
    #[structopt(long)]
    /// the training program, defaults to the one next to this executable
    train_program: Option<PathBuf>,
    #[structopt(long)]
    /// the visualization program, defaults to the one next to this executable
    visualize_program: Option<PathBuf>,
}

fn main() -> Result<()> {
    autorunner::init_tracing();
    let _span = trace_span!("autorunner").entered();

    let Args {
        max_hours,
        run_tag,
        initial_seconds_per_epoch,
        start,
        templates,
        dataset,
        results_dir,
        batch_size,
        lr,
        lpips_model,
        num_samples,
        seed,
        train_program,
        visualize_program,
    } = Args::from_args();

    let max_duration = budget_from_hours(max_hours)?;

    let graph = match &templates {
        Some(path) => TemplateGraph::open(path)?,
        None => TemplateGraph::builtin()?,
    };
    let runner = {
        let siblings = ProcessJobRunner::sibling_programs()?;
        ProcessJobRunner {
            train_program: train_program.unwrap_or(siblings.train_program),
            visualize_program: visualize_program.or(siblings.visualize_program),
        }
    };
    let run_tag =
        run_tag.unwrap_or_else(|| format!("autorun_{}", Local::now().format("%Y%m%d_%H%M")));

    let scheduler = SchedulerInit {
        max_duration,
        initial_seconds_per_epoch,
        start,
        run_tag,
        results_dir,
        training: TrainingDefaults {
            dataset,
            batch_size,
            lr,
            lpips_model,
        },
        num_visual_samples: num_samples,
        seed,
    }
    .build(graph, runner, CheckpointMetricsReader, SystemClock::new())?;
    info!("collecting runs in '{}'", scheduler.run_dir().display());

    let summary = scheduler.run()?;
    info!(
        "{} runs, {:.2}h elapsed",
        summary.runs.len(),
        summary.elapsed_seconds / 3600.0
    );

    Ok(())
}
