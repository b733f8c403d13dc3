//! Budgeted scheduling of training experiments.
//!
//! Templates form a graph. Starting from one template, each completed run
//! routes to a successor according to the metrics stored in its checkpoint,
//! as long as the predicted runtime fits into the remaining time budget.

pub mod clock;
pub mod common;
pub mod job;
pub mod metrics;
pub mod scheduler;
pub mod summary;
pub mod template;

pub use clock::{Clock, ManualClock, SystemClock};
pub use job::{JobOutcome, JobRunner, JobSpec, ProcessJobRunner, VisualizeOutcome, VisualizeSpec};
pub use metrics::{CheckpointMetricsReader, MetricsReader};
pub use scheduler::{budget_from_hours, RuntimeEstimate, Scheduler, SchedulerInit, TrainingDefaults};
pub use summary::{RunRecord, Summary};
pub use template::{Comparison, ExperimentTemplate, TemplateGraph, Threshold};

use std::env;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

/// Install the compact formatter, at INFO level unless `RUST_LOG` is set.
pub fn init_tracing() {
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true).compact();
    let filter_layer = {
        let filter = EnvFilter::from_default_env();
        if env::var("RUST_LOG").is_err() {
            filter.add_directive(LevelFilter::INFO.into())
        } else {
            filter
        }
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
