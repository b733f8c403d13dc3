//! Misc utilities.

mod lr_scheduler;
mod throughput;

pub use lr_scheduler::*;
pub use throughput::*;

use std::env;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

/// The time format of per-run logging directories.
pub const FILE_STRFTIME: &str = "%Y-%m-%d-%H-%M-%S.%3f%z";

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
