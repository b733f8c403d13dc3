//! Summarize how many augmented views each source texture has.

use anyhow::{Context, Result};
use std::path::PathBuf;
use structopt::StructOpt;
use tracing::info;
use uv_cycle::dataset::{CoverageReport, Manifest, PairedViewIndex};

#[derive(Debug, Clone, StructOpt)]
/// Report the per-texture coverage of an augmented dataset
struct Args {
    /// manifest file or dataset directory
    pub dataset: PathBuf,
    #[structopt(long, default_value = "10")]
    /// number of least covered textures to list
    pub top_missing: usize,
    #[structopt(long)]
    /// also write the report as JSON to this file
    pub output: Option<PathBuf>,
}

fn main() -> Result<()> {
    train::utils::init_tracing();

    let Args {
        dataset,
        top_missing,
        output,
    } = Args::from_args();

    let manifest = Manifest::open(&dataset)?;
    let index = PairedViewIndex::new(manifest.records)?;
    let report = CoverageReport::new(&dataset, &index, top_missing);

    let text = serde_json::to_string_pretty(&report)?;
    println!("{}", text);

    if let Some(path) = output {
        std::fs::write(&path, &text)
            .with_context(|| format!("unable to write '{}'", path.display()))?;
        info!("wrote report to '{}'", path.display());
    }

    Ok(())
}
