use anyhow::Result;
use std::sync::Arc;
use structopt::StructOpt;
use tracing::{info, trace_span, Instrument};
use train::args::Args;

#[tokio::main]
pub async fn main() -> Result<()> {
    train::utils::init_tracing();

    // parse arguments
    let config = Arc::new(Args::from_args().into_config()?);

    // start training program
    let report = train::start(config)
        .instrument(trace_span!("train"))
        .await?;

    if let Some(path) = &report.checkpoint {
        info!("saved best checkpoint to '{}'", path.display());
    }

    Ok(())
}
