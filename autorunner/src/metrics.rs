use crate::common::*;

/// Reads the evaluation metrics stored in a checkpoint.
pub trait MetricsReader {
    fn read(&self, checkpoint: &Path) -> Result<Metrics>;
}

/// Reads the metrics section of checkpoints written by the training program.
#[derive(Debug, Clone, Copy, Default)]
pub struct CheckpointMetricsReader;

impl MetricsReader for CheckpointMetricsReader {
    fn read(&self, checkpoint: &Path) -> Result<Metrics> {
        uv_cycle::checkpoint::load_metrics(checkpoint)
    }
}
