use crate::common::*;

/// The result of one scheduled template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunRecord {
    Completed {
        experiment: String,
        duration_seconds: f64,
        seed: u64,
        /// Missing if the checkpoint could not be read.
        metrics: Metrics,
        checkpoint: PathBuf,
        next: Option<String>,
    },
    Failed {
        experiment: String,
        duration_seconds: f64,
        seed: u64,
        returncode: Option<i32>,
    },
    Skipped {
        experiment: String,
        predicted_seconds: f64,
        remaining_seconds: f64,
        reason: String,
    },
}

impl RunRecord {
    pub fn experiment(&self) -> &str {
        match self {
            Self::Completed { experiment, .. } => experiment,
            Self::Failed { experiment, .. } => experiment,
            Self::Skipped { experiment, .. } => experiment,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }
}

/// Everything a scheduling session did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub run_tag: String,
    pub elapsed_seconds: f64,
    /// The smoothed runtime estimate after the last run.
    pub seconds_per_epoch: f64,
    pub runs: Vec<RunRecord>,
}

impl Summary {
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)
            .with_context(|| format!("unable to write summary '{}'", path.display()))?;
        Ok(())
    }
}
