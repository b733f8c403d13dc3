//! Launching training and visualization jobs.

use crate::common::*;

/// A training run to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct JobSpec {
    pub template: String,
    pub args: Vec<String>,
    /// Where the training program writes the best checkpoint.
    pub checkpoint_path: PathBuf,
    pub seed: u64,
}

/// A visualization request for a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct VisualizeSpec {
    pub checkpoint: PathBuf,
    pub dataset: PathBuf,
    pub output_dir: PathBuf,
    pub num_samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOutcome {
    /// The exit code, or `None` if the process was terminated by a signal.
    pub exit_code: Option<i32>,
}

impl JobOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisualizeOutcome {
    Done,
    /// The visualizer is not installed.
    Unavailable,
    Failed(Option<i32>),
}

/// Executes jobs one at a time, blocking until each exits.
pub trait JobRunner {
    fn run(&mut self, spec: &JobSpec) -> Result<JobOutcome>;

    fn visualize(&mut self, spec: &VisualizeSpec) -> Result<VisualizeOutcome>;
}

/// Runs jobs as child processes of external programs.
#[derive(Debug, Clone)]
pub struct ProcessJobRunner {
    pub train_program: PathBuf,
    pub visualize_program: Option<PathBuf>,
}

impl ProcessJobRunner {
    /// Look up the programs next to the current executable.
    pub fn sibling_programs() -> Result<Self> {
        let exe = std::env::current_exe()?;
        let visualize_program = exe.with_file_name(executable_name("visualize"));
        Ok(Self {
            train_program: exe.with_file_name(executable_name("train")),
            visualize_program: Some(visualize_program),
        })
    }
}

impl JobRunner for ProcessJobRunner {
    fn run(&mut self, spec: &JobSpec) -> Result<JobOutcome> {
        info!(
            "executing: {} {}",
            self.train_program.display(),
            spec.args.join(" ")
        );
        let status = Command::new(&self.train_program)
            .args(&spec.args)
            .status()
            .with_context(|| {
                format!(
                    "unable to launch training program '{}'",
                    self.train_program.display()
                )
            })?;

        Ok(JobOutcome {
            exit_code: status.code(),
        })
    }

    fn visualize(&mut self, spec: &VisualizeSpec) -> Result<VisualizeOutcome> {
        let program = match &self.visualize_program {
            Some(program) if program.is_file() => program,
            _ => return Ok(VisualizeOutcome::Unavailable),
        };
        fs::create_dir_all(&spec.output_dir)?;

        info!(
            "rendering samples of '{}' into '{}'",
            spec.checkpoint.display(),
            spec.output_dir.display()
        );
        let status = Command::new(program)
            .arg("--checkpoint")
            .arg(&spec.checkpoint)
            .arg("--dataset")
            .arg(&spec.dataset)
            .arg("--output")
            .arg(&spec.output_dir)
            .arg("--num-samples")
            .arg(spec.num_samples.to_string())
            .status()
            .with_context(|| format!("unable to launch visualizer '{}'", program.display()))?;

        Ok(if status.success() {
            VisualizeOutcome::Done
        } else {
            VisualizeOutcome::Failed(status.code())
        })
    }
}

fn executable_name(name: &str) -> String {
    format!("{}{}", name, std::env::consts::EXE_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_visualizer_is_unavailable() -> Result<()> {
        let mut runner = ProcessJobRunner {
            train_program: PathBuf::from("/nonexistent/train"),
            visualize_program: Some(PathBuf::from("/nonexistent/visualize")),
        };
        let outcome = runner.visualize(&VisualizeSpec {
            checkpoint: "run.ckpt".into(),
            dataset: "dataset".into(),
            output_dir: "visuals".into(),
            num_samples: 12,
        })?;
        assert_eq!(outcome, VisualizeOutcome::Unavailable);
        Ok(())
    }

    #[test]
    fn missing_training_program_is_an_error() {
        let mut runner = ProcessJobRunner {
            train_program: PathBuf::from("/nonexistent/train"),
            visualize_program: None,
        };
        let result = runner.run(&JobSpec {
            template: "scout".into(),
            args: vec![],
            checkpoint_path: "run.ckpt".into(),
            seed: 0,
        });
        assert!(result.is_err());
    }
}
