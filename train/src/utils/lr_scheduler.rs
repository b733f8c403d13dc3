use crate::{common::*, config::LearningRateSchedule};

/// Produces the learning rate of each epoch.
#[derive(Debug, Clone)]
pub enum LrScheduler {
    Constant {
        lr: R64,
    },
    StepWise {
        lr_cache: f64,
        epoch: usize,
        index: usize,
        steps: Vec<(usize, R64)>,
    },
    Cosine {
        lr_cache: f64,
        epoch: usize,
        lr: R64,
        t_max: usize,
        eta_min: R64,
    },
}

impl LrScheduler {
    /// Create a scheduler positioned at the 0-based `init_epoch`.
    pub fn new(config: &LearningRateSchedule, init_epoch: impl Into<Option<usize>>) -> Result<Self> {
        config.validate()?;
        let init_epoch = init_epoch.into();

        let mut scheduler = match *config {
            LearningRateSchedule::Constant { lr } => Self::Constant { lr },
            LearningRateSchedule::StepWise { ref steps } => Self::StepWise {
                lr_cache: steps[0].1.raw(),
                epoch: 0,
                index: 0,
                steps: steps.clone(),
            },
            LearningRateSchedule::Cosine { lr, t_max, eta_min } => Self::Cosine {
                lr_cache: lr.raw(),
                epoch: 0,
                lr,
                t_max: t_max.get(),
                eta_min,
            },
        };

        if let Some(init_epoch) = init_epoch {
            scheduler.set_epoch(init_epoch);
        }

        Ok(scheduler)
    }

    pub fn set_epoch(&mut self, new_epoch: usize) {
        match self {
            Self::Constant { .. } => (),
            Self::StepWise {
                epoch,
                index,
                steps,
                lr_cache,
            } => {
                *epoch = new_epoch;
                let new_index = match steps
                    .binary_search_by_key(&new_epoch, |(epoch_thresh, _lr)| *epoch_thresh)
                {
                    Ok(new_index) => new_index,
                    Err(new_index) => new_index.saturating_sub(1),
                };
                *index = new_index;
                *lr_cache = steps[new_index].1.raw();
            }
            Self::Cosine {
                epoch,
                lr_cache,
                lr,
                t_max,
                eta_min,
            } => {
                *epoch = new_epoch;
                *lr_cache = cosine_lr(lr.raw(), eta_min.raw(), *t_max, new_epoch);
            }
        }
    }

    /// The learning rate of the current epoch.
    pub fn lr(&self) -> f64 {
        match self {
            Self::Constant { lr } => lr.raw(),
            Self::StepWise { lr_cache, .. } => *lr_cache,
            Self::Cosine { lr_cache, .. } => *lr_cache,
        }
    }

    /// Advance to the next epoch and return its learning rate.
    pub fn next(&mut self) -> f64 {
        match self {
            Self::Constant { lr } => lr.raw(),
            Self::StepWise {
                epoch,
                index,
                steps,
                lr_cache,
            } => {
                *epoch += 1;
                let next_index = *index + 1;
                if next_index < steps.len() && *epoch == steps[next_index].0 {
                    *index = next_index;
                }
                *lr_cache = steps[*index].1.raw();
                *lr_cache
            }
            Self::Cosine {
                epoch,
                lr_cache,
                lr,
                t_max,
                eta_min,
            } => {
                *epoch += 1;
                *lr_cache = cosine_lr(lr.raw(), eta_min.raw(), *t_max, *epoch);
                *lr_cache
            }
        }
    }
}

/// Cosine annealing, flat at `eta_min` after `t_max` epochs.
fn cosine_lr(base_lr: f64, eta_min: f64, t_max: usize, epoch: usize) -> f64 {
    let progress = epoch.min(t_max) as f64 / t_max as f64;
    eta_min + (base_lr - eta_min) * (1.0 + (PI * progress).cos()) / 2.0
}
