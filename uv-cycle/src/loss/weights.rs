use crate::common::*;

/// The weighting factors of the four loss terms.
///
/// The weights must be non-negative and need not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossWeights {
    pub cycle: f64,
    pub uv_recon: f64,
    pub direct: f64,
    pub cross: f64,
}

impl Default for LossWeights {
    fn default() -> Self {
        Self {
            cycle: 0.30,
            uv_recon: 0.25,
            direct: 0.30,
            cross: 0.15,
        }
    }
}

impl LossWeights {
    pub fn validate(&self) -> Result<()> {
        let Self {
            cycle,
            uv_recon,
            direct,
            cross,
        } = *self;

        for (name, weight) in [
            ("cycle", cycle),
            ("uv_recon", uv_recon),
            ("direct", direct),
            ("cross", cross),
        ] {
            ensure!(
                weight.is_finite() && weight >= 0.0,
                "the {} weight must be non-negative, but get {}",
                name,
                weight
            );
        }
        Ok(())
    }

    /// Linear interpolation towards `other` by `ratio` in `[0, 1]`.
    pub fn lerp(&self, other: &Self, ratio: f64) -> Self {
        let mix = |lhs: f64, rhs: f64| lhs + (rhs - lhs) * ratio;
        Self {
            cycle: mix(self.cycle, other.cycle),
            uv_recon: mix(self.uv_recon, other.uv_recon),
            direct: mix(self.direct, other.direct),
            cross: mix(self.cross, other.cross),
        }
    }

    /// The weighted sum of the four loss terms.
    pub fn combine(&self, cycle: f64, uv_recon: f64, direct: f64, cross: f64) -> f64 {
        self.cycle * cycle + self.uv_recon * uv_recon + self.direct * direct + self.cross * cross
    }
}

/// Loss weights interpolated linearly from `start` to `end` across epochs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossWeightSchedule {
    pub start: LossWeights,
    pub end: Option<LossWeights>,
}

impl LossWeightSchedule {
    pub fn constant(weights: LossWeights) -> Self {
        Self {
            start: weights,
            end: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.start.validate()?;
        if let Some(end) = &self.end {
            end.validate()?;
        }
        Ok(())
    }

    /// The weights of the 1-based `epoch` among `num_epochs` epochs.
    pub fn at(&self, epoch: usize, num_epochs: usize) -> LossWeights {
        match &self.end {
            Some(end) if num_epochs > 1 => {
                let ratio = (epoch.saturating_sub(1) as f64 / (num_epochs - 1) as f64).min(1.0);
                self.start.lerp(end, ratio)
            }
            _ => self.start,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_interpolates_between_endpoints() {
        let schedule = LossWeightSchedule {
            start: LossWeights {
                cycle: 0.26,
                uv_recon: 0.32,
                direct: 0.32,
                cross: 0.08,
            },
            end: Some(LossWeights {
                cycle: 0.30,
                uv_recon: 0.25,
                direct: 0.32,
                cross: 0.12,
            }),
        };

        assert_eq!(schedule.at(1, 20), schedule.start);
        assert_eq!(schedule.at(20, 20), schedule.end.unwrap());

        let middle = schedule.at(3, 5);
        assert_abs_diff_eq!(middle.cycle, 0.28, epsilon = 1e-9);
        assert_abs_diff_eq!(middle.uv_recon, 0.285, epsilon = 1e-9);
        assert_abs_diff_eq!(middle.cross, 0.10, epsilon = 1e-9);
    }

    #[test]
    fn single_epoch_uses_start_weights() {
        let schedule = LossWeightSchedule {
            start: LossWeights::default(),
            end: Some(LossWeights {
                cycle: 1.0,
                uv_recon: 1.0,
                direct: 1.0,
                cross: 1.0,
            }),
        };
        assert_eq!(schedule.at(1, 1), LossWeights::default());
    }

    #[test]
    fn negative_weight_is_rejected() {
        let weights = LossWeights {
            cross: -0.1,
            ..Default::default()
        };
        assert!(weights.validate().is_err());
    }
}
