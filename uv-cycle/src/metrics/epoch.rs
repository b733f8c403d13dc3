use super::{PerceptualMetric, Ssim};
use crate::{
    common::*,
    dataset::TrainingBatch,
    loss::{CyclePredictions, LossValues},
};

/// Image quality of one evaluation batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// SSIM between reprojected and real views, averaged over both views.
    pub ssim_view: f64,
    /// SSIM between the texture predicted from view A and the ground truth.
    pub ssim_uv: f64,
    /// Perceptual distance between reprojected and real views, NaN if unavailable.
    pub lpips_view: f64,
}

impl QualityMetrics {
    pub fn compute(
        preds: &CyclePredictions,
        batch: &TrainingBatch,
        ssim: &Ssim,
        perceptual: &dyn PerceptualMetric,
    ) -> Result<Self> {
        let ssim_view = (ssim.forward(&preds.view_recon_a, &batch.view_a)?
            + ssim.forward(&preds.view_recon_b, &batch.view_b)?)
            / 2.0;
        let ssim_uv = ssim.forward(&preds.uv_pred_a, &batch.uv_gt)?;
        let lpips_view = (perceptual.distance(&preds.view_recon_a, &batch.view_a)?
            + perceptual.distance(&preds.view_recon_b, &batch.view_b)?)
            / 2.0;

        Ok(Self {
            ssim_view,
            ssim_uv,
            lpips_view,
        })
    }
}

/// Batch-averaged metrics of one epoch.
///
/// The quality metrics are only present for evaluation epochs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub total: f64,
    pub cycle: f64,
    pub uv_recon: f64,
    pub direct: f64,
    pub cross: f64,
    #[serde(flatten)]
    pub quality: Option<QualityMetrics>,
}

impl EpochMetrics {
    /// Flatten into named scalars, losses first.
    pub fn to_map(&self) -> IndexMap<String, f64> {
        let mut map: IndexMap<String, f64> = [
            ("total", self.total),
            ("cycle", self.cycle),
            ("uv_recon", self.uv_recon),
            ("direct", self.direct),
            ("cross", self.cross),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        if let Some(quality) = &self.quality {
            map.insert("ssim_view".into(), quality.ssim_view);
            map.insert("ssim_uv".into(), quality.ssim_uv);
            map.insert("lpips_view".into(), quality.lpips_view);
        }
        map
    }

    pub fn from_map(map: &IndexMap<String, f64>) -> Result<Self> {
        let get = |name: &str| {
            map.get(name)
                .copied()
                .ok_or_else(|| format_err!("the metric '{}' is missing", name))
        };

        let quality = match (
            map.get("ssim_view"),
            map.get("ssim_uv"),
            map.get("lpips_view"),
        ) {
            (Some(&ssim_view), Some(&ssim_uv), Some(&lpips_view)) => Some(QualityMetrics {
                ssim_view,
                ssim_uv,
                lpips_view,
            }),
            _ => None,
        };

        Ok(Self {
            total: get("total")?,
            cycle: get("cycle")?,
            uv_recon: get("uv_recon")?,
            direct: get("direct")?,
            cross: get("cross")?,
            quality,
        })
    }
}

/// Running sums of per-batch metrics.
#[derive(Debug, Clone, Default)]
pub struct EpochMetricsAccumulator {
    num_losses: usize,
    total: f64,
    cycle: f64,
    uv_recon: f64,
    direct: f64,
    cross: f64,
    num_quality: usize,
    ssim_view: f64,
    ssim_uv: f64,
    lpips_view: f64,
}

impl EpochMetricsAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num_batches(&self) -> usize {
        self.num_losses
    }

    pub fn push_losses(&mut self, values: &LossValues) {
        self.num_losses += 1;
        self.total += values.total;
        self.cycle += values.cycle;
        self.uv_recon += values.uv_recon;
        self.direct += values.direct;
        self.cross += values.cross;
    }

    pub fn push_quality(&mut self, quality: &QualityMetrics) {
        self.num_quality += 1;
        self.ssim_view += quality.ssim_view;
        self.ssim_uv += quality.ssim_uv;
        self.lpips_view += quality.lpips_view;
    }

    pub fn finish(&self) -> Result<EpochMetrics> {
        ensure!(self.num_losses > 0, "no batch was recorded in this epoch");
        let count = self.num_losses as f64;

        let quality = (self.num_quality > 0).then(|| {
            let count = self.num_quality as f64;
            QualityMetrics {
                ssim_view: self.ssim_view / count,
                ssim_uv: self.ssim_uv / count,
                lpips_view: self.lpips_view / count,
            }
        });

        Ok(EpochMetrics {
            total: self.total / count,
            cycle: self.cycle / count,
            uv_recon: self.uv_recon / count,
            direct: self.direct / count,
            cross: self.cross / count,
            quality,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn losses(scale: f64) -> LossValues {
        LossValues {
            total: scale,
            cycle: 2.0 * scale,
            uv_recon: 3.0 * scale,
            direct: 4.0 * scale,
            cross: 5.0 * scale,
        }
    }

    #[test]
    fn accumulator_averages_batches() {
        let mut acc = EpochMetricsAccumulator::new();
        acc.push_losses(&losses(1.0));
        acc.push_losses(&losses(3.0));

        let metrics = acc.finish().unwrap();
        assert_abs_diff_eq!(metrics.total, 2.0);
        assert_abs_diff_eq!(metrics.cross, 10.0);
        assert!(metrics.quality.is_none());
    }

    #[test]
    fn unavailable_perceptual_metric_propagates_nan() {
        let mut acc = EpochMetricsAccumulator::new();
        acc.push_losses(&losses(1.0));
        acc.push_quality(&QualityMetrics {
            ssim_view: 0.5,
            ssim_uv: 0.25,
            lpips_view: f64::NAN,
        });

        let quality = acc.finish().unwrap().quality.unwrap();
        assert_abs_diff_eq!(quality.ssim_uv, 0.25);
        assert!(quality.lpips_view.is_nan());
    }

    #[test]
    fn empty_epoch_is_an_error() {
        assert!(EpochMetricsAccumulator::new().finish().is_err());
    }

    #[test]
    fn map_conversion_keeps_all_names() {
        let metrics = EpochMetrics {
            total: 0.4,
            cycle: 0.1,
            uv_recon: 0.2,
            direct: 0.3,
            cross: 0.05,
            quality: Some(QualityMetrics {
                ssim_view: 0.6,
                ssim_uv: 0.3,
                lpips_view: 0.45,
            }),
        };

        let map = metrics.to_map();
        assert_eq!(
            map.keys().map(String::as_str).collect::<Vec<_>>(),
            [
                "total",
                "cycle",
                "uv_recon",
                "direct",
                "cross",
                "ssim_view",
                "ssim_uv",
                "lpips_view"
            ]
        );
        assert_eq!(EpochMetrics::from_map(&map).unwrap(), metrics);
    }
}
