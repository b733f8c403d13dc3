//! Persistence of the model pair with its evaluation metrics.
//!
//! A checkpoint is a single tensor archive. Predictor variables are stored
//! under `uv.`, renderer variables under `renderer.` and each metric as a
//! scalar double tensor under `metrics.`.

use crate::{common::*, metrics::EpochMetrics, model::ModelPair};

const PREDICTOR_PREFIX: &str = "uv.";
const RENDERER_PREFIX: &str = "renderer.";
const METRICS_PREFIX: &str = "metrics.";

pub fn save_checkpoint(
    path: impl AsRef<Path>,
    model: &ModelPair,
    metrics: &EpochMetrics,
) -> Result<()> {
    let path = path.as_ref();

    let vars = |prefix: &'static str, vs: &nn::VarStore| {
        vs.variables()
            .into_iter()
            .map(move |(name, tensor)| (format!("{}{}", prefix, name), tensor))
    };
    let metric_tensors = metrics
        .to_map()
        .into_iter()
        .map(|(name, value)| (format!("{}{}", METRICS_PREFIX, name), Tensor::from(value)));

    let named_tensors: Vec<(String, Tensor)> = vars(PREDICTOR_PREFIX, &model.predictor_vs)
        .chain(vars(RENDERER_PREFIX, &model.renderer_vs))
        .chain(metric_tensors)
        .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
        .collect();

    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }
    Tensor::save_multi(&named_tensors, path)
        .with_context(|| format!("unable to save checkpoint '{}'", path.display()))?;
    Ok(())
}

/// Load the weights of both models in place and return the stored metrics.
pub fn load_checkpoint(path: impl AsRef<Path>, model: &mut ModelPair) -> Result<EpochMetrics> {
    let path = path.as_ref();
    let archive = read_archive(path)?;

    copy_vars(&archive, PREDICTOR_PREFIX, &model.predictor_vs)?;
    copy_vars(&archive, RENDERER_PREFIX, &model.renderer_vs)?;

    let metrics = collect_metrics(&archive)?;
    EpochMetrics::from_map(&metrics)
        .with_context(|| format!("invalid metrics in checkpoint '{}'", path.display()))
}

/// Read only the metrics stored in a checkpoint.
pub fn load_metrics(path: impl AsRef<Path>) -> Result<IndexMap<String, f64>> {
    let archive = read_archive(path.as_ref())?;
    collect_metrics(&archive)
}

fn read_archive(path: &Path) -> Result<HashMap<String, Tensor>> {
    let tensors = Tensor::load_multi(path)
        .with_context(|| format!("unable to load checkpoint '{}'", path.display()))?;
    Ok(tensors.into_iter().collect())
}

fn collect_metrics(archive: &HashMap<String, Tensor>) -> Result<IndexMap<String, f64>> {
    archive
        .iter()
        .filter_map(|(name, tensor)| {
            let name = name.strip_prefix(METRICS_PREFIX)?;
            Some((name, tensor))
        })
        .sorted_by(|(lhs, _), (rhs, _)| lhs.cmp(rhs))
        .map(|(name, tensor)| {
            ensure!(
                tensor.numel() == 1,
                "the metric '{}' is not a scalar",
                name
            );
            Ok((name.to_string(), f64::from(tensor)))
        })
        .collect()
}

fn copy_vars(archive: &HashMap<String, Tensor>, prefix: &str, vs: &nn::VarStore) -> Result<()> {
    tch::no_grad(|| {
        for (name, mut var) in vs.variables() {
            let key = format!("{}{}", prefix, name);
            let src = archive
                .get(&key)
                .ok_or_else(|| format_err!("the variable '{}' is missing in checkpoint", key))?;
            ensure!(
                src.size() == var.size(),
                "shape mismatch for '{}': expect {:?}, but get {:?}",
                key,
                var.size(),
                src.size()
            );
            var.copy_(&src.to_device(var.device()));
        }
        Ok(())
    })
}

/// Tracks the lowest validation total seen in a run.
///
/// The first observation is always an improvement and ties are not.
#[derive(Debug, Clone, Default)]
pub struct BestTracker {
    best: Option<f64>,
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn best(&self) -> Option<f64> {
        self.best
    }

    /// Record a value and return whether it improves on the best so far.
    pub fn update(&mut self, value: f64) -> bool {
        if value.is_nan() {
            return false;
        }
        let improved = self.best.map_or(true, |best| value < best);
        if improved {
            self.best = Some(value);
        }
        improved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metrics::QualityMetrics,
        model::{ModelPairInit, RendererInit, TexturePredictorInit},
    };

    fn small_model() -> ModelPair {
        ModelPairInit {
            predictor: TexturePredictorInit {
                base_c: 4,
                ..Default::default()
            },
            renderer: RendererInit {
                base_c: 4,
                ..Default::default()
            },
        }
        .build(Device::Cpu)
    }

    #[test]
    fn checkpoint_restores_weights_and_metrics() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("best.ckpt");
        let metrics = EpochMetrics {
            total: 0.42,
            cycle: 0.1,
            uv_recon: 0.2,
            direct: 0.3,
            cross: 0.05,
            quality: Some(QualityMetrics {
                ssim_view: 0.7,
                ssim_uv: 0.26,
                lpips_view: f64::NAN,
            }),
        };

        tch::manual_seed(1);
        let saved = small_model();
        save_checkpoint(&path, &saved, &metrics)?;

        tch::manual_seed(2);
        let mut loaded = small_model();
        let restored = load_checkpoint(&path, &mut loaded)?;

        assert_abs_diff_eq!(restored.total, 0.42);
        assert!(restored.quality.unwrap().lpips_view.is_nan());

        let input = Tensor::rand(&[1, 3, 16, 16], FLOAT_CPU);
        let lhs = saved.predict(&input, false);
        let rhs = loaded.predict(&input, false);
        assert_abs_diff_eq!(f64::from((lhs - rhs).abs().max()), 0.0);

        let names = load_metrics(&path)?;
        assert_abs_diff_eq!(names["ssim_uv"], 0.26);
        Ok(())
    }

    #[test]
    fn best_tracker_is_monotonic() {
        let mut tracker = BestTracker::new();
        let totals = [0.9, 0.7, 0.8, 0.7, 0.5, f64::NAN, 0.6];
        let improved: Vec<_> = totals.iter().map(|&val| tracker.update(val)).collect();

        assert_eq!(improved, [true, true, false, false, true, false, false]);
        assert_eq!(tracker.best(), Some(0.5));
        assert!(totals
            .iter()
            .filter(|val| !val.is_nan())
            .all(|&val| tracker.best().unwrap() <= val));
    }
}
