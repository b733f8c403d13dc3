use super::{masked_l1, LossWeights};
use crate::{common::*, dataset::TrainingBatch, model::ModelPair};

/// The intermediate outputs of one forward pass through both cycles.
#[derive(Debug, TensorLike)]
pub struct CyclePredictions {
    /// Texture predicted from view A.
    pub uv_pred_a: Tensor,
    /// Texture predicted from view B.
    pub uv_pred_b: Tensor,
    /// View A rendered back from its predicted texture.
    pub view_recon_a: Tensor,
    /// View B rendered back from its predicted texture.
    pub view_recon_b: Tensor,
    /// Ground truth texture passed through the renderer and the predictor.
    pub uv_recon: Tensor,
}

impl CyclePredictions {
    pub fn new(model: &ModelPair, batch: &TrainingBatch, train: bool) -> Self {
        let uv_pred_a = model.predict(&batch.view_a, train);
        let uv_pred_b = model.predict(&batch.view_b, train);
        let view_recon_a = model.render(&uv_pred_a, train);
        let view_recon_b = model.render(&uv_pred_b, train);
        let view_from_uv = model.render(&batch.uv_gt, train);
        let uv_recon = model.predict(&view_from_uv, train);

        Self {
            uv_pred_a,
            uv_pred_b,
            view_recon_a,
            view_recon_b,
            uv_recon,
        }
    }
}

/// The four loss terms and their weighted sum as scalar tensors.
#[derive(Debug, TensorLike)]
pub struct CycleLossOutput {
    pub total: Tensor,
    pub cycle: Tensor,
    pub uv_recon: Tensor,
    pub direct: Tensor,
    pub cross: Tensor,
}

impl CycleLossOutput {
    pub fn values(&self) -> LossValues {
        LossValues {
            total: f64::from(&self.total),
            cycle: f64::from(&self.cycle),
            uv_recon: f64::from(&self.uv_recon),
            direct: f64::from(&self.direct),
            cross: f64::from(&self.cross),
        }
    }
}

/// Detached loss values of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LossValues {
    pub total: f64,
    pub cycle: f64,
    pub uv_recon: f64,
    pub direct: f64,
    pub cross: f64,
}

#[derive(Debug, Clone, Default)]
pub struct CycleLossInit {
    pub weights: LossWeights,
}

impl CycleLossInit {
    pub fn build(self) -> Result<CycleLoss> {
        let Self { weights } = self;
        weights.validate()?;
        Ok(CycleLoss { weights })
    }
}

/// Combines reprojection, reconstruction, supervision and cross-view terms.
#[derive(Debug, Clone)]
pub struct CycleLoss {
    weights: LossWeights,
}

impl CycleLoss {
    pub fn weights(&self) -> &LossWeights {
        &self.weights
    }

    pub fn set_weights(&mut self, weights: LossWeights) -> Result<()> {
        weights.validate()?;
        self.weights = weights;
        Ok(())
    }

    pub fn forward(&self, preds: &CyclePredictions, batch: &TrainingBatch) -> CycleLossOutput {
        let CyclePredictions {
            uv_pred_a,
            uv_pred_b,
            view_recon_a,
            view_recon_b,
            uv_recon,
        } = preds;

        let cycle = (masked_l1(view_recon_a, &batch.view_a, Some(&batch.mask_a))
            + masked_l1(view_recon_b, &batch.view_b, Some(&batch.mask_b)))
            / 2.0;
        let uv_recon = masked_l1(uv_recon, &batch.uv_gt, None);
        let direct = (masked_l1(uv_pred_a, &batch.uv_gt, None)
            + masked_l1(uv_pred_b, &batch.uv_gt, None))
            / 2.0;
        let cross = masked_l1(uv_pred_a, uv_pred_b, None);

        let LossWeights {
            cycle: w_cycle,
            uv_recon: w_uv_recon,
            direct: w_direct,
            cross: w_cross,
        } = self.weights;
        let total = &cycle * w_cycle + &uv_recon * w_uv_recon + &direct * w_direct + &cross * w_cross;

        CycleLossOutput {
            total,
            cycle,
            uv_recon,
            direct,
            cross,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelPairInit, RendererInit, TexturePredictorInit};

    fn small_model() -> ModelPair {
        ModelPairInit {
            predictor: TexturePredictorInit {
                base_c: 8,
                ..Default::default()
            },
            renderer: RendererInit {
                base_c: 8,
                ..Default::default()
            },
        }
        .build(Device::Cpu)
    }

    fn random_batch() -> TrainingBatch {
        let image = || Tensor::rand(&[2, 3, 32, 32], FLOAT_CPU) * 2.0 - 1.0;
        let mask = || Tensor::rand(&[2, 1, 32, 32], FLOAT_CPU).gt(0.5).to_kind(Kind::Float);
        TrainingBatch {
            uv_gt: image(),
            view_a: image(),
            view_b: image(),
            mask_a: mask(),
            mask_b: mask(),
        }
    }

    #[test]
    fn loss_terms_are_symmetric_under_view_swap() {
        tch::manual_seed(7);
        let model = small_model();
        let loss = CycleLossInit::default().build().unwrap();
        let batch = random_batch();
        let swapped = batch.swap_views();

        let (lhs, rhs) = tch::no_grad(|| {
            let lhs = loss.forward(&CyclePredictions::new(&model, &batch, false), &batch);
            let rhs = loss.forward(&CyclePredictions::new(&model, &swapped, false), &swapped);
            (lhs.values(), rhs.values())
        });

        assert_abs_diff_eq!(lhs.cross, rhs.cross, epsilon = 1e-6);
        assert_abs_diff_eq!(lhs.cycle, rhs.cycle, epsilon = 1e-6);
        assert_abs_diff_eq!(lhs.direct, rhs.direct, epsilon = 1e-6);
        assert_abs_diff_eq!(lhs.total, rhs.total, epsilon = 1e-6);
    }

    #[test]
    fn total_is_weighted_sum_of_terms() {
        tch::manual_seed(3);
        let model = small_model();
        let weights = LossWeights {
            cycle: 0.5,
            uv_recon: 0.0,
            direct: 2.0,
            cross: 1.0,
        };
        let loss = CycleLossInit { weights }.build().unwrap();
        let batch = random_batch();

        let values = tch::no_grad(|| {
            loss.forward(&CyclePredictions::new(&model, &batch, false), &batch)
                .values()
        });
        let expect = weights.combine(values.cycle, values.uv_recon, values.direct, values.cross);

        assert_abs_diff_eq!(values.total, expect, epsilon = 1e-5);
        assert!(values.cross >= 0.0);
    }

    #[test]
    fn total_loss_backpropagates_into_both_models() {
        tch::manual_seed(11);
        let model = small_model();
        let loss = CycleLossInit::default().build().unwrap();
        let batch = random_batch();

        let output = loss.forward(&CyclePredictions::new(&model, &batch, true), &batch);
        output.total.backward();

        let has_grad = |vs: &nn::VarStore| {
            vs.trainable_variables()
                .iter()
                .any(|var| var.grad().defined() && f64::from(var.grad().abs().sum(Kind::Float)) > 0.0)
        };
        assert!(has_grad(&model.predictor_vs));
        assert!(has_grad(&model.renderer_vs));
    }
}
