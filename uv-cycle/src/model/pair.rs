use super::{Renderer, RendererInit, TexturePredictor, TexturePredictorInit};
use crate::common::*;

/// The jointly trained predictor and renderer, each with its own variable store.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ModelPair {
    #[derivative(Debug = "ignore")]
    pub predictor_vs: nn::VarStore,
    #[derivative(Debug = "ignore")]
    pub renderer_vs: nn::VarStore,
    pub predictor: TexturePredictor,
    pub renderer: Renderer,
}

#[derive(Debug, Clone, Default)]
pub struct ModelPairInit {
    pub predictor: TexturePredictorInit,
    pub renderer: RendererInit,
}

impl ModelPairInit {
    pub fn build(self, device: Device) -> ModelPair {
        let Self {
            predictor,
            renderer,
        } = self;

        let predictor_vs = nn::VarStore::new(device);
        let renderer_vs = nn::VarStore::new(device);
        let predictor = predictor.build(predictor_vs.root());
        let renderer = renderer.build(renderer_vs.root());

        ModelPair {
            predictor_vs,
            renderer_vs,
            predictor,
            renderer,
        }
    }
}

impl ModelPair {
    pub fn device(&self) -> Device {
        self.predictor_vs.device()
    }

    /// Predict a texture from a view.
    pub fn predict(&self, view: &Tensor, train: bool) -> Tensor {
        self.predictor.forward_t(view, train)
    }

    /// Render a view from a texture.
    pub fn render(&self, texture: &Tensor, train: bool) -> Tensor {
        self.renderer.forward_t(texture, train)
    }
}
