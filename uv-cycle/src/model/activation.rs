use crate::common::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    Linear,
    Relu,
    Tanh,
}

pub trait ActivationExt {
    fn activation(&self, activation: Activation) -> Tensor;
}

impl ActivationExt for Tensor {
    fn activation(&self, activation: Activation) -> Tensor {
        match activation {
            Activation::Linear => self.shallow_clone(),
            Activation::Relu => self.relu(),
            Activation::Tanh => self.tanh(),
        }
    }
}
