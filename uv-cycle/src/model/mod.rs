//! The texture predictor and the learned renderer.
//!
//! Both implement [nn::ModuleT], mapping a `[B, 3, H, W]` tensor to a tensor
//! of the same shape, and are composed by the loss rather than by each other.

mod activation;
mod conv_bn_2d;
mod deconv_bn_2d;
mod pair;
mod predictor;
mod renderer;

pub use activation::*;
pub use conv_bn_2d::*;
pub use deconv_bn_2d::*;
pub use pair::*;
pub use predictor::*;
pub use renderer::*;
