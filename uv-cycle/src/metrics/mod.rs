//! Evaluation metrics and their per-epoch aggregation.

mod epoch;
mod perceptual;
mod ssim;

pub use epoch::*;
pub use perceptual::*;
pub use ssim::*;
