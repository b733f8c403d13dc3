//! The building blocks of the view-to-texture cycle model.

mod common;
pub mod checkpoint;
pub mod dataset;
pub mod image;
pub mod loss;
pub mod mask;
pub mod metrics;
pub mod model;
