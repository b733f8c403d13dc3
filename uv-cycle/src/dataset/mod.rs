//! Dataset processing toolkit.

mod index;
mod manifest;
mod report;
mod sample;
mod split;

pub use index::*;
pub use manifest::*;
pub use report::*;
pub use sample::*;
pub use split::*;
