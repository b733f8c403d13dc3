//! Loss composition for cycle-consistent training.

mod cycle_loss;
mod masked_l1;
mod weights;

pub use cycle_loss::*;
pub use masked_l1::*;
pub use weights::*;
