pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use derivative::Derivative;
pub use indexmap::IndexMap;
pub use itertools::Itertools as _;
pub use rand::{prelude::*, rngs::StdRng};
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    collections::{BTreeMap, HashMap},
    fmt::Debug,
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
};
pub use tch::{
    kind::FLOAT_CPU,
    nn::{self, ModuleT as _},
    vision, Device, IndexOp as _, Kind, Tensor,
};
pub use tch_tensor_like::TensorLike;
pub use tracing::{info, warn};

#[cfg(test)]
pub use approx::assert_abs_diff_eq;
