//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context as _, Error, Result};
pub use chrono::Local;
pub use futures::{
    future::FutureExt as _,
    stream::{self, StreamExt as _, TryStreamExt as _},
};
pub use itertools::Itertools as _;
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng};
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Cow,
    f64::consts::PI,
    fmt::Debug,
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
pub use structopt::StructOpt;
pub use tch::{
    nn::{self, OptimizerConfig as _},
    Device, Kind, Tensor,
};
pub use tch_tensor_like::TensorLike;
pub use tfrecord::{EventWriter, EventWriterInit};
pub use tokio::sync::{broadcast, mpsc};
pub use tracing::{info, info_span, trace_span, warn, Instrument as _};
pub use uv_cycle::{
    checkpoint::{self, BestTracker},
    dataset::{DatasetSplit, PairedViewDataset, RecordPair, TrainingBatch, TrainingSample},
    image,
    loss::{CycleLoss, CycleLossInit, CyclePredictions, LossValues, LossWeightSchedule, LossWeights},
    metrics::{
        load_perceptual_metric, EpochMetrics, EpochMetricsAccumulator, PerceptualMetric,
        QualityMetrics, Ssim, SsimInit,
    },
    model::{ModelPair, ModelPairInit, RendererInit, TexturePredictorInit},
};

pub type Fallible<T> = Result<T, Error>;

#[cfg(test)]
pub use approx::assert_abs_diff_eq;
