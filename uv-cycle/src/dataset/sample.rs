use super::{Manifest, PairedViewIndex, RecordPair};
use crate::{
    common::*,
    image,
    mask::{VisibilityMask, VisibilityMaskInit},
};

/// Two augmented views of the same texture with their visibility masks.
///
/// Images are `[3, H, W]` in `[-1, 1]` and masks are `[1, H, W]` in `[0, 1]`.
/// A collated batch carries the same fields with a leading batch dimension.
#[derive(Debug, TensorLike)]
pub struct PairedViews {
    pub uv_gt: Tensor,
    pub view_a: Tensor,
    pub view_b: Tensor,
    pub mask_a: Tensor,
    pub mask_b: Tensor,
}

/// A single sample as loaded from the dataset.
pub type TrainingSample = PairedViews;

/// Samples stacked along the first dimension.
pub type TrainingBatch = PairedViews;

impl PairedViews {
    /// Stack samples into a batch.
    pub fn from_samples(samples: &[TrainingSample]) -> Result<TrainingBatch> {
        ensure!(!samples.is_empty(), "cannot build a batch without samples");
        let stack = |select: fn(&TrainingSample) -> &Tensor| {
            let tensors: Vec<_> = samples.iter().map(select).collect();
            Tensor::stack(&tensors, 0)
        };

        Ok(Self {
            uv_gt: stack(|sample| &sample.uv_gt),
            view_a: stack(|sample| &sample.view_a),
            view_b: stack(|sample| &sample.view_b),
            mask_a: stack(|sample| &sample.mask_a),
            mask_b: stack(|sample| &sample.mask_b),
        })
    }

    /// The leading dimension of a collated batch.
    pub fn batch_size(&self) -> i64 {
        self.uv_gt.size()[0]
    }

    /// Swap the roles of the two views.
    pub fn swap_views(&self) -> Self {
        Self {
            uv_gt: self.uv_gt.shallow_clone(),
            view_a: self.view_b.shallow_clone(),
            view_b: self.view_a.shallow_clone(),
            mask_a: self.mask_b.shallow_clone(),
            mask_b: self.mask_a.shallow_clone(),
        }
    }
}

/// The paired-view dataset that decodes images on demand.
///
/// Nothing is cached. Every access decodes the three images and recomputes
/// both masks.
#[derive(Debug, Clone)]
pub struct PairedViewDataset {
    index: PairedViewIndex,
    image_size: usize,
    mask: VisibilityMask,
}

impl PairedViewDataset {
    pub fn new(index: PairedViewIndex, image_size: usize) -> Result<Self> {
        ensure!(image_size > 0, "image_size must be positive");
        ensure!(
            image_size % 16 == 0,
            "image_size must be a multiple of 16, but get {}",
            image_size
        );
        let mask = VisibilityMaskInit::default().build()?;

        Ok(Self {
            index,
            image_size,
            mask,
        })
    }

    /// Load the manifest at `path` and build the dataset.
    pub fn open(path: impl AsRef<Path>, image_size: usize) -> Result<Self> {
        let Manifest { records, .. } = Manifest::open(path)?;
        let index = PairedViewIndex::new(records)?;
        Self::new(index, image_size)
    }

    pub fn index(&self) -> &PairedViewIndex {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn image_size(&self) -> usize {
        self.image_size
    }

    /// Draw a partner for `index` and load the sample.
    pub fn get<R>(&self, index: usize, rng: &mut R) -> Result<TrainingSample>
    where
        R: Rng + ?Sized,
    {
        let pair = self.index.pair(index, rng)?;
        self.load(&pair)
    }

    /// Load the images of a drawn pair and estimate their masks.
    pub fn load(&self, pair: &RecordPair) -> Result<TrainingSample> {
        let RecordPair {
            primary, partner, ..
        } = pair;
        let image_size = self.image_size;

        let uv_gt = image::load_normalized(&primary.source_uv, image_size)?;
        let raw_a = image::load_rgb(&primary.augmented_view, image_size)?;
        let raw_b = if Arc::ptr_eq(primary, partner) {
            raw_a.shallow_clone()
        } else {
            image::load_rgb(&partner.augmented_view, image_size)?
        };
        let mask_a = self.mask.forward(&raw_a)?;
        let mask_b = self.mask.forward(&raw_b)?;

        Ok(TrainingSample {
            uv_gt,
            view_a: image::normalize(&raw_a),
            view_b: image::normalize(&raw_b),
            mask_a,
            mask_b,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(value: f64) -> TrainingSample {
        let image = || Tensor::full(&[3, 4, 4], value, FLOAT_CPU);
        PairedViews {
            uv_gt: image(),
            view_a: image(),
            view_b: -image(),
            mask_a: Tensor::ones(&[1, 4, 4], FLOAT_CPU),
            mask_b: Tensor::zeros(&[1, 4, 4], FLOAT_CPU),
        }
    }

    #[test]
    fn samples_are_stacked_into_a_batch() -> Result<()> {
        let batch = PairedViews::from_samples(&[sample(0.25), sample(0.5)])?;
        assert_eq!(batch.batch_size(), 2);
        assert_eq!(batch.view_a.size(), vec![2, 3, 4, 4]);
        assert_eq!(batch.mask_b.size(), vec![2, 1, 4, 4]);
        assert_abs_diff_eq!(f64::from(batch.uv_gt.get(1).mean(Kind::Float)), 0.5);

        assert!(PairedViews::from_samples(&[]).is_err());
        Ok(())
    }

    #[test]
    fn swapping_exchanges_views_and_masks() -> Result<()> {
        let batch = PairedViews::from_samples(&[sample(0.25)])?;
        let swapped = batch.swap_views();
        assert_abs_diff_eq!(f64::from(swapped.view_a.mean(Kind::Float)), -0.25);
        assert_abs_diff_eq!(f64::from(swapped.mask_a.sum(Kind::Float)), 0.0);
        assert_abs_diff_eq!(f64::from(swapped.mask_b.sum(Kind::Float)), 16.0);
        assert_abs_diff_eq!(f64::from(swapped.uv_gt.mean(Kind::Float)), 0.25);
        Ok(())
    }
}
