use crate::common::*;

/// The train/evaluation partition of sample indexes.
///
/// It is drawn once when the dataset is constructed and kept for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetSplit {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

impl DatasetSplit {
    /// Hold out `val_fraction` of `num_samples`, at least one sample.
    pub fn new<R>(num_samples: usize, val_fraction: f64, rng: &mut R) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        ensure!(
            (0.0..1.0).contains(&val_fraction),
            "val_fraction must be in range [0, 1), but get {}",
            val_fraction
        );
        ensure!(
            num_samples >= 2,
            "at least 2 samples are required to split, but get {}",
            num_samples
        );

        let val_size = ((num_samples as f64 * val_fraction) as usize).max(1);
        let mut indexes: Vec<_> = (0..num_samples).collect();
        indexes.shuffle(rng);
        let train = indexes.split_off(val_size);

        Ok(Self {
            train,
            val: indexes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_holds_out_requested_fraction() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(1337);
        let split = DatasetSplit::new(50, 0.1, &mut rng)?;
        assert_eq!(split.val.len(), 5);
        assert_eq!(split.train.len(), 45);

        let mut all: Vec<_> = split.train.iter().chain(&split.val).cloned().collect();
        all.sort_unstable();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn split_keeps_at_least_one_validation_sample() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(0);
        let split = DatasetSplit::new(4, 0.1, &mut rng)?;
        assert_eq!(split.val.len(), 1);
        assert_eq!(split.train.len(), 3);
        Ok(())
    }

    #[test]
    fn split_is_reproducible() -> Result<()> {
        let lhs = DatasetSplit::new(20, 0.25, &mut StdRng::seed_from_u64(9))?;
        let rhs = DatasetSplit::new(20, 0.25, &mut StdRng::seed_from_u64(9))?;
        assert_eq!(lhs, rhs);
        Ok(())
    }

    #[test]
    fn invalid_arguments_are_rejected() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(DatasetSplit::new(1, 0.1, &mut rng).is_err());
        assert!(DatasetSplit::new(10, 1.0, &mut rng).is_err());
    }
}
