use crate::common::*;

const EPSILON: f64 = 1e-6;

/// L1 distance restricted to the pixels selected by `mask`.
///
/// The absolute error is summed over masked positions and all channels, then
/// divided by the mask area times the channel count. The mask has one channel
/// and is broadcast over the channels of `pred`. Without a mask it is the
/// plain mean absolute error.
pub fn masked_l1(pred: &Tensor, target: &Tensor, mask: Option<&Tensor>) -> Tensor {
    let diff = (pred - target).abs();

    match mask {
        Some(mask) => {
            let channels = pred.size()[1] as f64;
            let denom = mask.sum(Kind::Float) * channels + EPSILON;
            (diff * mask).sum(Kind::Float) / denom
        }
        None => diff.mean(Kind::Float),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unmasked_is_mean_absolute_error() {
        let pred = Tensor::of_slice(&[1.0f32, 2.0, 3.0, 4.0]).view([1, 1, 2, 2]);
        let target = Tensor::zeros(&[1, 1, 2, 2], FLOAT_CPU);
        let loss = f64::from(masked_l1(&pred, &target, None));
        assert_abs_diff_eq!(loss, 2.5, epsilon = 1e-6);
    }

    #[test]
    fn mask_restricts_error_to_selected_pixels() {
        let pred = Tensor::ones(&[1, 3, 2, 2], FLOAT_CPU);
        let target = Tensor::zeros(&[1, 3, 2, 2], FLOAT_CPU);
        let _ = target.i((.., .., 1, ..)).fill_(1.0);
        let mask = Tensor::of_slice(&[1.0f32, 1.0, 0.0, 0.0]).view([1, 1, 2, 2]);

        let loss = f64::from(masked_l1(&pred, &target, Some(&mask)));
        assert_abs_diff_eq!(loss, 1.0, epsilon = 1e-5);

        let mask = Tensor::of_slice(&[0.0f32, 0.0, 1.0, 1.0]).view([1, 1, 2, 2]);
        let loss = f64::from(masked_l1(&pred, &target, Some(&mask)));
        assert_abs_diff_eq!(loss, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn empty_mask_gives_zero_instead_of_nan() {
        let pred = Tensor::ones(&[1, 3, 2, 2], FLOAT_CPU);
        let target = Tensor::zeros(&[1, 3, 2, 2], FLOAT_CPU);
        let mask = Tensor::zeros(&[1, 1, 2, 2], FLOAT_CPU);

        let loss = f64::from(masked_l1(&pred, &target, Some(&mask)));
        assert!(loss.is_finite());
        assert_abs_diff_eq!(loss, 0.0);
    }
}
