//! Heuristic car-body visibility mask.
//!
//! Pixels that are either vividly colored (high saturation) or dark (low
//! value) are taken as body pixels, which suits cars photographed against a
//! bright studio background. It is not a learned segmenter, and it produces
//! false positives and negatives on busy backgrounds.

use crate::common::*;

/// Saturation above this value marks a body pixel.
pub const SATURATION_THRESHOLD: f64 = 32.0 / 255.0;
/// Value below this marks a body pixel.
pub const VALUE_THRESHOLD: f64 = 200.0 / 255.0;
/// Side length of the square structuring element.
pub const KERNEL_SIZE: i64 = 5;

const EPSILON: f64 = 1e-6;

/// The visibility mask estimator.
#[derive(Debug, Clone)]
pub struct VisibilityMaskInit {
    pub saturation_threshold: f64,
    pub value_threshold: f64,
    pub kernel_size: i64,
}

impl Default for VisibilityMaskInit {
    fn default() -> Self {
        Self {
            saturation_threshold: SATURATION_THRESHOLD,
            value_threshold: VALUE_THRESHOLD,
            kernel_size: KERNEL_SIZE,
        }
    }
}

impl VisibilityMaskInit {
    pub fn build(self) -> Result<VisibilityMask> {
        let Self {
            saturation_threshold,
            value_threshold,
            kernel_size,
        } = self;

        ensure!(
            (0.0..=1.0).contains(&saturation_threshold),
            "saturation_threshold must be in range [0, 1]"
        );
        ensure!(
            (0.0..=1.0).contains(&value_threshold),
            "value_threshold must be in range [0, 1]"
        );
        ensure!(
            kernel_size > 0 && kernel_size % 2 == 1,
            "kernel_size must be a positive odd number"
        );

        Ok(VisibilityMask {
            saturation_threshold,
            value_threshold,
            kernel_size,
        })
    }
}

#[derive(Debug, Clone)]
pub struct VisibilityMask {
    saturation_threshold: f64,
    value_threshold: f64,
    kernel_size: i64,
}

impl VisibilityMask {
    /// Estimate the mask of an `Uint8` RGB image of shape `[3, H, W]`.
    ///
    /// The output has shape `[1, H, W]` with values in `[0, 1]`.
    pub fn forward(&self, image: &Tensor) -> Result<Tensor> {
        let Self {
            saturation_threshold,
            value_threshold,
            kernel_size,
        } = *self;

        tch::no_grad(|| -> Result<_> {
            let (channels, height, width) = image.size3()?;
            ensure!(
                channels == 3,
                "expect 3 channels, but get {} channels",
                channels
            );

            let rgb = image.to_kind(Kind::Float) / 255.0;
            let hsv = rgb_to_hsv(&rgb)?;
            let saturation = hsv.select(0, 1);
            let value = hsv.select(0, 2);

            let binary = saturation
                .gt(saturation_threshold)
                .logical_or(&value.lt(value_threshold))
                .to_kind(Kind::Float)
                .view([1, 1, height, width]);

            // opening removes speckles, closing fills holes
            let opened = dilate(&erode(&binary, kernel_size), kernel_size);
            let closed = erode(&dilate(&opened, kernel_size), kernel_size);

            let max = closed.max();
            let mask = (closed / (max + EPSILON)).view([1, height, width]);
            Ok(mask.set_requires_grad(false))
        })
    }
}

/// Convert a float RGB image `[3, H, W]` in `[0, 1]` to HSV, each channel in `[0, 1]`.
pub fn rgb_to_hsv(rgb: &Tensor) -> Result<Tensor> {
    let eps = 1e-4;
    let (channels, _height, _width) = rgb.size3()?;
    ensure!(
        channels == 3,
        "channel size must be 3, but get {}",
        channels
    );

    let red = rgb.select(0, 0);
    let green = rgb.select(0, 1);
    let blue = rgb.select(0, 2);

    let value = red.maximum(&green).maximum(&blue);
    let min = red.minimum(&green).minimum(&blue);
    let diff = &value - &min;

    let has_value = value.gt(eps).to_kind(Kind::Float);
    let saturation = &diff / value.clamp_min(eps) * &has_value;

    let hue = {
        let argmax = rgb.argmax(0, false);
        let is_red = argmax.eq(0).to_kind(Kind::Float);
        let is_green = argmax.eq(1).to_kind(Kind::Float);
        let is_blue = argmax.eq(2).to_kind(Kind::Float);
        let has_chroma = diff.gt(eps).to_kind(Kind::Float);
        let safe_diff = diff.clamp_min(eps);

        let case_red = (&green - &blue) / &safe_diff;
        let case_green = (&blue - &red) / &safe_diff + 2.0;
        let case_blue = (&red - &green) / &safe_diff + 4.0;

        let hue = (case_red * is_red + case_green * is_green + case_blue * is_blue) * has_chroma;
        let wrapped = hue.lt(0.0).to_kind(Kind::Float) * 6.0;
        (hue + wrapped) / 6.0
    };

    Ok(Tensor::stack(&[hue, saturation, value], 0))
}

fn dilate(xs: &Tensor, kernel_size: i64) -> Tensor {
    let pad = kernel_size / 2;
    xs.max_pool2d(
        &[kernel_size, kernel_size],
        &[1, 1],
        &[pad, pad],
        &[1, 1],
        false,
    )
}

fn erode(xs: &Tensor, kernel_size: i64) -> Tensor {
    -dilate(&-xs, kernel_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_image(rgb: [u8; 3], size: i64) -> Tensor {
        Tensor::of_slice(&rgb)
            .view([3, 1, 1])
            .expand(&[3, size, size], false)
            .contiguous()
    }

    #[test]
    fn mask_values_stay_in_unit_range() -> Result<()> {
        let estimator = VisibilityMaskInit::default().build()?;
        let image = Tensor::randint(256, &[3, 32, 32], (Kind::Uint8, Device::Cpu));
        let mask = estimator.forward(&image)?;

        assert_eq!(mask.size(), vec![1, 32, 32]);
        assert!(f64::from(mask.min()) >= 0.0);
        assert!(f64::from(mask.max()) <= 1.0);
        Ok(())
    }

    #[test]
    fn bright_background_yields_empty_mask() -> Result<()> {
        let estimator = VisibilityMaskInit::default().build()?;
        let image = solid_image([250, 250, 250], 16);
        let mask = estimator.forward(&image)?;

        assert!(!bool::from(mask.isnan().any()));
        assert_abs_diff_eq!(f64::from(mask.max()), 0.0);
        Ok(())
    }

    #[test]
    fn vivid_body_is_detected() -> Result<()> {
        let estimator = VisibilityMaskInit::default().build()?;
        let image = solid_image([250, 250, 250], 24);
        let _ = image
            .i((.., 4..20, 4..20))
            .copy_(&solid_image([200, 20, 20], 16));
        let mask = estimator.forward(&image)?;

        assert_abs_diff_eq!(f64::from(mask.i((0, 12, 12))), 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(f64::from(mask.i((0, 0, 0))), 0.0);
        Ok(())
    }

    #[test]
    fn opening_removes_isolated_speckles() -> Result<()> {
        let estimator = VisibilityMaskInit::default().build()?;
        let image = solid_image([250, 250, 250], 16);
        let _ = image.i((.., 8..9, 8..9)).copy_(&solid_image([0, 0, 0], 1));
        let mask = estimator.forward(&image)?;

        assert_abs_diff_eq!(f64::from(mask.max()), 0.0);
        Ok(())
    }

    #[test]
    fn hsv_of_pure_colors() -> Result<()> {
        let rgb = Tensor::of_slice(&[1.0f32, 0.0, 0.0]).view([3, 1, 1]);
        let hsv: Vec<f32> = Vec::from(&rgb_to_hsv(&rgb)?.view([-1]));
        assert_abs_diff_eq!(hsv[0], 0.0, epsilon = 1e-4);
        assert_abs_diff_eq!(hsv[1], 1.0, epsilon = 1e-4);
        assert_abs_diff_eq!(hsv[2], 1.0, epsilon = 1e-4);

        let rgb = Tensor::of_slice(&[0.0f32, 0.0, 1.0]).view([3, 1, 1]);
        let hsv: Vec<f32> = Vec::from(&rgb_to_hsv(&rgb)?.view([-1]));
        assert_abs_diff_eq!(hsv[0], 4.0 / 6.0, epsilon = 1e-4);
        Ok(())
    }
}
