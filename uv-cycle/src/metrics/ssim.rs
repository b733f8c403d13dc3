use crate::common::*;

const K1: f64 = 0.01;
const K2: f64 = 0.03;

#[derive(Debug, Clone)]
pub struct SsimInit {
    pub window_size: usize,
    pub sigma: f64,
    /// The value range of the inputs, 2.0 for images in `[-1, 1]`.
    pub data_range: f64,
}

impl Default for SsimInit {
    fn default() -> Self {
        Self {
            window_size: 11,
            sigma: 1.5,
            data_range: 2.0,
        }
    }
}

impl SsimInit {
    pub fn build(self) -> Result<Ssim> {
        let Self {
            window_size,
            sigma,
            data_range,
        } = self;

        ensure!(
            window_size % 2 == 1,
            "window_size must be odd, but get {}",
            window_size
        );
        ensure!(sigma > 0.0, "sigma must be positive");
        ensure!(data_range > 0.0, "data_range must be positive");

        let center = (window_size / 2) as f64;
        let weights: Vec<f32> = {
            let raw: Vec<f64> = (0..window_size)
                .map(|index| {
                    let dist = index as f64 - center;
                    (-(dist * dist) / (2.0 * sigma * sigma)).exp()
                })
                .collect();
            let sum: f64 = raw.iter().sum();
            raw.into_iter().map(|val| (val / sum) as f32).collect()
        };

        Ok(Ssim {
            window_size: window_size as i64,
            window: Tensor::of_slice(&weights),
            c1: (K1 * data_range).powi(2),
            c2: (K2 * data_range).powi(2),
        })
    }
}

/// Structural similarity with a separable Gaussian window.
///
/// The window is applied without padding, so both image sides must be at
/// least the window size.
#[derive(Debug)]
pub struct Ssim {
    window_size: i64,
    window: Tensor,
    c1: f64,
    c2: f64,
}

impl Ssim {
    /// Mean SSIM over the batch, channels and valid window positions.
    ///
    /// Inputs are `[B, C, H, W]` of the same shape.
    pub fn forward(&self, lhs: &Tensor, rhs: &Tensor) -> Result<f64> {
        ensure!(
            lhs.size() == rhs.size(),
            "shape mismatch {:?} vs {:?}",
            lhs.size(),
            rhs.size()
        );
        let (_b, _c, h, w) = lhs.size4()?;
        ensure!(
            h >= self.window_size && w >= self.window_size,
            "image size {}x{} is smaller than the SSIM window {}",
            h,
            w,
            self.window_size
        );

        let lhs = lhs.to_kind(Kind::Float);
        let rhs = rhs.to_kind(Kind::Float);

        let mu1 = self.gaussian_filter(&lhs);
        let mu2 = self.gaussian_filter(&rhs);
        let mu1_sq = &mu1 * &mu1;
        let mu2_sq = &mu2 * &mu2;
        let mu1_mu2 = &mu1 * &mu2;

        let sigma1_sq = self.gaussian_filter(&(&lhs * &lhs)) - &mu1_sq;
        let sigma2_sq = self.gaussian_filter(&(&rhs * &rhs)) - &mu2_sq;
        let sigma12 = self.gaussian_filter(&(&lhs * &rhs)) - &mu1_mu2;

        let cs_map = (sigma12 * 2.0 + self.c2) / (sigma1_sq + sigma2_sq + self.c2);
        let ssim_map = (mu1_mu2 * 2.0 + self.c1) / (mu1_sq + mu2_sq + self.c1) * cs_map;

        Ok(f64::from(ssim_map.mean(Kind::Float)))
    }

    fn gaussian_filter(&self, input: &Tensor) -> Tensor {
        let channels = input.size()[1];
        let window = self.window.to_device(input.device());
        let horizontal = window
            .view([1, 1, 1, self.window_size])
            .repeat(&[channels, 1, 1, 1]);
        let vertical = window
            .view([1, 1, self.window_size, 1])
            .repeat(&[channels, 1, 1, 1]);

        input
            .conv2d(&horizontal, None::<Tensor>, &[1, 1], &[0, 0], &[1, 1], channels)
            .conv2d(&vertical, None::<Tensor>, &[1, 1], &[0, 0], &[1, 1], channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_images_score_one() {
        let ssim = SsimInit::default().build().unwrap();
        let image = Tensor::rand(&[2, 3, 32, 32], FLOAT_CPU) * 2.0 - 1.0;
        let score = ssim.forward(&image, &image).unwrap();
        assert_abs_diff_eq!(score, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn noise_lowers_score() {
        tch::manual_seed(5);
        let ssim = SsimInit::default().build().unwrap();
        let image = Tensor::rand(&[1, 3, 32, 32], FLOAT_CPU) * 2.0 - 1.0;
        let noisy = (&image + Tensor::randn(&[1, 3, 32, 32], FLOAT_CPU) * 0.5).clamp(-1.0, 1.0);
        let score = ssim.forward(&image, &noisy).unwrap();
        assert!(score < 0.9);
        assert!(score > -1.0);
    }

    #[test]
    fn small_image_is_rejected() {
        let ssim = SsimInit::default().build().unwrap();
        let image = Tensor::zeros(&[1, 3, 8, 8], FLOAT_CPU);
        assert!(ssim.forward(&image, &image).is_err());
    }
}
