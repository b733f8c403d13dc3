//! Image decoding and normalization helpers.
//!
//! Images travel through the models as float tensors of shape `[3, H, W]`
//! with values in `[-1, 1]`.

use crate::common::*;

/// Load an RGB image and resize it to a square of `image_size` pixels.
///
/// The returned tensor has shape `[3, image_size, image_size]` and kind `Uint8`.
pub fn load_rgb(path: impl AsRef<Path>, image_size: usize) -> Result<Tensor> {
    let path = path.as_ref();
    let image_size = image_size as i64;

    tch::no_grad(|| -> Result<_> {
        let image = vision::image::load(path)
            .with_context(|| format!("failed to load image '{}'", path.display()))?;
        let (channels, height, width) = image.size3()?;
        ensure!(
            channels == 3,
            "expect 3 channels, but get {} channels in '{}'",
            channels,
            path.display()
        );

        let image = if (height, width) == (image_size, image_size) {
            image
        } else {
            vision::image::resize(&image, image_size, image_size)?
        };
        Ok(image)
    })
}

/// Convert an `Uint8` image into a float tensor within `[-1, 1]`.
pub fn normalize(image: &Tensor) -> Tensor {
    tch::no_grad(|| (image.to_kind(Kind::Float) / 127.5 - 1.0).set_requires_grad(false))
}

/// Convert a float tensor within `[-1, 1]` back to an `Uint8` image.
pub fn denormalize(image: &Tensor) -> Tensor {
    tch::no_grad(|| {
        ((image.detach().to_device(Device::Cpu) + 1.0) * 127.5)
            .clamp(0.0, 255.0)
            .to_kind(Kind::Uint8)
    })
}

/// Load an image as a normalized float tensor `[3, image_size, image_size]`.
pub fn load_normalized(path: impl AsRef<Path>, image_size: usize) -> Result<Tensor> {
    let image = load_rgb(path, image_size)?;
    Ok(normalize(&image))
}

/// Save a normalized float tensor `[3, H, W]` as an image file.
pub fn save_normalized(image: &Tensor, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let image = denormalize(image);
    vision::image::save(&image, path)
        .with_context(|| format!("failed to save image '{}'", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_round_trip_keeps_extremes() {
        let image = Tensor::of_slice(&[0u8, 255, 128]).view([3, 1, 1]);
        let normalized = normalize(&image);
        let values: Vec<f32> = Vec::from(&normalized.view([-1]));
        assert_abs_diff_eq!(values[0], -1.0, epsilon = 1e-6);
        assert_abs_diff_eq!(values[1], 1.0, epsilon = 1e-6);

        let restored: Vec<u8> = Vec::from(&denormalize(&normalized).view([-1]));
        assert_eq!(restored[0], 0);
        assert_eq!(restored[1], 255);
    }
}
