use crate::common::*;

/// A learned perceptual distance between two image batches.
///
/// Implementations that cannot compute the distance report NaN so that the
/// evaluation keeps running.
pub trait PerceptualMetric {
    fn is_available(&self) -> bool;

    /// Mean distance over the batch. Inputs are `[B, 3, H, W]` in `[-1, 1]`.
    fn distance(&self, lhs: &Tensor, rhs: &Tensor) -> Result<f64>;
}

/// The placeholder used when no perceptual network is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailablePerceptualMetric;

impl PerceptualMetric for UnavailablePerceptualMetric {
    fn is_available(&self) -> bool {
        false
    }

    fn distance(&self, _lhs: &Tensor, _rhs: &Tensor) -> Result<f64> {
        Ok(f64::NAN)
    }
}

/// An LPIPS network exported to TorchScript.
///
/// The module takes two image batches and returns one distance per sample.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct TorchScriptPerceptualMetric {
    #[derivative(Debug = "ignore")]
    module: tch::CModule,
    device: Device,
}

impl TorchScriptPerceptualMetric {
    pub fn load(path: impl AsRef<Path>, device: Device) -> Result<Self> {
        let path = path.as_ref();
        let module = tch::CModule::load_on_device(path, device).with_context(|| {
            format!(
                "unable to load perceptual network '{}'",
                path.display()
            )
        })?;
        Ok(Self { module, device })
    }
}

impl PerceptualMetric for TorchScriptPerceptualMetric {
    fn is_available(&self) -> bool {
        true
    }

    fn distance(&self, lhs: &Tensor, rhs: &Tensor) -> Result<f64> {
        let lhs = lhs.to_device(self.device).to_kind(Kind::Float);
        let rhs = rhs.to_device(self.device).to_kind(Kind::Float);
        let output = tch::no_grad(|| self.module.forward_ts(&[lhs, rhs]))?;
        Ok(f64::from(output.mean(Kind::Float)))
    }
}

/// Load the perceptual network if a path is given, or fall back to the
/// unavailable placeholder with a warning.
pub fn load_perceptual_metric(
    path: Option<&Path>,
    device: Device,
) -> Box<dyn PerceptualMetric + Send> {
    match path {
        Some(path) => match TorchScriptPerceptualMetric::load(path, device) {
            Ok(metric) => Box::new(metric),
            Err(err) => {
                warn!("perceptual metric disabled: {:#}", err);
                Box::new(UnavailablePerceptualMetric)
            }
        },
        None => {
            info!("no perceptual network configured, lpips_view is reported as NaN");
            Box::new(UnavailablePerceptualMetric)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_metric_reports_nan() {
        let metric = UnavailablePerceptualMetric;
        let image = Tensor::zeros(&[1, 3, 16, 16], FLOAT_CPU);
        assert!(!metric.is_available());
        assert!(metric.distance(&image, &image).unwrap().is_nan());
    }

    #[test]
    fn missing_network_falls_back_to_unavailable() {
        let metric = load_perceptual_metric(Some(Path::new("/nonexistent/lpips.pt")), Device::Cpu);
        assert!(!metric.is_available());
    }
}
