use super::{Activation, ConvBn2D, ConvBn2DInit};
use crate::common::*;

/// Maps a texture to a view image of the same spatial size.
///
/// A plain stack of stride-1 convolutions. It has no notion of geometry and
/// only learns what a texture looks like from the training viewpoints.
#[derive(Debug)]
pub struct Renderer {
    layers: Vec<ConvBn2D>,
}

#[derive(Debug, Clone)]
pub struct RendererInit {
    pub in_c: usize,
    pub out_c: usize,
    pub base_c: usize,
}

impl Default for RendererInit {
    fn default() -> Self {
        Self {
            in_c: 3,
            out_c: 3,
            base_c: 64,
        }
    }
}

impl RendererInit {
    pub fn build<'p, P>(self, path: P) -> Renderer
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self { in_c, out_c, base_c } = self;

        let specs = [
            (in_c, base_c, 7, Activation::Relu),
            (base_c, base_c, 5, Activation::Relu),
            (base_c, base_c * 2, 3, Activation::Relu),
            (base_c * 2, base_c * 2, 3, Activation::Relu),
            (base_c * 2, base_c, 3, Activation::Relu),
            (base_c, out_c, 3, Activation::Tanh),
        ];
        let layers = specs
            .into_iter()
            .enumerate()
            .map(|(index, (in_c, out_c, k, activation))| {
                ConvBn2DInit {
                    activation,
                    ..ConvBn2DInit::new(in_c, out_c, k)
                }
                .build(path / format!("conv{}", index))
            })
            .collect();

        Renderer { layers }
    }
}

impl nn::ModuleT for Renderer {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        self.layers
            .iter()
            .fold(xs.shallow_clone(), |xs, layer| layer.forward_t(&xs, train))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renderer_keeps_spatial_size_and_range() {
        let vs = nn::VarStore::new(Device::Cpu);
        let renderer = RendererInit {
            base_c: 8,
            ..Default::default()
        }
        .build(vs.root());

        let input = Tensor::rand(&[1, 3, 20, 28], FLOAT_CPU);
        let output = renderer.forward_t(&input, true);

        assert_eq!(output.size(), vec![1, 3, 20, 28]);
        assert!(f64::from(output.abs().max()) <= 1.0);
    }
}
