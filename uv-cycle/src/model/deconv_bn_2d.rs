use super::{Activation, ActivationExt as _};
use crate::common::*;

#[derive(Debug, Clone)]
pub struct DeconvBn2DInit {
    pub in_c: usize,
    pub out_c: usize,
    pub k: usize,
    pub s: usize,
    pub p: usize,
    pub op: usize,
    pub activation: Activation,
    pub batch_norm: bool,
}

impl DeconvBn2DInit {
    pub fn new(in_c: usize, out_c: usize, k: usize) -> Self {
        Self {
            in_c,
            out_c,
            k,
            s: 1,
            p: k / 2,
            op: 0,
            activation: Activation::Relu,
            batch_norm: false,
        }
    }

    pub fn build<'p, P>(self, path: P) -> DeconvBn2D
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();

        let Self {
            in_c,
            out_c,
            k,
            s,
            p,
            op,
            activation,
            batch_norm,
        } = self;

        let deconv = nn::conv_transpose2d(
            path / "deconv",
            in_c as i64,
            out_c as i64,
            k as i64,
            nn::ConvTransposeConfig {
                stride: s as i64,
                padding: p as i64,
                output_padding: op as i64,
                ..Default::default()
            },
        );
        let bn = batch_norm.then(|| nn::batch_norm2d(path / "bn", out_c as i64, Default::default()));

        DeconvBn2D {
            deconv,
            bn,
            activation,
        }
    }
}

/// Transposed convolution followed by optional batch normalization and an activation.
#[derive(Debug)]
pub struct DeconvBn2D {
    deconv: nn::ConvTranspose2D,
    bn: Option<nn::BatchNorm>,
    activation: Activation,
}

impl nn::ModuleT for DeconvBn2D {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let Self {
            ref deconv,
            ref bn,
            activation,
        } = *self;

        let xs = xs.apply(deconv);
        let xs = match bn {
            Some(bn) => xs.apply_t(bn, train),
            None => xs,
        };
        xs.activation(activation)
    }
}
