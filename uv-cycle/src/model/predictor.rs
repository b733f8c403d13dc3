use super::{Activation, ConvBn2D, ConvBn2DInit, DeconvBn2D, DeconvBn2DInit};
use crate::common::*;

/// Maps a view image to a texture of the same spatial size.
///
/// It is an encoder-decoder with four stride-2 stages each way. Every decoder
/// stage but the last concatenates the matching encoder activation.
#[derive(Debug)]
pub struct TexturePredictor {
    enc1: ConvBn2D,
    enc2: ConvBn2D,
    enc3: ConvBn2D,
    enc4: ConvBn2D,
    dec1: DeconvBn2D,
    dec2: DeconvBn2D,
    dec3: DeconvBn2D,
    dec4: DeconvBn2D,
}

#[derive(Debug, Clone)]
pub struct TexturePredictorInit {
    pub in_c: usize,
    pub out_c: usize,
    pub base_c: usize,
}

impl Default for TexturePredictorInit {
    fn default() -> Self {
        Self {
            in_c: 3,
            out_c: 3,
            base_c: 64,
        }
    }
}

impl TexturePredictorInit {
    pub fn build<'p, P>(self, path: P) -> TexturePredictor
    where
        P: Borrow<nn::Path<'p>>,
    {
        let path = path.borrow();
        let Self { in_c, out_c, base_c } = self;
        let [c1, c2, c3, c4] = [base_c, base_c * 2, base_c * 4, base_c * 8];

        let down = |in_c, out_c, batch_norm| ConvBn2DInit {
            s: 2,
            p: 1,
            batch_norm,
            ..ConvBn2DInit::new(in_c, out_c, 4)
        };
        let up = |in_c, out_c, batch_norm, activation| DeconvBn2DInit {
            s: 2,
            p: 1,
            batch_norm,
            activation,
            ..DeconvBn2DInit::new(in_c, out_c, 4)
        };

        TexturePredictor {
            enc1: down(in_c, c1, false).build(path / "enc1"),
            enc2: down(c1, c2, true).build(path / "enc2"),
            enc3: down(c2, c3, true).build(path / "enc3"),
            enc4: down(c3, c4, true).build(path / "enc4"),
            dec1: up(c4, c3, true, Activation::Relu).build(path / "dec1"),
            dec2: up(c3 * 2, c2, true, Activation::Relu).build(path / "dec2"),
            dec3: up(c2 * 2, c1, true, Activation::Relu).build(path / "dec3"),
            dec4: up(c1 * 2, out_c, false, Activation::Tanh).build(path / "dec4"),
        }
    }
}

impl nn::ModuleT for TexturePredictor {
    fn forward_t(&self, xs: &Tensor, train: bool) -> Tensor {
        let e1 = self.enc1.forward_t(xs, train);
        let e2 = self.enc2.forward_t(&e1, train);
        let e3 = self.enc3.forward_t(&e2, train);
        let e4 = self.enc4.forward_t(&e3, train);

        let d1 = Tensor::cat(&[self.dec1.forward_t(&e4, train), e3], 1);
        let d2 = Tensor::cat(&[self.dec2.forward_t(&d1, train), e2], 1);
        let d3 = Tensor::cat(&[self.dec3.forward_t(&d2, train), e1], 1);
        self.dec4.forward_t(&d3, train)
    }
}
