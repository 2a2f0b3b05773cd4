//! 节点维可切片的 LayerNorm

use tch::{nn, Tensor};

/// 按 (C, N, T) 整体归一化的 LayerNorm
///
/// 仿射参数的形状是 (C, N, T)，前向时按节点子集 `idx` 取对应的切片。
#[derive(Debug)]
pub struct LayerNorm {
    affine: Option<(Tensor, Tensor)>,
    eps: f64,
}

impl LayerNorm {
    pub const EPS: f64 = 1e-5;

    pub fn new(vs: &nn::Path, normalized_shape: [i64; 3], elementwise_affine: bool) -> Self {
        let affine = elementwise_affine.then(|| {
            (vs.ones("weight", &normalized_shape), vs.zeros("bias", &normalized_shape))
        });
        Self { affine, eps: Self::EPS }
    }

    pub fn forward(&self, xs: &Tensor, idx: &Tensor) -> Tensor {
        let size = xs.size();
        let shape = &size[1..];
        match &self.affine {
            Some((weight, bias)) => xs.layer_norm(
                shape,
                Some(weight.index_select(1, idx)),
                Some(bias.index_select(1, idx)),
                self.eps,
                true,
            ),
            None => xs.layer_norm(shape, None::<Tensor>, None::<Tensor>, self.eps, true),
        }
    }
}
