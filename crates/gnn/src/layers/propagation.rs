//! 图传播层（mix-propagation）
//!
//! 在邻接矩阵上做多跳扩散，每一跳都混入输入本身（teleport 项，
//! 系数为 `alpha`），最后用 1x1 卷积投影到输出通道。

use tch::{nn, nn::Module, Kind, Tensor};

/// 静态图乘积: x (n,c,w,l), adj (v,w) -> (n,c,v,l)
pub fn nconv(x: &Tensor, adj: &Tensor) -> Tensor {
    adj.matmul(x).contiguous()
}

/// 动态图乘积: x (n,c,v,l), adj (n,v,w,l) -> (n,c,w,l)
pub fn dy_nconv(x: &Tensor, adj: &Tensor) -> Tensor {
    x.permute([0, 3, 1, 2])
        .matmul(&adj.permute([0, 3, 1, 2]))
        .permute([0, 2, 3, 1])
        .contiguous()
}

/// 加自环后按行归一化
fn normalize_adjacency(adj: &Tensor) -> Tensor {
    let n = adj.size()[0];
    let adj = adj + Tensor::eye(n, (adj.kind(), adj.device()));
    let degree = adj.sum_dim_intlist([1].as_slice(), false, Kind::Float);
    &adj / degree.view([-1, 1])
}

/// 通道投影（1x1 卷积）
#[derive(Debug)]
pub struct Linear {
    mlp: nn::Conv2D,
}

impl Linear {
    pub fn new(vs: &nn::Path, c_in: i64, c_out: i64, bias: bool) -> Self {
        let mlp = nn::conv(
            vs,
            c_in,
            c_out,
            [1, 1],
            nn::ConvConfigND::<[i64; 2]> { bias, ..Default::default() },
        );
        Self { mlp }
    }
}

impl Module for Linear {
    fn forward(&self, xs: &Tensor) -> Tensor {
        xs.apply(&self.mlp)
    }
}

/// 单输出传播：只保留最后一跳
#[derive(Debug)]
pub struct Propagation {
    mlp: Linear,
    gdep: i64,
    alpha: f64,
}

impl Propagation {
    pub fn new(vs: &nn::Path, c_in: i64, c_out: i64, gdep: i64, alpha: f64) -> Self {
        Self {
            mlp: Linear::new(&(vs / "mlp"), c_in, c_out, true),
            gdep,
            alpha,
        }
    }

    pub fn forward(&self, x: &Tensor, adj: &Tensor) -> Tensor {
        let a = normalize_adjacency(adj);
        let mut h = x.shallow_clone();
        for _ in 0..self.gdep {
            h = x * self.alpha + nconv(&h, &a) * (1.0 - self.alpha);
        }
        h.apply(&self.mlp)
    }
}

/// 混合传播：所有跳拼接后投影
#[derive(Debug)]
pub struct MixPropagation {
    mlp: Linear,
    gdep: i64,
    alpha: f64,
}

impl MixPropagation {
    pub fn new(vs: &nn::Path, c_in: i64, c_out: i64, gdep: i64, alpha: f64) -> Self {
        Self {
            mlp: Linear::new(&(vs / "mlp"), (gdep + 1) * c_in, c_out, true),
            gdep,
            alpha,
        }
    }

    pub fn forward(&self, x: &Tensor, adj: &Tensor) -> Tensor {
        let a = normalize_adjacency(adj);
        let hops = diffuse(x, self.gdep, self.alpha, |h| nconv(h, &a));
        Tensor::cat(&hops, 1).apply(&self.mlp)
    }
}

/// 依据输入自身生成邻接矩阵的双向混合传播
#[derive(Debug)]
pub struct DyMixPropagation {
    lin1: Linear,
    lin2: Linear,
    mlp1: Linear,
    mlp2: Linear,
    gdep: i64,
    alpha: f64,
}

impl DyMixPropagation {
    pub fn new(vs: &nn::Path, c_in: i64, c_out: i64, gdep: i64, alpha: f64) -> Self {
        Self {
            lin1: Linear::new(&(vs / "lin1"), c_in, c_in, true),
            lin2: Linear::new(&(vs / "lin2"), c_in, c_in, true),
            mlp1: Linear::new(&(vs / "mlp1"), (gdep + 1) * c_in, c_out, true),
            mlp2: Linear::new(&(vs / "mlp2"), (gdep + 1) * c_in, c_out, true),
            gdep,
            alpha,
        }
    }

    pub fn forward(&self, x: &Tensor) -> Tensor {
        let x1 = x.apply(&self.lin1).tanh();
        let x2 = x.apply(&self.lin2).tanh();

        // (n, v, w, l)
        let adj = dy_nconv(&x1.transpose(2, 1), &x2);
        let adj0 = adj.softmax(2, Kind::Float);
        let adj1 = adj.transpose(2, 1).softmax(2, Kind::Float);

        let forward_hops = diffuse(x, self.gdep, self.alpha, |h| dy_nconv(h, &adj0));
        let backward_hops = diffuse(x, self.gdep, self.alpha, |h| dy_nconv(h, &adj1));

        Tensor::cat(&forward_hops, 1).apply(&self.mlp1)
            + Tensor::cat(&backward_hops, 1).apply(&self.mlp2)
    }
}

/// h_{k+1} = alpha * x + (1 - alpha) * step(h_k)，返回 [h_0, ..., h_gdep]
fn diffuse<F>(x: &Tensor, gdep: i64, alpha: f64, step: F) -> Vec<Tensor>
where
    F: Fn(&Tensor) -> Tensor,
{
    let mut h = x.shallow_clone();
    let mut hops = vec![h.shallow_clone()];
    for _ in 0..gdep {
        h = x * alpha + step(&h) * (1.0 - alpha);
        hops.push(h.shallow_clone());
    }
    hops
}
