//! 图结构学习
//!
//! 从节点嵌入（或外部给定的静态特征）生成稀疏的有向邻接矩阵:
//!
//! ```text
//! v1 = tanh(alpha * lin1(e1[idx]))
//! v2 = tanh(alpha * lin2(e2[idx]))
//! A  = relu(tanh(alpha * (v1 v2^T - v2 v1^T)))
//! ```
//!
//! 然后每行只保留 top-k 个元素。

use tch::{nn, nn::Module, Tensor};

/// 节点向量来源
#[derive(Debug)]
enum NodeSource {
    Embedding { emb1: nn::Embedding, emb2: nn::Embedding },
    Static(Tensor),
}

#[derive(Debug)]
pub struct GraphConstructor {
    source: NodeSource,
    lin1: nn::Linear,
    lin2: nn::Linear,
    k: i64,
    alpha: f64,
}

impl GraphConstructor {
    /// `static_feat` 为 `None` 时学习 `nodes x dim` 的嵌入；否则两组向量都取自
    /// 该特征矩阵（形状 `nodes x xd`）。
    pub fn new(
        vs: &nn::Path,
        nodes: i64,
        k: i64,
        dim: i64,
        alpha: f64,
        static_feat: Option<Tensor>,
    ) -> Self {
        let (source, input_dim) = match static_feat {
            Some(feat) => {
                let xd = feat.size()[1];
                (NodeSource::Static(feat), xd)
            }
            None => {
                let emb1 = nn::embedding(vs / "emb1", nodes, dim, Default::default());
                let emb2 = nn::embedding(vs / "emb2", nodes, dim, Default::default());
                (NodeSource::Embedding { emb1, emb2 }, dim)
            }
        };

        Self {
            source,
            lin1: nn::linear(vs / "lin1", input_dim, dim, Default::default()),
            lin2: nn::linear(vs / "lin2", input_dim, dim, Default::default()),
            k,
            alpha,
        }
    }

    /// 稀疏邻接矩阵（每行 top-k）
    pub fn forward(&self, idx: &Tensor) -> Tensor {
        let adj = self.full_adj(idx);
        let n = adj.size()[0];
        let k = self.k.min(n);

        // 加少量噪声打破并列
        let noisy = &adj + adj.rand_like() * 0.01;
        let (_, top) = noisy.topk(k, 1, true, true);
        let mask = adj.zeros_like().scatter_value(1, &top, 1.0);

        adj * mask
    }

    /// 未稀疏化的邻接矩阵
    pub fn full_adj(&self, idx: &Tensor) -> Tensor {
        let (v1, v2) = match &self.source {
            NodeSource::Embedding { emb1, emb2 } => (emb1.forward(idx), emb2.forward(idx)),
            NodeSource::Static(feat) => {
                let v = feat.index_select(0, idx);
                (v.shallow_clone(), v)
            }
        };

        let v1 = (v1.apply(&self.lin1) * self.alpha).tanh();
        let v2 = (v2.apply(&self.lin2) * self.alpha).tanh();

        let a = v1.matmul(&v2.transpose(1, 0)) - v2.matmul(&v1.transpose(1, 0));
        (a * self.alpha).tanh().relu()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    fn arange(n: i64) -> Tensor {
        Tensor::arange(n, (Kind::Int64, Device::Cpu))
    }

    #[test]
    fn test_sparse_adjacency_keeps_top_k() {
        let vs = nn::VarStore::new(Device::Cpu);
        let gc = GraphConstructor::new(&vs.root(), 10, 3, 8, 3.0, None);
        let adj = tch::no_grad(|| gc.forward(&arange(10)));

        assert_eq!(adj.size(), vec![10, 10]);
        assert!(adj.min().double_value(&[]) >= 0.0);

        let nonzero = adj.gt(0.0).sum_dim_intlist([1].as_slice(), false, Kind::Int64);
        for i in 0..10 {
            assert!(nonzero.int64_value(&[i]) <= 3);
        }
    }

    #[test]
    fn test_full_adjacency_is_antisymmetric_before_relu() {
        // relu(tanh(a)) 与 relu(tanh(-a)) 不会同时为正
        let vs = nn::VarStore::new(Device::Cpu);
        let gc = GraphConstructor::new(&vs.root(), 6, 6, 4, 3.0, None);
        let adj = tch::no_grad(|| gc.full_adj(&arange(6)));
        let both = adj.gt(0.0).logical_and(&adj.transpose(1, 0).gt(0.0)).sum(Kind::Int64);
        assert_eq!(both.int64_value(&[]), 0);
    }

    #[test]
    fn test_static_features_and_subset() {
        let vs = nn::VarStore::new(Device::Cpu);
        let feat = Tensor::randn([8, 5], (Kind::Float, Device::Cpu));
        let gc = GraphConstructor::new(&vs.root(), 8, 20, 4, 3.0, Some(feat));

        let idx = Tensor::from_slice(&[0i64, 2, 4]);
        let adj = tch::no_grad(|| gc.forward(&idx));
        assert_eq!(adj.size(), vec![3, 3]);
    }
}
