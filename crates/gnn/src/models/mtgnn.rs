//! MTGNN：图结构学习 + 膨胀时间卷积 + 混合传播
//!
//! 输入形状 (batch, in_dim, N, seq_length)，输出 (batch, out_dim, N, 1)。

use crate::layers::{
    Dilated1D, DilatedInception, DyMixPropagation, GraphConstructor, LayerNorm, MixPropagation,
    Propagation, MAX_KERNEL,
};
use crate::models::ForecastModel;
use crate::preprocessing::Normalizer;
use crate::timeseries::WindowDataset;
use crate::training::{Trainer, TrainingConfig};
use crate::types::{array_to_tensor, tensor_to_array, EpochRecord, GnnError, GnnResult};
use ndarray::{Array2, Array3, Array4, Ix3};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tch::{nn, nn::Module, Device, Kind, Tensor};

/// 时间卷积模块
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalModule {
    /// 四分支 inception（卷积核 2/3/6/7）
    Inception,
    /// 单个宽度 7 的卷积核
    Dilated1D,
}

/// 图传播方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationKind {
    Mix,
    Plain,
    Dynamic,
}

/// MTGNN 配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MtgnnConfig {
    pub gcn_true: bool,
    pub build_adj: bool,
    pub gcn_depth: i64,
    pub num_nodes: i64,
    pub dropout: f64,
    pub subgraph_size: i64,
    pub node_dim: i64,
    pub dilation_exponential: i64,
    pub conv_channels: i64,
    pub residual_channels: i64,
    pub skip_channels: i64,
    pub end_channels: i64,
    pub seq_length: i64,
    pub in_dim: i64,
    pub out_dim: i64,
    pub layers: i64,
    pub propalpha: f64,
    pub tanhalpha: f64,
    pub layer_norm_affine: bool,
    pub temporal: TemporalModule,
    pub propagation: PropagationKind,
    /// 是否带预定义邻接矩阵（由模型构造时填写）
    #[serde(default)]
    pub has_predefined_adj: bool,
    /// 静态节点特征的维度（由模型构造时填写）
    #[serde(default)]
    pub static_feat_dim: Option<i64>,
}

impl Default for MtgnnConfig {
    fn default() -> Self {
        Self {
            gcn_true: true,
            build_adj: true,
            gcn_depth: 2,
            num_nodes: 1,
            dropout: 0.3,
            subgraph_size: 20,
            node_dim: 40,
            dilation_exponential: 1,
            conv_channels: 32,
            residual_channels: 32,
            skip_channels: 64,
            end_channels: 128,
            seq_length: 12,
            in_dim: 2,
            out_dim: 12,
            layers: 3,
            propalpha: 0.05,
            tanhalpha: 3.0,
            layer_norm_affine: true,
            temporal: TemporalModule::Inception,
            propagation: PropagationKind::Mix,
            has_predefined_adj: false,
            static_feat_dim: None,
        }
    }
}

impl MtgnnConfig {
    pub fn new(num_nodes: i64, seq_length: i64, horizon: i64) -> Self {
        Self { num_nodes, seq_length, out_dim: horizon, ..Default::default() }
    }

    /// 前 j 层的感受野
    pub fn layer_receptive_field(&self, j: i64) -> i64 {
        let e = self.dilation_exponential;
        if e > 1 {
            1 + (MAX_KERNEL - 1) * (e.pow(j as u32) - 1) / (e - 1)
        } else {
            1 + j * (MAX_KERNEL - 1)
        }
    }

    /// 整个网络的感受野
    pub fn receptive_field(&self) -> i64 {
        self.layer_receptive_field(self.layers)
    }

    /// 输入补齐后的时间长度
    pub fn padded_length(&self) -> i64 {
        self.seq_length.max(self.receptive_field())
    }

    /// 第 j 层输出的时间长度
    pub fn layer_output_length(&self, j: i64) -> i64 {
        self.padded_length() - self.layer_receptive_field(j) + 1
    }

    pub fn validate(&self) -> GnnResult<()> {
        let positive = [
            ("num_nodes", self.num_nodes),
            ("layers", self.layers),
            ("seq_length", self.seq_length),
            ("in_dim", self.in_dim),
            ("out_dim", self.out_dim),
            ("conv_channels", self.conv_channels),
            ("residual_channels", self.residual_channels),
            ("skip_channels", self.skip_channels),
            ("end_channels", self.end_channels),
            ("subgraph_size", self.subgraph_size),
            ("node_dim", self.node_dim),
            ("dilation_exponential", self.dilation_exponential),
        ];
        if let Some((name, value)) = positive.iter().find(|(_, v)| *v <= 0) {
            return Err(GnnError::InvalidConfig(format!("{} 必须大于 0, 实际 {}", name, value)));
        }
        if self.gcn_depth < 0 {
            return Err(GnnError::InvalidConfig("gcn_depth 不能为负".to_string()));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(GnnError::InvalidConfig(format!("dropout 必须在 [0, 1) 内, 实际 {}", self.dropout)));
        }
        if self.gcn_true && !self.build_adj && !self.has_predefined_adj {
            return Err(GnnError::InvalidConfig("build_adj 为 false 时需要预定义邻接矩阵".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug)]
enum TemporalConv {
    Inception(DilatedInception),
    Dilated1D(Dilated1D),
}

impl TemporalConv {
    fn new(vs: &nn::Path, config: &MtgnnConfig, dilation: i64) -> GnnResult<Self> {
        let (c_in, c_out) = (config.residual_channels, config.conv_channels);
        Ok(match config.temporal {
            TemporalModule::Inception => Self::Inception(DilatedInception::new(vs, c_in, c_out, dilation)?),
            TemporalModule::Dilated1D => Self::Dilated1D(Dilated1D::new(vs, c_in, c_out, dilation)),
        })
    }
}

impl Module for TemporalConv {
    fn forward(&self, xs: &Tensor) -> Tensor {
        match self {
            Self::Inception(conv) => conv.forward(xs),
            Self::Dilated1D(conv) => conv.forward(xs),
        }
    }
}

/// 每层时间卷积之后的空间步骤
#[derive(Debug)]
enum GraphStep {
    Mix(MixPropagation, MixPropagation),
    Plain(Propagation, Propagation),
    Dynamic(DyMixPropagation),
    Residual(nn::Conv2D),
}

impl GraphStep {
    fn new(vs: &nn::Path, config: &MtgnnConfig) -> Self {
        let (c_in, c_out) = (config.conv_channels, config.residual_channels);
        let (gdep, alpha) = (config.gcn_depth, config.propalpha);

        if !config.gcn_true {
            return Self::Residual(nn::conv(vs / "residual", c_in, c_out, [1, 1], Default::default()));
        }

        match config.propagation {
            PropagationKind::Mix => Self::Mix(
                MixPropagation::new(&(vs / "gconv1"), c_in, c_out, gdep, alpha),
                MixPropagation::new(&(vs / "gconv2"), c_in, c_out, gdep, alpha),
            ),
            PropagationKind::Plain => Self::Plain(
                Propagation::new(&(vs / "gconv1"), c_in, c_out, gdep, alpha),
                Propagation::new(&(vs / "gconv2"), c_in, c_out, gdep, alpha),
            ),
            PropagationKind::Dynamic => Self::Dynamic(DyMixPropagation::new(&(vs / "gconv"), c_in, c_out, gdep, alpha)),
        }
    }

    fn forward(&self, x: &Tensor, adj: Option<&Tensor>) -> GnnResult<Tensor> {
        let adjacency = || adj.ok_or_else(|| GnnError::Prediction("缺少邻接矩阵".to_string()));
        Ok(match self {
            Self::Mix(g1, g2) => {
                let a = adjacency()?;
                g1.forward(x, a) + g2.forward(x, &a.transpose(1, 0))
            }
            Self::Plain(g1, g2) => {
                let a = adjacency()?;
                g1.forward(x, a) + g2.forward(x, &a.transpose(1, 0))
            }
            Self::Dynamic(g) => g.forward(x),
            Self::Residual(conv) => x.apply(conv),
        })
    }
}

#[derive(Debug)]
struct Block {
    filter: TemporalConv,
    gate: TemporalConv,
    skip: nn::Conv2D,
    graph: GraphStep,
    norm: LayerNorm,
}

/// MTGNN 网络
#[derive(Debug)]
struct MtgnnNet {
    graph: Option<GraphConstructor>,
    predefined_adj: Option<Tensor>,
    start_conv: nn::Conv2D,
    skip0: nn::Conv2D,
    blocks: Vec<Block>,
    skip_e: nn::Conv2D,
    end_conv_1: nn::Conv2D,
    end_conv_2: nn::Conv2D,
    idx: Tensor,
    config: MtgnnConfig,
}

impl MtgnnNet {
    fn new(
        vs: &nn::Path,
        config: &MtgnnConfig,
        predefined_adj: Option<Tensor>,
        static_feat: Option<Tensor>,
    ) -> GnnResult<Self> {
        let graph = (config.gcn_true && config.build_adj).then(|| {
            GraphConstructor::new(
                &(vs / "gc"),
                config.num_nodes,
                config.subgraph_size,
                config.node_dim,
                config.tanhalpha,
                static_feat,
            )
        });

        let padded = config.padded_length();
        let start_conv = nn::conv(vs / "start_conv", config.in_dim, config.residual_channels, [1, 1], Default::default());
        let skip0 = nn::conv(vs / "skip0", config.in_dim, config.skip_channels, [1, padded], Default::default());

        let mut blocks = Vec::with_capacity(config.layers as usize);
        let mut dilation = 1;
        for j in 1..=config.layers {
            let p = vs / format!("layer_{}", j);
            let length = config.layer_output_length(j);
            blocks.push(Block {
                filter: TemporalConv::new(&(&p / "filter"), config, dilation)?,
                gate: TemporalConv::new(&(&p / "gate"), config, dilation)?,
                skip: nn::conv(&p / "skip", config.conv_channels, config.skip_channels, [1, length], Default::default()),
                graph: GraphStep::new(&p, config),
                norm: LayerNorm::new(
                    &(&p / "norm"),
                    [config.residual_channels, config.num_nodes, length],
                    config.layer_norm_affine,
                ),
            });
            dilation *= config.dilation_exponential;
        }

        let skip_e = nn::conv(
            vs / "skip_e",
            config.residual_channels,
            config.skip_channels,
            [1, padded - config.receptive_field() + 1],
            Default::default(),
        );
        let end_conv_1 = nn::conv(vs / "end_conv_1", config.skip_channels, config.end_channels, [1, 1], Default::default());
        let end_conv_2 = nn::conv(vs / "end_conv_2", config.end_channels, config.out_dim, [1, 1], Default::default());

        Ok(Self {
            graph,
            predefined_adj,
            start_conv,
            skip0,
            blocks,
            skip_e,
            end_conv_1,
            end_conv_2,
            idx: Tensor::arange(config.num_nodes, (Kind::Int64, vs.device())),
            config: config.clone(),
        })
    }

    /// 当前使用的邻接矩阵
    fn adjacency(&self, idx: &Tensor, full: bool) -> Option<Tensor> {
        if !self.config.gcn_true {
            return None;
        }
        match (&self.graph, &self.predefined_adj) {
            (Some(gc), _) if full => Some(gc.full_adj(idx)),
            (Some(gc), _) => Some(gc.forward(idx)),
            (None, Some(adj)) => Some(adj.index_select(0, idx).index_select(1, idx)),
            (None, None) => None,
        }
    }

    fn forward_t(&self, input: &Tensor, idx: Option<&Tensor>, train: bool) -> GnnResult<Tensor> {
        let size = input.size();
        if size.len() != 4 {
            return Err(GnnError::Prediction(format!("输入必须是 4 维张量, 实际 {:?}", size)));
        }
        if size[1] != self.config.in_dim {
            return Err(GnnError::DimensionMismatch {
                expected: self.config.in_dim as usize,
                actual: size[1] as usize,
            });
        }
        if size[3] != self.config.seq_length {
            return Err(GnnError::DimensionMismatch {
                expected: self.config.seq_length as usize,
                actual: size[3] as usize,
            });
        }

        let idx = idx.unwrap_or(&self.idx);
        let nodes = idx.size()[0];
        if size[2] != nodes {
            return Err(GnnError::DimensionMismatch { expected: nodes as usize, actual: size[2] as usize });
        }

        let receptive_field = self.config.receptive_field();
        let input = if self.config.seq_length < receptive_field {
            // 在时间维左侧补零
            let pad = Tensor::zeros(
                [size[0], size[1], size[2], receptive_field - self.config.seq_length],
                (input.kind(), input.device()),
            );
            Tensor::cat(&[pad, input.shallow_clone()], 3)
        } else {
            input.shallow_clone()
        };

        let adj = self.adjacency(idx, false);
        let dropout = self.config.dropout;

        let mut x = input.apply(&self.start_conv);
        let mut skip = input.dropout(dropout, train).apply(&self.skip0);

        for block in &self.blocks {
            let residual = x.shallow_clone();
            let filter = x.apply(&block.filter).tanh();
            let gate = x.apply(&block.gate).sigmoid();
            x = (filter * gate).dropout(dropout, train);

            skip = x.apply(&block.skip) + skip;

            x = block.graph.forward(&x, adj.as_ref())?;
            let length = x.size()[3];
            let residual_length = residual.size()[3];
            x = x + residual.narrow(3, residual_length - length, length);
            x = block.norm.forward(&x, idx);
        }

        skip = x.apply(&self.skip_e) + skip;
        let x = skip.relu().apply(&self.end_conv_1).relu().apply(&self.end_conv_2);
        Ok(x)
    }
}

/// 给权重路径加 `.config` 后缀
fn config_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".config");
    PathBuf::from(name)
}

/// MTGNN 模型
pub struct MtgnnModel {
    config: MtgnnConfig,
    vs: nn::VarStore,
    net: MtgnnNet,
    device: Device,
}

impl MtgnnModel {
    pub fn new(config: MtgnnConfig) -> GnnResult<Self> {
        Self::with_device(config, Device::cuda_if_available())
    }

    pub fn with_device(config: MtgnnConfig, device: Device) -> GnnResult<Self> {
        Self::build(config, None, None, device)
    }

    /// 使用预定义邻接矩阵（N x N）和/或静态节点特征（N x d）
    pub fn with_graph(
        mut config: MtgnnConfig,
        adj: Option<&Array2<f64>>,
        static_feat: Option<&Array2<f64>>,
        device: Device,
    ) -> GnnResult<Self> {
        let n = config.num_nodes as usize;
        if let Some(adj) = adj {
            for &dim in adj.shape() {
                if dim != n {
                    return Err(GnnError::DimensionMismatch { expected: n, actual: dim });
                }
            }
        }
        if let Some(feat) = static_feat {
            if feat.nrows() != n {
                return Err(GnnError::DimensionMismatch { expected: n, actual: feat.nrows() });
            }
        }

        config.has_predefined_adj = adj.is_some();
        config.static_feat_dim = static_feat.map(|feat| feat.ncols() as i64);

        let adj = adj.map(|a| array_to_tensor(a, device));
        let static_feat = static_feat.map(|f| array_to_tensor(f, device));
        Self::build(config, adj.as_ref(), static_feat.as_ref(), device)
    }

    fn build(
        config: MtgnnConfig,
        adj: Option<&Tensor>,
        static_feat: Option<&Tensor>,
        device: Device,
    ) -> GnnResult<Self> {
        config.validate()?;

        let vs = nn::VarStore::new(device);
        let net = {
            let root = vs.root();
            let n = config.num_nodes;

            // 不参与训练，但随权重一起保存
            let mut predefined = config
                .has_predefined_adj
                .then(|| root.zeros_no_train("predefined_adj", &[n, n]));
            let mut feat = config
                .static_feat_dim
                .map(|d| root.zeros_no_train("static_feat", &[n, d]));

            tch::no_grad(|| {
                if let (Some(var), Some(src)) = (predefined.as_mut(), adj) {
                    var.copy_(src);
                }
                if let (Some(var), Some(src)) = (feat.as_mut(), static_feat) {
                    var.copy_(src);
                }
            });

            MtgnnNet::new(&root, &config, predefined, feat)?
        };

        let parameters: i64 = vs.trainable_variables().iter().map(|t| t.numel() as i64).sum();
        tracing::debug!(
            "MTGNN: {} 个节点, 感受野 {}, 可训练参数 {}",
            config.num_nodes,
            config.receptive_field(),
            parameters
        );

        Ok(Self { config, vs, net, device })
    }

    pub fn config(&self) -> &MtgnnConfig {
        &self.config
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// 张量前向，输入 (batch, in_dim, N, seq_length)；`idx` 为节点子集
    pub fn forward_t(&self, input: &Tensor, idx: Option<&Tensor>, train: bool) -> GnnResult<Tensor> {
        self.net.forward_t(input, idx, train)
    }

    /// (样本数, window, N, F) -> (样本数, F, N, window)
    pub fn input_tensor(&self, x: &Array4<f64>) -> Tensor {
        array_to_tensor(x, self.device).permute([0, 3, 2, 1])
    }

    /// 学到的邻接矩阵；`full` 为真时不做 top-k 稀疏化
    pub fn learned_adjacency(&self, full: bool) -> GnnResult<Array2<f64>> {
        let adj = tch::no_grad(|| self.net.adjacency(&self.net.idx, full))
            .ok_or_else(|| GnnError::Prediction("模型没有使用图卷积".to_string()))?;
        Ok(tensor_to_array(&adj)?.into_dimensionality()?)
    }
}

impl ForecastModel for MtgnnModel {
    fn fit(
        &mut self,
        train: &WindowDataset,
        valid: &WindowDataset,
        normalizer: &Normalizer,
        config: &TrainingConfig,
    ) -> GnnResult<Vec<EpochRecord>> {
        Trainer::new(config.clone()).train(self, train, valid, normalizer)
    }

    fn predict(&self, x: &Array4<f64>) -> GnnResult<Array3<f64>> {
        let input = self.input_tensor(x);
        let output = tch::no_grad(|| self.forward_t(&input, None, false))?;

        // (S, H, N, 1) -> (S, H, N)
        Ok(tensor_to_array(&output.squeeze_dim(3))?.into_dimensionality::<Ix3>()?)
    }

    fn save(&self, path: &Path) -> GnnResult<()> {
        self.vs.save(path)?;
        std::fs::write(config_path(path), serde_json::to_string_pretty(&self.config)?)?;
        tracing::info!("模型已保存: {}", path.display());
        Ok(())
    }

    fn load(path: &Path) -> GnnResult<Self> {
        let config_json = std::fs::read_to_string(config_path(path))?;
        let config: MtgnnConfig = serde_json::from_str(&config_json)?;

        let mut model = Self::build(config, None, None, Device::cuda_if_available())?;
        model.vs.load(path)?;
        tracing::info!("模型已加载: {}", path.display());
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn tiny_config(num_nodes: i64, seq_length: i64, horizon: i64) -> MtgnnConfig {
        MtgnnConfig {
            in_dim: 1,
            conv_channels: 8,
            residual_channels: 8,
            skip_channels: 8,
            end_channels: 16,
            node_dim: 4,
            subgraph_size: 3,
            layers: 2,
            ..MtgnnConfig::new(num_nodes, seq_length, horizon)
        }
    }

    #[test]
    fn test_receptive_field() {
        let config = MtgnnConfig::default();
        assert_eq!(config.receptive_field(), 19);
        assert_eq!(config.padded_length(), 19);
        assert_eq!(config.layer_output_length(1), 13);
        assert_eq!(config.layer_output_length(3), 1);

        let exponential = MtgnnConfig { dilation_exponential: 2, ..MtgnnConfig::default() };
        // 1 + 6 * (2^3 - 1) / (2 - 1)
        assert_eq!(exponential.receptive_field(), 43);
        assert_eq!(exponential.layer_receptive_field(2), 19);
    }

    #[test]
    fn test_forward_shape_with_padding() {
        // seq_length 5 < 感受野 13，需要补齐
        let config = tiny_config(6, 5, 3);
        assert_eq!(config.receptive_field(), 13);
        let model = MtgnnModel::with_device(config, Device::Cpu).unwrap();

        let input = Tensor::randn([2, 1, 6, 5], (Kind::Float, Device::Cpu));
        let out = model.forward_t(&input, None, false).unwrap();
        assert_eq!(out.size(), vec![2, 3, 6, 1]);
    }

    #[test]
    fn test_forward_rejects_wrong_length() {
        let model = MtgnnModel::with_device(tiny_config(4, 16, 2), Device::Cpu).unwrap();
        let input = Tensor::randn([1, 1, 4, 15], (Kind::Float, Device::Cpu));
        assert!(model.forward_t(&input, None, false).is_err());

        let input = Tensor::randn([1, 2, 4, 16], (Kind::Float, Device::Cpu));
        assert!(model.forward_t(&input, None, false).is_err());
    }

    #[test]
    fn test_forward_rejects_wrong_node_count() {
        let model = MtgnnModel::with_device(tiny_config(4, 16, 2), Device::Cpu).unwrap();
        let input = Tensor::randn([1, 1, 5, 16], (Kind::Float, Device::Cpu));
        assert!(matches!(
            model.forward_t(&input, None, false),
            Err(GnnError::DimensionMismatch { expected: 4, actual: 5 })
        ));

        // 节点子集与输入的节点数不一致
        let idx = Tensor::from_slice(&[0i64, 2]);
        let input = Tensor::randn([1, 1, 3, 16], (Kind::Float, Device::Cpu));
        assert!(model.forward_t(&input, Some(&idx), false).is_err());

        let x = Array::from_shape_fn((2, 16, 3, 1), |(s, t, n, _)| (s + t + n) as f64);
        assert!(model.predict(&x).is_err());
    }

    #[test]
    fn test_forward_on_node_subset() {
        let model = MtgnnModel::with_device(tiny_config(6, 16, 2), Device::Cpu).unwrap();
        let idx = Tensor::from_slice(&[0i64, 3, 5]);
        let input = Tensor::randn([2, 1, 3, 16], (Kind::Float, Device::Cpu));

        let out = model.forward_t(&input, Some(&idx), true).unwrap();
        assert_eq!(out.size(), vec![2, 2, 3, 1]);
    }

    #[test]
    fn test_variants_produce_same_shape() {
        let variants = [
            MtgnnConfig { temporal: TemporalModule::Dilated1D, ..tiny_config(5, 8, 2) },
            MtgnnConfig { propagation: PropagationKind::Plain, ..tiny_config(5, 8, 2) },
            MtgnnConfig { propagation: PropagationKind::Dynamic, ..tiny_config(5, 8, 2) },
            MtgnnConfig { gcn_true: false, ..tiny_config(5, 8, 2) },
            MtgnnConfig { dilation_exponential: 2, ..tiny_config(5, 8, 2) },
        ];

        for config in variants {
            let model = MtgnnModel::with_device(config.clone(), Device::Cpu).unwrap();
            let input = Tensor::randn([3, 1, 5, 8], (Kind::Float, Device::Cpu));
            let out = model.forward_t(&input, None, false).unwrap();
            assert_eq!(out.size(), vec![3, 2, 5, 1], "{:?}", config);
        }
    }

    #[test]
    fn test_predefined_adjacency_required() {
        let config = MtgnnConfig { build_adj: false, ..tiny_config(4, 8, 2) };
        assert!(MtgnnModel::with_device(config.clone(), Device::Cpu).is_err());

        let adj = Array2::<f64>::eye(4);
        let model = MtgnnModel::with_graph(config, Some(&adj), None, Device::Cpu).unwrap();
        assert_eq!(model.learned_adjacency(false).unwrap(), adj);
    }

    #[test]
    fn test_learned_adjacency_is_sparse() {
        let model = MtgnnModel::with_device(tiny_config(6, 8, 2), Device::Cpu).unwrap();
        let sparse = model.learned_adjacency(false).unwrap();
        assert_eq!(sparse.shape(), &[6, 6]);
        for row in sparse.rows() {
            assert!(row.iter().filter(|&&v| v > 0.0).count() <= 3);
        }

        let no_graph = MtgnnModel::with_device(MtgnnConfig { gcn_true: false, ..tiny_config(6, 8, 2) }, Device::Cpu).unwrap();
        assert!(no_graph.learned_adjacency(true).is_err());
    }

    #[test]
    fn test_predict_layout() {
        let model = MtgnnModel::with_device(tiny_config(3, 8, 4), Device::Cpu).unwrap();
        let x = Array::from_shape_fn((5, 8, 3, 1), |(s, t, n, _)| (s + t + n) as f64 / 10.0);
        assert_eq!(model.predict(&x).unwrap().shape(), &[5, 4, 3]);
    }

    #[test]
    fn test_save_and_load_with_static_features() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.pt");

        let feat = Array::from_shape_fn((4, 3), |(i, j)| (i * 3 + j) as f64);
        // 保留全部邻居，避免 top-k 的随机扰动影响比较
        let config = MtgnnConfig { subgraph_size: 4, ..tiny_config(4, 8, 2) };
        let model = MtgnnModel::with_graph(config, None, Some(&feat), Device::Cpu).unwrap();
        model.save(&path).unwrap();
        assert!(config_path(&path).exists());

        let loaded = MtgnnModel::load(&path).unwrap();
        assert_eq!(loaded.config().static_feat_dim, Some(3));

        let x = Array::from_shape_fn((2, 8, 4, 1), |(s, t, n, _)| (s * t + n) as f64);
        let a = model.predict(&x).unwrap();
        let b = loaded.predict(&x).unwrap();
        assert!((a - b).mapv(f64::abs).sum() < 1e-4);
    }
}
