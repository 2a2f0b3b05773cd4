//! # MTGNN Forecasting Engine
//!
//! 多变量时间序列的图神经网络预测（MTGNN），基于 tch-rs 实现。
//!
//! ## 主要模块
//!
//! - `layers`: 图卷积、膨胀时间卷积、图结构学习、LayerNorm
//! - `models`: MTGNN 模型及其配置
//! - `preprocessing`: 数据标准化
//! - `timeseries`: 滑动窗口、数据分割与批次
//! - `training`: 训练循环（课程学习、节点分组）
//! - `evaluation`: 评估指标与批量推理
//! - `checkpoint`: 检查点目录的读写
//! - `analysis`: 谱协同聚类

pub mod analysis;
pub mod checkpoint;
pub mod evaluation;
pub mod layers;
pub mod models;
pub mod preprocessing;
pub mod timeseries;
pub mod training;
pub mod types;

pub use models::{ForecastModel, MtgnnConfig, MtgnnModel, PropagationKind, TemporalModule};
pub use preprocessing::{NormStatistic, NormalizeMethod, Normalizer, StandardScaler};
pub use timeseries::{process_data, BatchLoader, TimeSeriesSplitter, WindowDataset};
pub use training::{Trainer, TrainingConfig};
pub use types::{EpochRecord, GnnError, GnnResult, Metrics};
