//! 预测模型

pub mod mtgnn;

pub use mtgnn::{MtgnnConfig, MtgnnModel, PropagationKind, TemporalModule};

use crate::preprocessing::Normalizer;
use crate::timeseries::WindowDataset;
use crate::training::TrainingConfig;
use crate::types::{EpochRecord, GnnResult};
use ndarray::{Array3, Array4};
use std::path::Path;

/// 多变量时间序列预测模型接口
pub trait ForecastModel {
    /// 训练模型，返回每个 epoch 的记录
    fn fit(
        &mut self,
        train: &WindowDataset,
        valid: &WindowDataset,
        normalizer: &Normalizer,
        config: &TrainingConfig,
    ) -> GnnResult<Vec<EpochRecord>>;

    /// 预测
    ///
    /// 输入 (样本数, window, N, F)，输出标准化空间的 (样本数, horizon, N)
    fn predict(&self, x: &Array4<f64>) -> GnnResult<Array3<f64>>;

    /// 保存模型
    fn save(&self, path: &Path) -> GnnResult<()>;

    /// 加载模型
    fn load(path: &Path) -> GnnResult<Self>
    where
        Self: Sized;
}
