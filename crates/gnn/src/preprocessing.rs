//! 数据标准化
//!
//! 两种方式：
//! - `Global`：所有数值共用一个均值/标准差（从输入窗口拟合）
//! - `ZScore`：每个节点（列）单独的均值/标准差，保存为 `norm_stat.json`

use crate::types::{GnnError, GnnResult};
use ndarray::{Array1, Array2, Array3, Axis};
use serde::{Deserialize, Serialize};
use tch::Tensor;

/// 标准差过小时按 1 处理
fn safe_std(std: f64) -> f64 {
    if std.abs() < 1e-10 {
        1.0
    } else {
        std
    }
}

/// 标准化方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizeMethod {
    Global,
    ZScore,
}

impl Default for NormalizeMethod {
    fn default() -> Self {
        NormalizeMethod::Global
    }
}

/// 标量缩放器
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: f64,
    pub std: f64,
}

impl StandardScaler {
    pub fn new(mean: f64, std: f64) -> Self {
        Self { mean, std }
    }

    /// 从所有数值拟合
    pub fn fit<D: ndarray::Dimension>(data: &ndarray::Array<f64, D>) -> GnnResult<Self> {
        let mean = data
            .mean()
            .ok_or_else(|| GnnError::Preprocessing("数据为空".to_string()))?;
        let std = data.std(0.0);
        Ok(Self { mean, std })
    }

    pub fn transform<D: ndarray::Dimension>(
        &self,
        data: &ndarray::Array<f64, D>,
    ) -> ndarray::Array<f64, D> {
        let std = safe_std(self.std);
        data.mapv(|v| (v - self.mean) / std)
    }

    pub fn inverse_transform<D: ndarray::Dimension>(
        &self,
        data: &ndarray::Array<f64, D>,
    ) -> ndarray::Array<f64, D> {
        let std = safe_std(self.std);
        data.mapv(|v| v * std + self.mean)
    }
}

/// 每个节点的均值与标准差
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormStatistic {
    pub mean: Vec<f64>,
    pub std: Vec<f64>,
}

impl NormStatistic {
    /// 按列拟合（行是时间，列是节点）
    pub fn fit(data: &Array2<f64>) -> GnnResult<Self> {
        if data.is_empty() {
            return Err(GnnError::Preprocessing("数据为空".to_string()));
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| GnnError::Preprocessing("无法计算均值".to_string()))?;
        let std = data.std_axis(Axis(0), 0.0);

        Ok(Self { mean: mean.to_vec(), std: std.to_vec() })
    }

    pub fn num_nodes(&self) -> usize {
        self.mean.len()
    }

    fn check_nodes(&self, actual: usize) -> GnnResult<()> {
        if actual != self.num_nodes() {
            return Err(GnnError::DimensionMismatch { expected: self.num_nodes(), actual });
        }
        Ok(())
    }

    fn stds(&self) -> Array1<f64> {
        self.std.iter().map(|&s| safe_std(s)).collect()
    }
}

/// 标准化器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Normalizer {
    Global(StandardScaler),
    ZScore(NormStatistic),
}

impl Normalizer {
    pub fn method(&self) -> NormalizeMethod {
        match self {
            Normalizer::Global(_) => NormalizeMethod::Global,
            Normalizer::ZScore(_) => NormalizeMethod::ZScore,
        }
    }

    /// 节点在最后一个维度
    pub fn transform(&self, data: &Array3<f64>) -> GnnResult<Array3<f64>> {
        match self {
            Normalizer::Global(scaler) => Ok(scaler.transform(data)),
            Normalizer::ZScore(stat) => {
                stat.check_nodes(data.shape()[2])?;
                let mean = Array1::from_vec(stat.mean.clone());
                Ok((data - &mean) / &stat.stds())
            }
        }
    }

    /// 节点在最后一个维度
    pub fn inverse_transform(&self, data: &Array3<f64>) -> GnnResult<Array3<f64>> {
        match self {
            Normalizer::Global(scaler) => Ok(scaler.inverse_transform(data)),
            Normalizer::ZScore(stat) => {
                stat.check_nodes(data.shape()[2])?;
                let mean = Array1::from_vec(stat.mean.clone());
                Ok(data * &stat.stds() + &mean)
            }
        }
    }

    /// 张量版本的反标准化，节点在最后一个维度；`idx` 为节点子集
    pub fn inverse_tensor(&self, xs: &Tensor, idx: Option<&Tensor>) -> Tensor {
        match self {
            Normalizer::Global(scaler) => xs * safe_std(scaler.std) + scaler.mean,
            Normalizer::ZScore(stat) => {
                let device = xs.device();
                let to_tensor = |values: Vec<f64>| {
                    let values: Vec<f32> = values.iter().map(|&v| v as f32).collect();
                    Tensor::from_slice(&values).to_device(device)
                };
                let mut mean = to_tensor(stat.mean.clone());
                let mut std = to_tensor(stat.stds().to_vec());
                if let Some(idx) = idx {
                    let idx = idx.to_device(device);
                    mean = mean.index_select(0, &idx);
                    std = std.index_select(0, &idx);
                }
                xs * std + mean
            }
        }
    }

    /// 按方式拟合：`Global` 用窗口的全部数值，`ZScore` 用原始序列的每一列
    pub fn fit(method: NormalizeMethod, series: &Array2<f64>, windows: &Array3<f64>) -> GnnResult<Self> {
        match method {
            NormalizeMethod::Global => Ok(Normalizer::Global(StandardScaler::fit(windows)?)),
            NormalizeMethod::ZScore => Ok(Normalizer::ZScore(NormStatistic::fit(series)?)),
        }
    }
}
