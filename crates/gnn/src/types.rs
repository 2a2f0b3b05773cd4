//! 核心类型定义

use ndarray::{ArrayD, Dimension, IxDyn};
use serde::{Deserialize, Serialize};
use tch::{Device, Kind, Tensor};
use thiserror::Error;

pub type GnnResult<T> = Result<T, GnnError>;

#[derive(Debug, Error)]
pub enum GnnError {
    #[error("数据预处理错误: {0}")]
    Preprocessing(String),

    #[error("模型训练错误: {0}")]
    Training(String),

    #[error("模型预测错误: {0}")]
    Prediction(String),

    #[error("数据维度不匹配: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("无效的配置: {0}")]
    InvalidConfig(String),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("PyTorch 错误: {0}")]
    Torch(#[from] tch::TchError),

    #[error("数组形状错误: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// 评估指标
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    /// 平均绝对误差
    pub mae: f64,
    /// 平均绝对百分比误差
    pub mape: f64,
    /// 均方根误差
    pub rmse: f64,
}

impl Metrics {
    pub fn new(mae: f64, mape: f64, rmse: f64) -> Self {
        Self { mae, mape, rmse }
    }
}

impl std::fmt::Display for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "MAE {:.4} | MAPE {:.4} | RMSE {:.4}", self.mae, self.mape, self.rmse)
    }
}

/// 每个 epoch 的训练记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f64,
    pub validation: Metrics,
    pub duration_secs: f64,
}

/// ndarray -> Tensor（f32）
pub fn array_to_tensor<D: Dimension>(arr: &ndarray::Array<f64, D>, device: Device) -> Tensor {
    let shape: Vec<i64> = arr.shape().iter().map(|&d| d as i64).collect();
    let data: Vec<f32> = arr.iter().map(|&v| v as f32).collect();

    Tensor::from_slice(&data).view(shape.as_slice()).to_device(device)
}

/// Tensor -> ndarray（f64）
pub fn tensor_to_array(tensor: &Tensor) -> GnnResult<ArrayD<f64>> {
    let shape: Vec<usize> = tensor.size().iter().map(|&d| d as usize).collect();
    let flat = tensor
        .to_device(Device::Cpu)
        .to_kind(Kind::Double)
        .contiguous()
        .view([-1]);
    let data = Vec::<f64>::try_from(&flat)?;

    Ok(ArrayD::from_shape_vec(IxDyn(&shape), data)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Ix2};

    #[test]
    fn test_tensor_array_conversion() {
        let arr = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let tensor = array_to_tensor(&arr, Device::Cpu);
        assert_eq!(tensor.size(), vec![2, 3]);

        let back = tensor_to_array(&tensor).unwrap().into_dimensionality::<Ix2>().unwrap();
        assert_eq!(back, arr);
    }
}
