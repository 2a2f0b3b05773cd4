//! 核心类型定义

use gnn::GnnError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type InvestResult<T> = Result<T, InvestError>;

#[derive(Debug, Error)]
pub enum InvestError {
    #[error("数据错误: {0}")]
    Data(String),

    #[error("CSV 错误: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("配置文件解析失败: {0}")]
    Config(#[from] toml::de::Error),

    #[error("模型错误: {0}")]
    Gnn(#[from] GnnError),

    #[error("缺少 {0} 年的数据")]
    MissingYear(i32),

    #[error("无效的配置: {0}")]
    InvalidConfig(String),
}

/// 股价走势分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PriceMovement {
    Up,
    Flat,
    Down,
}

impl PriceMovement {
    /// 1 / 0 / -1
    pub fn code(self) -> i8 {
        match self {
            PriceMovement::Up => 1,
            PriceMovement::Flat => 0,
            PriceMovement::Down => -1,
        }
    }
}

impl std::fmt::Display for PriceMovement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PriceMovement::Up => "Up",
            PriceMovement::Flat => "Flat",
            PriceMovement::Down => "Down",
        };
        write!(f, "{}", label)
    }
}

/// 分类阈值：预测值 / 当前值 的上下界
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationBand {
    pub upper: f64,
    pub lower: f64,
}

impl Default for ClassificationBand {
    fn default() -> Self {
        Self { upper: 1.02, lower: 0.98 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_movement_codes() {
        assert_eq!(PriceMovement::Up.code(), 1);
        assert_eq!(PriceMovement::Flat.code(), 0);
        assert_eq!(PriceMovement::Down.code(), -1);
        assert_eq!(PriceMovement::Down.to_string(), "Down");
    }

    #[test]
    fn test_gnn_error_converts() {
        let err: InvestError = GnnError::InvalidConfig("x".to_string()).into();
        assert!(matches!(err, InvestError::Gnn(_)));
    }
}
