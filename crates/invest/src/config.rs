//! 应用配置（TOML）

use crate::types::{ClassificationBand, InvestResult};
use gnn::{NormalizeMethod, TrainingConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvestConfig {
    /// 数据目录，价格表为 `<data_dir>/<dataset>.csv`
    pub data_dir: PathBuf,
    /// 训练结果目录
    pub output_dir: PathBuf,
    pub model_name: String,
    pub dataset: String,
    pub window_size: usize,
    pub horizon: usize,
    pub batch_size: usize,
    /// 数据第一行对应的年份
    pub base_year: i32,
    pub days_per_year: usize,
    pub band: ClassificationBand,
    pub normalize_method: NormalizeMethod,
    /// 含 `RiskFreeRateOfReturn` 列的表
    pub risk_free_file: String,
    pub train_ratio: f64,
    pub valid_ratio: f64,
    pub training: TrainingConfig,
}

impl Default for InvestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            output_dir: PathBuf::from("output"),
            model_name: "MTGNN".to_string(),
            dataset: "INVEST_GNN_clean".to_string(),
            window_size: 40,
            horizon: 10,
            batch_size: 32,
            base_year: 2009,
            days_per_year: 365,
            band: ClassificationBand::default(),
            normalize_method: NormalizeMethod::Global,
            risk_free_file: "INVEST_clean.csv".to_string(),
            train_ratio: 0.7,
            valid_ratio: 0.2,
            training: TrainingConfig::default(),
        }
    }
}

impl InvestConfig {
    pub fn from_file(path: impl AsRef<Path>) -> InvestResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// 文件不存在时使用默认配置
    pub fn load_or_default(path: impl AsRef<Path>) -> InvestResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::warn!("配置文件 {} 不存在, 使用默认配置", path.display());
            Ok(Self::default())
        }
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        gnn::checkpoint::checkpoint_dir(
            &self.output_dir,
            &self.model_name,
            &self.dataset,
            self.window_size,
            self.horizon,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: InvestConfig = toml::from_str(
            r#"
            dataset = "prices"
            horizon = 5
            normalize_method = "z_score"

            [band]
            upper = 1.05
            lower = 0.95

            [training]
            epochs = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.dataset, "prices");
        assert_eq!(config.horizon, 5);
        assert_eq!(config.window_size, 40);
        assert_eq!(config.normalize_method, NormalizeMethod::ZScore);
        assert_eq!(config.band.upper, 1.05);
        assert_eq!(config.training.epochs, 3);
        assert_eq!(config.training.batch_size, TrainingConfig::default().batch_size);
        assert_eq!(config.checkpoint_dir(), PathBuf::from("output/MTGNN/prices/40/5/train"));
    }

    #[test]
    fn test_missing_file_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = InvestConfig::load_or_default(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config.base_year, 2009);
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.checkpoint_dir(), PathBuf::from("output/MTGNN/INVEST_GNN_clean/40/10/train"));
    }
}
