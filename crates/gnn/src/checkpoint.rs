//! 检查点目录
//!
//! ```text
//! <root>/<model>/<dataset>/<window>/<horizon>/train/
//!     model.pt           权重
//!     model.pt.config    MtgnnConfig (JSON)
//!     norm_stat.json     标准化统计量
//! ```

use crate::models::{ForecastModel, MtgnnModel};
use crate::preprocessing::Normalizer;
use crate::types::GnnResult;
use std::path::{Path, PathBuf};

pub const MODEL_FILE: &str = "model.pt";
pub const NORM_STAT_FILE: &str = "norm_stat.json";

/// 训练结果所在目录
pub fn checkpoint_dir(root: &Path, model: &str, dataset: &str, window: usize, horizon: usize) -> PathBuf {
    root.join(model)
        .join(dataset)
        .join(window.to_string())
        .join(horizon.to_string())
        .join("train")
}

pub fn save_checkpoint(dir: &Path, model: &MtgnnModel, normalizer: &Normalizer) -> GnnResult<()> {
    std::fs::create_dir_all(dir)?;
    model.save(&dir.join(MODEL_FILE))?;
    std::fs::write(dir.join(NORM_STAT_FILE), serde_json::to_string_pretty(normalizer)?)?;
    tracing::info!("检查点已写入 {}", dir.display());
    Ok(())
}

pub fn load_model(dir: &Path) -> GnnResult<MtgnnModel> {
    MtgnnModel::load(&dir.join(MODEL_FILE))
}

pub fn load_normalizer(dir: &Path) -> GnnResult<Normalizer> {
    let json = std::fs::read_to_string(dir.join(NORM_STAT_FILE))?;
    Ok(serde_json::from_str(&json)?)
}
