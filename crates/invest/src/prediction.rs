//! 股价走势预测
//!
//! 用训练好的 MTGNN 检查点预测某一年年初之后的股价，并按
//! 预测均值 / 当前价格 的比值分为 Up / Flat / Down。

use crate::config::InvestConfig;
use crate::data::{PriceSource, PriceTable};
use crate::types::{ClassificationBand, InvestError, InvestResult, PriceMovement};
use gnn::checkpoint::{load_model, load_normalizer, save_checkpoint};
use gnn::evaluation::{self, horizon_metrics, to_original_scale};
use gnn::{
    EpochRecord, ForecastModel, Metrics, MtgnnConfig, MtgnnModel, NormalizeMethod, Normalizer,
    WindowDataset,
};
use ndarray::{s, Array2, Axis};
use std::collections::BTreeMap;
use std::path::Path;

/// 按比值 `y_hat / y` 分类
///
/// `y = 0` 时比值为 ±inf 或 NaN：+inf 归为 Up，其余归为 Down。
pub fn classify(y: &[f64], y_hat: &[f64], band: ClassificationBand) -> Vec<PriceMovement> {
    y.iter()
        .zip(y_hat)
        .map(|(&current, &forecast)| {
            let ratio = forecast / current;
            if ratio >= band.upper {
                PriceMovement::Up
            } else if ratio > band.lower {
                PriceMovement::Flat
            } else {
                PriceMovement::Down
            }
        })
        .collect()
}

/// 用检查点对 `data` (T×N) 推理，返回最后一个窗口的预测 (N×H)，原始尺度
pub fn inference(
    data: &Array2<f64>,
    checkpoint_dir: &Path,
    window: usize,
    horizon: usize,
    method: NormalizeMethod,
    batch_size: usize,
) -> InvestResult<Array2<f64>> {
    let model = load_model(checkpoint_dir)?;

    let (dataset, normalizer) = match method {
        // 按当前窗口重新拟合
        NormalizeMethod::Global => WindowDataset::prepare(data, window, horizon, method)?,
        NormalizeMethod::ZScore => {
            let normalizer = load_normalizer(checkpoint_dir)?;
            if normalizer.method() != NormalizeMethod::ZScore {
                return Err(InvestError::InvalidConfig(format!(
                    "{} 中的标准化方式不是 z_score",
                    checkpoint_dir.display()
                )));
            }
            (WindowDataset::prepare_with(data, window, horizon, &normalizer)?, normalizer)
        }
    };

    let (forecast, _) = evaluation::inference(&model, &dataset, &normalizer, batch_size)?;
    last_forecast(forecast, &normalizer)
}

/// (S, N, H) 标准化空间 -> 最后一个样本的 (N, H) 原始尺度
fn last_forecast(forecast: ndarray::Array3<f64>, normalizer: &Normalizer) -> InvestResult<Array2<f64>> {
    let samples = forecast.len_of(Axis(0));
    if samples == 0 {
        return Err(InvestError::Data("没有可用于推理的窗口".to_string()));
    }
    let restored = to_original_scale(normalizer, forecast)?;
    Ok(restored.index_axis(Axis(0), samples - 1).to_owned())
}

/// 预测 `year` 年年初之后的股价走势
pub fn forecast_performance(
    prices: &PriceTable,
    year: i32,
    config: &InvestConfig,
    checkpoint_dir: &Path,
) -> InvestResult<BTreeMap<String, PriceMovement>> {
    let ub = usize::try_from(i64::from(year - config.base_year) * config.days_per_year as i64)
        .ok()
        .filter(|&ub| ub > 0 && ub <= prices.num_days())
        .ok_or_else(|| {
            InvestError::Data(format!(
                "{} 年超出数据范围 ({} 年起共 {} 天)",
                year,
                config.base_year,
                prices.num_days()
            ))
        })?;

    let data = prices.values.slice(s![..ub, ..]).to_owned();
    let y = data.row(ub - 1).to_vec();

    let forecast = inference(
        &data,
        checkpoint_dir,
        config.window_size,
        config.horizon,
        config.normalize_method,
        config.batch_size,
    )?;
    let y_hat: Vec<f64> = forecast
        .mean_axis(Axis(1))
        .ok_or_else(|| InvestError::Data("预测步数为 0".to_string()))?
        .to_vec();

    let movements = classify(&y, &y_hat, config.band);
    tracing::info!(
        "{} 年: {} 个资产, Up {} | Flat {} | Down {}",
        year,
        movements.len(),
        movements.iter().filter(|m| **m == PriceMovement::Up).count(),
        movements.iter().filter(|m| **m == PriceMovement::Flat).count(),
        movements.iter().filter(|m| **m == PriceMovement::Down).count()
    );

    Ok(prices.names.iter().cloned().zip(movements).collect())
}

/// 从数据源读取价格并预测
pub async fn future_share_price_performance(
    year: i32,
    config: &InvestConfig,
    source: &dyn PriceSource,
) -> InvestResult<BTreeMap<String, PriceMovement>> {
    let prices = source.prices(&config.dataset).await?;
    forecast_performance(&prices, year, config, &config.checkpoint_dir())
}

/// 训练结果
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub history: Vec<EpochRecord>,
    /// 测试集上每个预测步的指标
    pub test_metrics: Vec<Metrics>,
}

/// 训练 MTGNN 并写入检查点目录
pub fn train(prices: &PriceTable, config: &InvestConfig, checkpoint_dir: &Path) -> InvestResult<TrainingSummary> {
    let (dataset, normalizer) =
        WindowDataset::prepare(&prices.values, config.window_size, config.horizon, config.normalize_method)?;
    let (train, valid, test) = dataset.split(config.train_ratio, config.valid_ratio)?;
    tracing::info!("样本数: 训练 {} | 验证 {} | 测试 {}", train.len(), valid.len(), test.len());

    let model_config = MtgnnConfig {
        in_dim: 1,
        ..MtgnnConfig::new(
            prices.names.len() as i64,
            config.window_size as i64,
            config.horizon as i64,
        )
    };
    let mut model = MtgnnModel::new(model_config)?;
    let history = model.fit(&train, &valid, &normalizer, &config.training)?;
    save_checkpoint(checkpoint_dir, &model, &normalizer)?;

    let test_metrics = if test.is_empty() {
        Vec::new()
    } else {
        let (forecast, target) = evaluation::inference(&model, &test, &normalizer, config.batch_size)?;
        let metrics = horizon_metrics(
            &to_original_scale(&normalizer, forecast)?,
            &to_original_scale(&normalizer, target)?,
        )?;
        for (step, m) in metrics.iter().enumerate() {
            tracing::info!("测试集 第 {} 步 | {}", step + 1, m);
        }
        metrics
    };

    Ok(TrainingSummary { history, test_metrics })
}
