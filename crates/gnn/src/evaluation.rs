//! 预测评估与批量推理

use crate::models::ForecastModel;
use crate::preprocessing::Normalizer;
use crate::timeseries::{BatchLoader, WindowDataset};
use crate::types::{GnnError, GnnResult, Metrics};
use ndarray::{concatenate, Array3, ArrayBase, Axis, Data, Dimension};

/// 只在目标不为 0 的位置上取平均
fn masked_mean<S1, S2, D, F>(pred: &ArrayBase<S1, D>, target: &ArrayBase<S2, D>, f: F) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
    F: Fn(f64, f64) -> f64,
{
    let (sum, count) = pred
        .iter()
        .zip(target.iter())
        .filter(|(_, &t)| t != 0.0)
        .fold((0.0, 0usize), |(sum, count), (&p, &t)| (sum + f(p, t), count + 1));

    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// 平均绝对误差
pub fn masked_mae<S1, S2, D>(pred: &ArrayBase<S1, D>, target: &ArrayBase<S2, D>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    masked_mean(pred, target, |p, t| (p - t).abs())
}

/// 平均绝对百分比误差（比例，不乘 100）
pub fn masked_mape<S1, S2, D>(pred: &ArrayBase<S1, D>, target: &ArrayBase<S2, D>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    masked_mean(pred, target, |p, t| ((p - t) / t).abs())
}

/// 均方根误差
pub fn masked_rmse<S1, S2, D>(pred: &ArrayBase<S1, D>, target: &ArrayBase<S2, D>) -> f64
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    masked_mean(pred, target, |p, t| (p - t).powi(2)).sqrt()
}

pub fn metrics<S1, S2, D>(pred: &ArrayBase<S1, D>, target: &ArrayBase<S2, D>) -> Metrics
where
    S1: Data<Elem = f64>,
    S2: Data<Elem = f64>,
    D: Dimension,
{
    Metrics::new(masked_mae(pred, target), masked_mape(pred, target), masked_rmse(pred, target))
}

/// 每个预测步单独的指标，输入形状 (样本数, N, H)
pub fn horizon_metrics(forecast: &Array3<f64>, target: &Array3<f64>) -> GnnResult<Vec<Metrics>> {
    if forecast.shape() != target.shape() {
        return Err(GnnError::DimensionMismatch { expected: target.len(), actual: forecast.len() });
    }

    Ok((0..forecast.shape()[2])
        .map(|h| metrics(&forecast.index_axis(Axis(2), h), &target.index_axis(Axis(2), h)))
        .collect())
}

/// 按批预测，返回标准化空间的 (样本数, H, N)
fn predict_batches<M: ForecastModel>(
    model: &M,
    dataset: &WindowDataset,
    batch_size: usize,
) -> GnnResult<Array3<f64>> {
    if dataset.is_empty() {
        return Err(GnnError::Prediction("没有可用于推理的样本".to_string()));
    }

    let loader = BatchLoader::new(dataset, batch_size, false);
    let batches = loader.num_batches();
    let outputs = loader
        .map(|(x, _)| model.predict(&x))
        .collect::<GnnResult<Vec<_>>>()?;
    tracing::debug!("推理完成: {} 个批次, {} 个样本", batches, dataset.len());

    let views: Vec<_> = outputs.iter().map(|o| o.view()).collect();
    Ok(concatenate(Axis(0), &views)?)
}

/// (S, H, N) <-> (S, N, H)
fn swap_node_horizon(a: Array3<f64>) -> Array3<f64> {
    a.permuted_axes([0, 2, 1]).as_standard_layout().to_owned()
}

/// 推理
///
/// 返回 (forecast, target)，形状都是 (样本数, N, H)，都在标准化空间。
pub fn inference<M: ForecastModel>(
    model: &M,
    dataset: &WindowDataset,
    normalizer: &Normalizer,
    batch_size: usize,
) -> GnnResult<(Array3<f64>, Array3<f64>)> {
    let forecast = predict_batches(model, dataset, batch_size)?;
    let target = normalizer.transform(&dataset.y)?;

    Ok((swap_node_horizon(forecast), swap_node_horizon(target)))
}

/// 把 (样本数, N, H) 的标准化结果还原到原始尺度
pub fn to_original_scale(normalizer: &Normalizer, values: Array3<f64>) -> GnnResult<Array3<f64>> {
    let restored = normalizer.inverse_transform(&swap_node_horizon(values))?;
    Ok(swap_node_horizon(restored))
}

/// 在原始尺度上评估模型
pub fn evaluate<M: ForecastModel>(
    model: &M,
    dataset: &WindowDataset,
    normalizer: &Normalizer,
    batch_size: usize,
) -> GnnResult<Metrics> {
    let forecast = normalizer.inverse_transform(&predict_batches(model, dataset, batch_size)?)?;
    Ok(metrics(&forecast, &dataset.y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array4};
    use std::path::Path;

    /// 把输入窗口最后一个值当作所有步的预测
    struct LastValue;

    impl ForecastModel for LastValue {
        fn fit(
            &mut self,
            _train: &WindowDataset,
            _valid: &WindowDataset,
            _normalizer: &Normalizer,
            _config: &crate::training::TrainingConfig,
        ) -> GnnResult<Vec<crate::types::EpochRecord>> {
            Ok(Vec::new())
        }

        fn predict(&self, x: &Array4<f64>) -> GnnResult<Array3<f64>> {
            let (s, w, n, _) = x.dim();
            Ok(Array3::from_shape_fn((s, 2, n), |(i, _, j)| x[[i, w - 1, j, 0]]))
        }

        fn save(&self, _path: &Path) -> GnnResult<()> {
            Ok(())
        }

        fn load(_path: &Path) -> GnnResult<Self> {
            Ok(LastValue)
        }
    }

    #[test]
    fn test_masked_metrics() {
        let pred = array![[2.0, 4.0], [1.0, 9.0]];
        let target = array![[1.0, 0.0], [2.0, 3.0]];

        // 有效位置: (2,1), (1,2), (9,3)
        assert!((masked_mae(&pred, &target) - 8.0 / 3.0).abs() < 1e-10);
        assert!((masked_mape(&pred, &target) - (1.0 + 0.5 + 2.0) / 3.0).abs() < 1e-10);
        assert!((masked_rmse(&pred, &target) - (38.0f64 / 3.0).sqrt()).abs() < 1e-10);

        let zeros = Array3::<f64>::zeros((1, 1, 2));
        assert_eq!(metrics(&Array3::<f64>::ones((1, 1, 2)), &zeros), Metrics::default());
    }

    #[test]
    fn test_horizon_metrics() {
        let target = Array3::from_elem((2, 3, 2), 2.0);
        let mut forecast = target.clone();
        forecast.index_axis_mut(Axis(2), 1).fill(3.0);

        let per_step = horizon_metrics(&forecast, &target).unwrap();
        assert_eq!(per_step.len(), 2);
        assert_eq!(per_step[0].mae, 0.0);
        assert!((per_step[1].mae - 1.0).abs() < 1e-10);
        assert!((per_step[1].mape - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_inference_layout() {
        let series = ndarray::Array2::from_shape_fn((20, 3), |(t, n)| (t * 10 + n + 1) as f64);
        let normalizer = Normalizer::Global(crate::preprocessing::StandardScaler::new(0.0, 1.0));
        let dataset = WindowDataset::prepare_with(&series, 4, 2, &normalizer).unwrap();

        let (forecast, target) = inference(&LastValue, &dataset, &normalizer, 4).unwrap();
        assert_eq!(forecast.shape(), &[15, 3, 2]);
        assert_eq!(target.shape(), &[15, 3, 2]);
        // 样本 0 的输入是 t0..t3，目标是 t4..t5
        assert_eq!(forecast[[0, 2, 1]], 33.0);
        assert_eq!(target[[0, 2, 1]], 53.0);
    }

    #[test]
    fn test_inference_target_shares_forecast_scale() {
        let series = ndarray::Array2::from_shape_fn((10, 2), |(t, n)| (t + 10 * n) as f64);
        let normalizer = Normalizer::Global(crate::preprocessing::StandardScaler::new(5.0, 2.0));
        let dataset = WindowDataset::prepare_with(&series, 3, 2, &normalizer).unwrap();

        let (forecast, target) = inference(&LastValue, &dataset, &normalizer, 4).unwrap();
        // 样本 0、节点 1：输入最后一步 t=2 -> 12，目标第 2 步 t=4 -> 14
        assert!((forecast[[0, 1, 1]] - (12.0 - 5.0) / 2.0).abs() < 1e-12);
        assert!((target[[0, 1, 1]] - (14.0 - 5.0) / 2.0).abs() < 1e-12);

        let restored = to_original_scale(&normalizer, target).unwrap();
        assert_eq!(restored[[0, 1, 1]], 14.0);
        assert_eq!(restored[[3, 0, 0]], dataset.y[[3, 0, 0]]);
    }

    #[test]
    fn test_evaluate_in_original_scale() {
        let series = ndarray::Array2::from_elem((12, 2), 5.0);
        let normalizer = Normalizer::Global(crate::preprocessing::StandardScaler::new(5.0, 2.0));
        let dataset = WindowDataset::prepare_with(&series, 3, 2, &normalizer).unwrap();

        // 常数序列，最后值预测完全准确
        let result = evaluate(&LastValue, &dataset, &normalizer, 3).unwrap();
        assert!(result.mae < 1e-10);
    }
}
