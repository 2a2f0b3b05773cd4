//! 时间序列窗口与批次

use crate::preprocessing::{NormalizeMethod, Normalizer};
use crate::types::{GnnError, GnnResult};
use ndarray::{s, Array2, Array3, Array4, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// 把 (T, N) 的序列切成滑动窗口
///
/// # 返回
/// - x: (样本数, window, N)
/// - y: (样本数, horizon, N)
///
/// 样本数 = T - window - horizon + 1
pub fn process_data(
    data: &Array2<f64>,
    window: usize,
    horizon: usize,
) -> GnnResult<(Array3<f64>, Array3<f64>)> {
    if window == 0 || horizon == 0 {
        return Err(GnnError::InvalidConfig("window 和 horizon 必须大于 0".to_string()));
    }

    let n_steps = data.nrows();
    if n_steps < window + horizon {
        return Err(GnnError::Preprocessing(format!(
            "数据量不足: 需要至少 {} 个时间步, 实际 {}",
            window + horizon,
            n_steps
        )));
    }

    let n_nodes = data.ncols();
    let n_samples = n_steps - window - horizon + 1;

    let mut x = Array3::<f64>::zeros((n_samples, window, n_nodes));
    let mut y = Array3::<f64>::zeros((n_samples, horizon, n_nodes));

    for i in 0..n_samples {
        x.slice_mut(s![i, .., ..]).assign(&data.slice(s![i..i + window, ..]));
        y.slice_mut(s![i, .., ..])
            .assign(&data.slice(s![i + window..i + window + horizon, ..]));
    }

    Ok((x, y))
}

/// 模型输入窗口
///
/// `x` 已标准化，形状 (样本数, window, N, F)；`y` 是原始尺度，形状 (样本数, horizon, N)。
#[derive(Debug, Clone)]
pub struct WindowDataset {
    pub x: Array4<f64>,
    pub y: Array3<f64>,
}

impl WindowDataset {
    pub fn new(x: Array4<f64>, y: Array3<f64>) -> GnnResult<Self> {
        if x.shape()[0] != y.shape()[0] {
            return Err(GnnError::DimensionMismatch { expected: x.shape()[0], actual: y.shape()[0] });
        }
        if x.shape()[2] != y.shape()[2] {
            return Err(GnnError::DimensionMismatch { expected: x.shape()[2], actual: y.shape()[2] });
        }
        Ok(Self { x, y })
    }

    /// 单特征窗口
    pub fn from_windows(x: Array3<f64>, y: Array3<f64>) -> GnnResult<Self> {
        Self::new(x.insert_axis(Axis(3)), y)
    }

    /// 切窗口、拟合标准化器并标准化输入
    pub fn prepare(
        series: &Array2<f64>,
        window: usize,
        horizon: usize,
        method: NormalizeMethod,
    ) -> GnnResult<(Self, Normalizer)> {
        let (x, y) = process_data(series, window, horizon)?;
        let normalizer = Normalizer::fit(method, series, &x)?;
        let dataset = Self::from_windows(normalizer.transform(&x)?, y)?;
        Ok((dataset, normalizer))
    }

    /// 使用已有的标准化器
    pub fn prepare_with(
        series: &Array2<f64>,
        window: usize,
        horizon: usize,
        normalizer: &Normalizer,
    ) -> GnnResult<Self> {
        let (x, y) = process_data(series, window, horizon)?;
        Self::from_windows(normalizer.transform(&x)?, y)
    }

    pub fn len(&self) -> usize {
        self.x.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn window(&self) -> usize {
        self.x.shape()[1]
    }

    pub fn num_nodes(&self) -> usize {
        self.x.shape()[2]
    }

    pub fn horizon(&self) -> usize {
        self.y.shape()[1]
    }

    pub fn select(&self, indices: &[usize]) -> (Array4<f64>, Array3<f64>) {
        (self.x.select(Axis(0), indices), self.y.select(Axis(0), indices))
    }

    /// 按时间顺序分割
    pub fn split(&self, train_ratio: f64, val_ratio: f64) -> GnnResult<(Self, Self, Self)> {
        let (train_end, val_end) = TimeSeriesSplitter::bounds(self.len(), train_ratio, val_ratio)?;
        let part = |from: usize, to: usize| Self {
            x: self.x.slice(s![from..to, .., .., ..]).to_owned(),
            y: self.y.slice(s![from..to, .., ..]).to_owned(),
        };
        Ok((part(0, train_end), part(train_end, val_end), part(val_end, self.len())))
    }
}

/// 时间序列数据分割器
pub struct TimeSeriesSplitter;

impl TimeSeriesSplitter {
    /// 返回 (train_end, val_end)；测试集比例 = 1 - train_ratio - val_ratio
    pub fn bounds(n: usize, train_ratio: f64, val_ratio: f64) -> GnnResult<(usize, usize)> {
        if train_ratio + val_ratio > 1.0 || train_ratio <= 0.0 || val_ratio < 0.0 {
            return Err(GnnError::InvalidConfig("无效的数据分割比例".to_string()));
        }

        let train_end = (n as f64 * train_ratio) as usize;
        let val_end = ((n as f64 * (train_ratio + val_ratio)) as usize).min(n);
        Ok((train_end, val_end))
    }

    /// 分割 (T, N) 序列
    pub fn split_series(
        data: &Array2<f64>,
        train_ratio: f64,
        val_ratio: f64,
    ) -> GnnResult<(Array2<f64>, Array2<f64>, Array2<f64>)> {
        let (train_end, val_end) = Self::bounds(data.nrows(), train_ratio, val_ratio)?;

        Ok((
            data.slice(s![..train_end, ..]).to_owned(),
            data.slice(s![train_end..val_end, ..]).to_owned(),
            data.slice(s![val_end.., ..]).to_owned(),
        ))
    }
}

/// 批次迭代器
///
/// `pad_with_last_sample` 为真时，用最后一个样本把末尾批次补齐。
pub struct BatchLoader<'a> {
    dataset: &'a WindowDataset,
    batch_size: usize,
    order: Vec<usize>,
    cursor: usize,
}

impl<'a> BatchLoader<'a> {
    pub fn new(dataset: &'a WindowDataset, batch_size: usize, pad_with_last_sample: bool) -> Self {
        let batch_size = batch_size.max(1);
        let mut order: Vec<usize> = (0..dataset.len()).collect();

        if pad_with_last_sample && !order.is_empty() {
            let padding = (batch_size - order.len() % batch_size) % batch_size;
            let last = order.len() - 1;
            order.extend(std::iter::repeat(last).take(padding));
        }

        Self { dataset, batch_size, order, cursor: 0 }
    }

    /// 打乱样本顺序（可复现）
    pub fn shuffle(mut self, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        self.order.shuffle(&mut rng);
        self
    }

    pub fn num_batches(&self) -> usize {
        (self.order.len() + self.batch_size - 1) / self.batch_size
    }
}

impl Iterator for BatchLoader<'_> {
    type Item = (Array4<f64>, Array3<f64>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.batch_size).min(self.order.len());
        let batch = self.dataset.select(&self.order[self.cursor..end]);
        self.cursor = end;
        Some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(steps: usize, nodes: usize) -> Array2<f64> {
        Array2::from_shape_fn((steps, nodes), |(t, n)| (t * 10 + n) as f64)
    }

    #[test]
    fn test_process_data() {
        let data = series(10, 2);
        let (x, y) = process_data(&data, 3, 2).unwrap();

        assert_eq!(x.shape(), &[6, 3, 2]);
        assert_eq!(y.shape(), &[6, 2, 2]);
        // 第 1 个样本: x = t1..t3, y = t4..t5
        assert_eq!(x[[1, 0, 1]], 11.0);
        assert_eq!(y[[1, 0, 0]], 40.0);
        assert_eq!(y[[5, 1, 1]], 91.0);
    }

    #[test]
    fn test_process_data_too_short() {
        let data = series(4, 2);
        assert!(process_data(&data, 3, 2).is_err());
        assert!(process_data(&data, 0, 2).is_err());
    }

    #[test]
    fn test_dataset_split() {
        let (dataset, _) = WindowDataset::prepare(&series(104, 3), 3, 2, NormalizeMethod::Global).unwrap();
        assert_eq!(dataset.len(), 100);

        let (train, val, test) = dataset.split(0.7, 0.2).unwrap();
        assert_eq!(train.len(), 70);
        assert_eq!(val.len(), 20);
        assert_eq!(test.len(), 10);
        assert_eq!(train.x.shape(), &[70, 3, 3, 1]);
    }

    #[test]
    fn test_time_series_split() {
        let data = Array2::from_shape_vec((100, 5), vec![1.0; 500]).unwrap();
        let (train, val, test) = TimeSeriesSplitter::split_series(&data, 0.7, 0.15).unwrap();

        assert_eq!(train.nrows(), 70);
        assert_eq!(val.nrows(), 15);
        assert_eq!(test.nrows(), 15);
        assert!(TimeSeriesSplitter::split_series(&data, 0.0, 0.1).is_err());
    }

    #[test]
    fn test_batch_loader_pads_last_batch() {
        let (x, y) = process_data(&series(12, 2), 3, 2).unwrap();
        let dataset = WindowDataset::from_windows(x, y).unwrap();
        assert_eq!(dataset.len(), 8);

        let loader = BatchLoader::new(&dataset, 3, true);
        assert_eq!(loader.num_batches(), 3);
        let batches: Vec<_> = loader.collect();
        assert!(batches.iter().all(|(bx, by)| bx.shape()[0] == 3 && by.shape()[0] == 3));
        // 补齐的样本就是最后一个样本
        assert_eq!(batches[2].0.slice(s![2, .., .., ..]), dataset.x.slice(s![7, .., .., ..]));

        let sizes: Vec<usize> = BatchLoader::new(&dataset, 3, false).map(|(bx, _)| bx.shape()[0]).collect();
        assert_eq!(sizes, vec![3, 3, 2]);
    }

    #[test]
    fn test_shuffle_is_reproducible() {
        let (x, y) = process_data(&series(30, 2), 3, 2).unwrap();
        let dataset = WindowDataset::from_windows(x, y).unwrap();

        let a: Vec<_> = BatchLoader::new(&dataset, 4, false).shuffle(7).map(|(bx, _)| bx).collect();
        let b: Vec<_> = BatchLoader::new(&dataset, 4, false).shuffle(7).map(|(bx, _)| bx).collect();
        assert_eq!(a, b);
    }
}
