//! MTGNN 训练
//!
//! 损失在反标准化后的原始尺度上计算（masked MAE，目标为 0 的位置不计入）。
//! 支持课程学习（逐步增加参与损失的预测步数）和节点随机分组训练。

use crate::evaluation;
use crate::models::MtgnnModel;
use crate::preprocessing::Normalizer;
use crate::timeseries::{BatchLoader, WindowDataset};
use crate::types::{array_to_tensor, EpochRecord, GnnError, GnnResult, Metrics};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Instant;
use tch::{nn, nn::OptimizerConfig, Kind, Tensor};

/// 训练配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub weight_decay: f64,
    /// 梯度裁剪的最大范数，0 表示不裁剪
    pub clip: f64,
    /// 课程学习
    pub curriculum: bool,
    /// 每隔多少次迭代增加一个预测步
    pub step_size: usize,
    /// 每次迭代把节点分成几组
    pub num_split: usize,
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 64,
            learning_rate: 0.001,
            weight_decay: 0.0001,
            clip: 5.0,
            curriculum: true,
            step_size: 2500,
            num_split: 1,
            seed: 42,
        }
    }
}

/// masked MAE：目标为 0 的位置不计入；全部被屏蔽时为 0
pub fn masked_mae(pred: &Tensor, target: &Tensor) -> Tensor {
    let mask = target.ne(0.0).to_kind(Kind::Float);
    let count = mask.sum(Kind::Float).clamp_min(1.0);
    ((pred - target).abs() * &mask).sum(Kind::Float) / count
}

/// 课程学习：当前参与损失的预测步数
#[derive(Debug, Clone, Copy)]
struct Curriculum {
    task_level: i64,
    horizon: i64,
    step_size: usize,
    enabled: bool,
}

impl Curriculum {
    fn new(horizon: i64, step_size: usize, enabled: bool) -> Self {
        let task_level = if enabled { 1 } else { horizon };
        Self { task_level, horizon, step_size: step_size.max(1), enabled }
    }

    /// 第 `iter` 次迭代（从 1 开始）前调用
    fn advance(&mut self, iter: usize) -> i64 {
        if self.enabled && iter % self.step_size == 0 && self.task_level < self.horizon {
            self.task_level += 1;
            tracing::debug!("课程学习: 预测步数增加到 {}", self.task_level);
        }
        self.task_level
    }
}

/// 把节点随机分成 `num_split` 组；只有一组时返回 `None`（使用全部节点）
fn node_groups(num_nodes: usize, num_split: usize, rng: &mut StdRng) -> Vec<Option<Vec<i64>>> {
    if num_split <= 1 || num_nodes < num_split {
        return vec![None];
    }

    let mut perm: Vec<i64> = (0..num_nodes as i64).collect();
    perm.shuffle(rng);

    let group = num_nodes / num_split;
    (0..num_split)
        .map(|j| {
            let end = if j + 1 == num_split { num_nodes } else { (j + 1) * group };
            Some(perm[j * group..end].to_vec())
        })
        .collect()
}

fn snapshot(vs: &nn::VarStore) -> HashMap<String, Tensor> {
    tch::no_grad(|| {
        vs.variables()
            .into_iter()
            .map(|(name, var)| (name, var.detach().copy()))
            .collect()
    })
}

fn restore(vs: &nn::VarStore, weights: &HashMap<String, Tensor>) {
    tch::no_grad(|| {
        for (name, mut var) in vs.variables() {
            if let Some(saved) = weights.get(&name) {
                var.copy_(saved);
            }
        }
    });
}

/// 训练器
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// 训练并在结束时恢复验证集上最好的权重
    pub fn train(
        &self,
        model: &MtgnnModel,
        train: &WindowDataset,
        valid: &WindowDataset,
        normalizer: &Normalizer,
    ) -> GnnResult<Vec<EpochRecord>> {
        if train.is_empty() {
            return Err(GnnError::Training("训练集为空".to_string()));
        }
        let horizon = train.horizon() as i64;
        if horizon != model.config().out_dim {
            return Err(GnnError::DimensionMismatch {
                expected: model.config().out_dim as usize,
                actual: horizon as usize,
            });
        }
        if train.num_nodes() as i64 != model.config().num_nodes {
            return Err(GnnError::DimensionMismatch {
                expected: model.config().num_nodes as usize,
                actual: train.num_nodes(),
            });
        }

        let device = model.device();
        let mut opt = nn::Adam { wd: self.config.weight_decay, ..Default::default() }
            .build(model.var_store(), self.config.learning_rate)?;
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut curriculum = Curriculum::new(horizon, self.config.step_size, self.config.curriculum);

        let mut history = Vec::with_capacity(self.config.epochs);
        let mut best: Option<(f64, HashMap<String, Tensor>)> = None;
        let mut iter = 1usize;

        for epoch in 1..=self.config.epochs {
            let start = Instant::now();
            let mut total_loss = 0.0;
            let mut steps = 0usize;

            let loader = BatchLoader::new(train, self.config.batch_size, true)
                .shuffle(self.config.seed.wrapping_add(epoch as u64));

            for (batch_x, batch_y) in loader {
                let input = model.input_tensor(&batch_x);
                let target = array_to_tensor(&batch_y, device);
                let task_level = curriculum.advance(iter);

                for group in node_groups(train.num_nodes(), self.config.num_split, &mut rng) {
                    let idx = group.map(|nodes| Tensor::from_slice(&nodes).to_device(device));
                    let (x, y) = match &idx {
                        Some(idx) => (input.index_select(2, idx), target.index_select(2, idx)),
                        None => (input.shallow_clone(), target.shallow_clone()),
                    };

                    opt.zero_grad();
                    // (B, H, n, 1) -> (B, H, n)
                    let output = model.forward_t(&x, idx.as_ref(), true)?.squeeze_dim(3);
                    let pred = normalizer.inverse_tensor(&output, idx.as_ref());

                    let loss = masked_mae(&pred.narrow(1, 0, task_level), &y.narrow(1, 0, task_level));
                    loss.backward();
                    if self.config.clip > 0.0 {
                        opt.clip_grad_norm(self.config.clip);
                    }
                    opt.step();

                    total_loss += loss.double_value(&[]);
                    steps += 1;
                }
                iter += 1;
            }

            let train_loss = total_loss / steps.max(1) as f64;
            let validation = if valid.is_empty() {
                Metrics::default()
            } else {
                evaluation::evaluate(model, valid, normalizer, self.config.batch_size)?
            };
            let score = if valid.is_empty() { train_loss } else { validation.mae };

            let record = EpochRecord {
                epoch,
                train_loss,
                validation,
                duration_secs: start.elapsed().as_secs_f64(),
            };
            tracing::info!(
                "Epoch {}/{} | 训练损失 {:.4} | 验证 {} | {:.1}s",
                epoch,
                self.config.epochs,
                record.train_loss,
                record.validation,
                record.duration_secs
            );
            history.push(record);

            if best.as_ref().map_or(true, |(best_score, _)| score < *best_score) {
                tracing::debug!("epoch {} 成为当前最优 ({:.4})", epoch, score);
                best = Some((score, snapshot(model.var_store())));
            }
        }

        if let Some((score, weights)) = best {
            restore(model.var_store(), &weights);
            tracing::info!("已恢复最优权重, 得分 {:.4}", score);
        }

        Ok(history)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ForecastModel, MtgnnConfig};
    use crate::preprocessing::NormalizeMethod;
    use ndarray::Array2;
    use tch::Device;

    #[test]
    fn test_masked_mae_ignores_zero_targets() {
        let pred = Tensor::from_slice(&[1.0f32, 5.0, 3.0]);
        let target = Tensor::from_slice(&[2.0f32, 0.0, 1.0]);
        // (|1-2| + |3-1|) / 2
        assert!((masked_mae(&pred, &target).double_value(&[]) - 1.5).abs() < 1e-6);

        let zeros = Tensor::zeros([3], (Kind::Float, Device::Cpu));
        assert_eq!(masked_mae(&pred, &zeros).double_value(&[]), 0.0);
    }

    #[test]
    fn test_curriculum_grows_to_horizon() {
        let mut curriculum = Curriculum::new(3, 2, true);
        let levels: Vec<i64> = (1..=8).map(|iter| curriculum.advance(iter)).collect();
        assert_eq!(levels, vec![1, 2, 2, 3, 3, 3, 3, 3]);

        let mut disabled = Curriculum::new(3, 2, false);
        assert_eq!(disabled.advance(1), 3);
    }

    #[test]
    fn test_node_groups_cover_all_nodes() {
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(node_groups(5, 1, &mut rng), vec![None]);

        let groups = node_groups(7, 3, &mut rng);
        assert_eq!(groups.len(), 3);
        let mut all: Vec<i64> = groups.into_iter().flatten().flatten().collect();
        all.sort_unstable();
        assert_eq!(all, (0..7).collect::<Vec<i64>>());
    }

    #[test]
    fn test_training_reduces_loss() {
        let series = Array2::from_shape_fn((80, 3), |(t, n)| 10.0 + ((t + n) as f64 * 0.3).sin());
        let (dataset, normalizer) = WindowDataset::prepare(&series, 8, 2, NormalizeMethod::Global).unwrap();
        let (train, valid, _) = dataset.split(0.7, 0.2).unwrap();

        let config = MtgnnConfig {
            in_dim: 1,
            conv_channels: 8,
            residual_channels: 8,
            skip_channels: 8,
            end_channels: 16,
            node_dim: 4,
            subgraph_size: 3,
            layers: 1,
            dropout: 0.0,
            ..MtgnnConfig::new(3, 8, 2)
        };
        let mut model = MtgnnModel::with_device(config, Device::Cpu).unwrap();
        let training = TrainingConfig {
            epochs: 8,
            batch_size: 16,
            learning_rate: 0.01,
            curriculum: false,
            num_split: 2,
            ..TrainingConfig::default()
        };

        let history = model.fit(&train, &valid, &normalizer, &training).unwrap();
        assert_eq!(history.len(), 8);
        assert!(history.last().unwrap().train_loss < history[0].train_loss);
        assert!(history.iter().all(|r| r.validation.mae.is_finite()));
    }
}
