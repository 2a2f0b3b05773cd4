//! 谱协同聚类
//!
//! 用于把相关系数矩阵按簇重新排列：
//! 1. 矩阵平移为非负；
//! 2. 行列归一化 `D_r^{-1/2} A D_c^{-1/2}`；
//! 3. SVD，丢弃第一组奇异向量，保留之后的 `ceil(log2 k)` 组；
//! 4. 行、列向量一起做 k-means；
//! 5. 按行标签排列行、按列标签排列列，行列名称都沿用行的顺序。

use crate::types::{tensor_to_array, GnnError, GnnResult};
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis, Ix2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tch::Tensor;

pub const DEFAULT_CLUSTERS: usize = 5;

const SEED: u64 = 0;
const N_INIT: usize = 10;
const MAX_ITER: usize = 300;
const TOLERANCE: f64 = 1e-4;

/// 聚类后重新排列的矩阵
#[derive(Debug, Clone)]
pub struct Bicluster {
    /// 行（同时也是列）的名称
    pub names: Vec<String>,
    pub matrix: Array2<f64>,
    pub row_labels: Vec<usize>,
    pub column_labels: Vec<usize>,
}

pub fn spectral_bicluster(names: &[String], matrix: &Array2<f64>, n_clusters: usize) -> GnnResult<Bicluster> {
    let n = matrix.nrows();
    if matrix.ncols() != n {
        return Err(GnnError::DimensionMismatch { expected: n, actual: matrix.ncols() });
    }
    if names.len() != n {
        return Err(GnnError::DimensionMismatch { expected: n, actual: names.len() });
    }
    if n_clusters == 0 || n_clusters > n {
        return Err(GnnError::InvalidConfig(format!("簇数必须在 1..={} 内, 实际 {}", n, n_clusters)));
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(GnnError::Preprocessing("矩阵包含非有限值".to_string()));
    }

    let labels = if n_clusters == 1 {
        vec![0; 2 * n]
    } else {
        let (scaled, row_diag, col_diag) = scale_normalize(&make_nonnegative(matrix));
        let n_sv = (1 + (n_clusters as f64).log2().ceil() as usize).min(n);
        let (u, v) = singular_vectors(&scaled, n_sv)?;

        let z = concatenate(
            Axis(0),
            &[
                (&u * &row_diag.view().insert_axis(Axis(1))).view(),
                (&v * &col_diag.view().insert_axis(Axis(1))).view(),
            ],
        )?;

        let mut rng = StdRng::seed_from_u64(SEED);
        kmeans(&z, n_clusters, &mut rng)
    };

    let row_labels = labels[..n].to_vec();
    let column_labels = labels[n..].to_vec();
    let row_order = argsort(&row_labels);
    let column_order = argsort(&column_labels);
    tracing::debug!("谱协同聚类: {} 个节点, {} 个簇", n, n_clusters);

    Ok(Bicluster {
        names: row_order.iter().map(|&i| names[i].clone()).collect(),
        matrix: matrix.select(Axis(0), &row_order).select(Axis(1), &column_order),
        row_labels,
        column_labels,
    })
}

/// 稳定排序后的下标
fn argsort(labels: &[usize]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..labels.len()).collect();
    order.sort_by_key(|&i| labels[i]);
    order
}

fn make_nonnegative(matrix: &Array2<f64>) -> Array2<f64> {
    let min = matrix.fold(f64::INFINITY, |acc, &v| acc.min(v));
    if min < 0.0 {
        matrix - min
    } else {
        matrix.clone()
    }
}

/// 1/sqrt(sum)，和为 0 时取 0
fn inverse_sqrt(sums: Array1<f64>) -> Array1<f64> {
    sums.mapv(|v| {
        let d = 1.0 / v.sqrt();
        if d.is_finite() {
            d
        } else {
            0.0
        }
    })
}

fn scale_normalize(matrix: &Array2<f64>) -> (Array2<f64>, Array1<f64>, Array1<f64>) {
    let row_diag = inverse_sqrt(matrix.sum_axis(Axis(1)));
    let col_diag = inverse_sqrt(matrix.sum_axis(Axis(0)));
    let scaled = matrix * &row_diag.view().insert_axis(Axis(1)) * &col_diag.view().insert_axis(Axis(0));
    (scaled, row_diag, col_diag)
}

/// 左右奇异向量的第 1..n_sv 列
fn singular_vectors(matrix: &Array2<f64>, n_sv: usize) -> GnnResult<(Array2<f64>, Array2<f64>)> {
    let (rows, cols) = matrix.dim();
    let data: Vec<f64> = matrix.iter().copied().collect();
    let t = Tensor::from_slice(&data).view([rows as i64, cols as i64]);

    let (u, _, v) = t.svd(true, true);
    let keep = n_sv as i64 - 1;
    let u = tensor_to_array(&u.narrow(1, 1, keep))?.into_dimensionality::<Ix2>()?;
    let v = tensor_to_array(&v.narrow(1, 1, keep))?.into_dimensionality::<Ix2>()?;
    Ok((u, v))
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// 每个点最近的中心及总的簇内平方和
fn assign(data: &Array2<f64>, centers: &Array2<f64>) -> (Vec<usize>, f64) {
    let mut inertia = 0.0;
    let labels = data
        .rows()
        .into_iter()
        .map(|point| {
            let (label, dist) = centers
                .rows()
                .into_iter()
                .map(|center| squared_distance(point, center))
                .enumerate()
                .fold((0, f64::INFINITY), |best, (i, d)| if d < best.1 { (i, d) } else { best });
            inertia += dist;
            label
        })
        .collect();
    (labels, inertia)
}

/// 各簇均值；空簇保留原来的中心
fn compute_centroids(data: &Array2<f64>, labels: &[usize], previous: &Array2<f64>) -> Array2<f64> {
    let mut sums = Array2::<f64>::zeros(previous.dim());
    let mut counts = vec![0usize; previous.nrows()];

    for (point, &label) in data.rows().into_iter().zip(labels) {
        let mut row = sums.row_mut(label);
        row += &point;
        counts[label] += 1;
    }

    for (i, &count) in counts.iter().enumerate() {
        if count == 0 {
            sums.row_mut(i).assign(&previous.row(i));
        } else {
            sums.row_mut(i).mapv_inplace(|v| v / count as f64);
        }
    }
    sums
}

/// k-means++ 初始化：按到最近中心的平方距离加权抽样
fn kmeans_plus_plus(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let mut chosen = vec![rng.gen_range(0..n)];

    while chosen.len() < k {
        let distances: Vec<f64> = data
            .rows()
            .into_iter()
            .map(|point| {
                chosen
                    .iter()
                    .map(|&c| squared_distance(point, data.row(c)))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();

        let next = match WeightedIndex::new(&distances) {
            Ok(weights) => weights.sample(rng),
            // 所有点都与已选中心重合
            Err(_) => rng.gen_range(0..n),
        };
        chosen.push(next);
    }

    data.select(Axis(0), &chosen)
}

/// 多次初始化，取簇内平方和最小的结果
fn kmeans(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Vec<usize> {
    let variance = data.var_axis(Axis(0), 0.0).mean().unwrap_or(0.0);
    let tolerance = TOLERANCE * variance;
    let mut best: Option<(f64, Vec<usize>)> = None;

    for _ in 0..N_INIT {
        let mut centers = kmeans_plus_plus(data, k, rng);
        for _ in 0..MAX_ITER {
            let (labels, _) = assign(data, &centers);
            let updated = compute_centroids(data, &labels, &centers);
            let shift = (&updated - &centers).mapv(|v| v * v).sum();
            centers = updated;
            if shift <= tolerance {
                break;
            }
        }

        let (labels, inertia) = assign(data, &centers);
        if best.as_ref().map_or(true, |(b, _)| inertia < *b) {
            best = Some((inertia, labels));
        }
    }

    best.map(|(_, labels)| labels).unwrap_or_else(|| vec![0; data.nrows()])
}
