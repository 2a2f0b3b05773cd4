//! 结果分析工具

pub mod cluster;

pub use cluster::{spectral_bicluster, Bicluster, DEFAULT_CLUSTERS};
