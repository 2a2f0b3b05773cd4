//! # Invest
//!
//! 基于 MTGNN 预测的投资分析：股价走势分类、组合与基准指数的业绩验证。
//!
//! ## 主要模块
//!
//! - `config`: TOML 应用配置
//! - `data`: 价格表、无风险利率表、基准指数表的读取
//! - `metrics`: 收益与风险调整指标
//! - `validation`: 组合与基准的业绩报告
//! - `prediction`: 训练、推理与走势分类

pub mod config;
pub mod data;
pub mod metrics;
pub mod prediction;
pub mod types;
pub mod validation;

pub use config::InvestConfig;
pub use data::{BenchmarkTable, CsvSource, PriceSource, PriceTable, RiskFreeTable};
pub use types::{ClassificationBand, InvestError, InvestResult, PriceMovement};
pub use validation::{PerformanceReport, YearlyHoldings};
