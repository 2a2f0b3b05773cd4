//! MTGNN 股价预测与投资分析命令行

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gnn::analysis::{spectral_bicluster, DEFAULT_CLUSTERS};
use invest::data::{parse_matrix, write_matrix};
use invest::prediction;
use invest::validation::process_benchmark_metrics;
use invest::{CsvSource, InvestConfig, PriceSource};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "invest")]
#[command(about = "MTGNN share-price forecasting and portfolio analysis")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 配置文件路径
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// 训练 MTGNN 并写入检查点
    Train,

    /// 预测某一年的股价走势
    Predict {
        #[arg(short, long)]
        year: i32,
    },

    /// 基准指数的业绩报告
    Benchmark {
        #[arg(long)]
        start: i32,

        #[arg(long)]
        end: i32,

        /// 基准指数代码，对应 `<data_dir>/<index>.csv`
        #[arg(short, long)]
        index: String,

        /// 年内卖出的交易日，负数从年末倒数
        #[arg(long, default_value = "-1", allow_hyphen_values = true)]
        holding_period: i64,
    },

    /// 对相关系数矩阵做谱协同聚类
    Cluster {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long)]
        output: PathBuf,

        #[arg(short = 'k', long, default_value_t = DEFAULT_CLUSTERS)]
        clusters: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = InvestConfig::load_or_default(&cli.config)
        .with_context(|| format!("读取配置 {} 失败", cli.config.display()))?;
    let source = CsvSource::from_config(&config);

    match cli.command {
        Commands::Train => {
            let prices = source.prices(&config.dataset).await?;
            let checkpoint = config.checkpoint_dir();
            let summary = tokio::task::spawn_blocking(move || prediction::train(&prices, &config, &checkpoint))
                .await??;
            if let Some(last) = summary.history.last() {
                info!("训练完成: {} 个 epoch, 最后训练损失 {:.4}", summary.history.len(), last.train_loss);
            }
        }
        Commands::Predict { year } => {
            let movements = prediction::future_share_price_performance(year, &config, &source).await?;
            println!("========== {} 年股价走势 ==========", year);
            for (asset, movement) in &movements {
                println!("{:<12} {:>4} ({})", asset, movement.code(), movement);
            }
        }
        Commands::Benchmark { start, end, index, holding_period } => {
            let benchmark = source.benchmark(&index).await?;
            let risk_free = source.risk_free().await?;
            let report = process_benchmark_metrics(&benchmark, &risk_free, start, end, &index, holding_period)?;
            report.print_report();
        }
        Commands::Cluster { input, output, clusters } => {
            let content = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("读取 {} 失败", input.display()))?;
            let (names, matrix) = parse_matrix(&content)?;
            let bicluster = spectral_bicluster(&names, &matrix, clusters)?;
            write_matrix(&output, &bicluster.names, &bicluster.matrix)?;
            info!("聚类结果已写入 {}", output.display());
        }
    }

    Ok(())
}
