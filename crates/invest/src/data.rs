//! 数据表读取
//!
//! - 价格表：每列一个资产，可带 `Date` 列
//! - 无风险利率表：`Date`, `RiskFreeRateOfReturn`（百分比）
//! - 基准指数表：`Date`, `Close`, `Beta Weekly Leveraged`，数值允许逗号作小数点
//! - 相关系数矩阵：第一列为行名

use crate::config::InvestConfig;
use crate::types::{InvestError, InvestResult};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use csv::StringRecord;
use ndarray::Array2;
use std::path::{Path, PathBuf};

const DATE_COLUMN: &str = "Date";
const RISK_FREE_COLUMN: &str = "RiskFreeRateOfReturn";
const CLOSE_COLUMN: &str = "Close";
const BETA_COLUMN: &str = "Beta Weekly Leveraged";

/// 解析 `YYYY-MM-DD` 或 `YYYY/MM/DD`
pub fn parse_date(value: &str) -> InvestResult<NaiveDate> {
    let value = value.trim();
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%Y/%m/%d"))
        .map_err(|_| InvestError::Data(format!("无法解析日期: {}", value)))
}

/// 解析数字，接受逗号小数点（`1234,5`）
pub fn parse_number(value: &str) -> InvestResult<f64> {
    let value = value.trim();
    value
        .replace(',', ".")
        .parse::<f64>()
        .map_err(|_| InvestError::Data(format!("无法解析数值: {}", value)))
}

fn column(headers: &StringRecord, name: &str) -> InvestResult<usize> {
    headers
        .iter()
        .position(|h| h.trim() == name)
        .ok_or_else(|| InvestError::Data(format!("缺少列: {}", name)))
}

fn field<'a>(record: &'a StringRecord, index: usize) -> InvestResult<&'a str> {
    record
        .get(index)
        .ok_or_else(|| InvestError::Data(format!("第 {} 列缺失", index + 1)))
}

fn reader(content: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new().has_headers(true).from_reader(content.as_bytes())
}

/// 每日价格表
#[derive(Debug, Clone)]
pub struct PriceTable {
    pub names: Vec<String>,
    pub dates: Option<Vec<NaiveDate>>,
    /// (天数, 资产数)
    pub values: Array2<f64>,
}

impl PriceTable {
    pub fn parse(content: &str) -> InvestResult<Self> {
        let mut rdr = reader(content);
        let headers = rdr.headers()?.clone();
        let date_index = headers.iter().position(|h| h.trim() == DATE_COLUMN);
        let names: Vec<String> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != date_index)
            .map(|(_, h)| h.trim().to_string())
            .collect();
        if names.is_empty() {
            return Err(InvestError::Data("价格表没有资产列".to_string()));
        }

        let mut dates = Vec::new();
        let mut values = Vec::new();
        let mut rows = 0;
        for record in rdr.records() {
            let record = record?;
            for (i, value) in record.iter().enumerate() {
                if Some(i) == date_index {
                    dates.push(parse_date(value)?);
                } else {
                    values.push(parse_number(value)?);
                }
            }
            rows += 1;
        }

        Ok(Self {
            dates: date_index.map(|_| dates),
            values: Array2::from_shape_vec((rows, names.len()), values)
                .map_err(|e| InvestError::Data(format!("价格表行长度不一致: {}", e)))?,
            names,
        })
    }

    pub fn num_days(&self) -> usize {
        self.values.nrows()
    }
}

/// 无风险利率表
#[derive(Debug, Clone)]
pub struct RiskFreeTable {
    rows: Vec<(NaiveDate, f64)>,
}

impl RiskFreeTable {
    pub fn parse(content: &str) -> InvestResult<Self> {
        let mut rdr = reader(content);
        let headers = rdr.headers()?.clone();
        let date = column(&headers, DATE_COLUMN)?;
        let rate = column(&headers, RISK_FREE_COLUMN)?;

        let rows = rdr
            .records()
            .map(|record| {
                let record = record?;
                Ok((parse_date(field(&record, date)?)?, parse_number(field(&record, rate)?)?))
            })
            .collect::<InvestResult<Vec<_>>>()?;
        Ok(Self { rows })
    }

    pub fn from_rows(rows: Vec<(NaiveDate, f64)>) -> Self {
        Self { rows }
    }

    /// 该年最后一条记录的利率（百分比）
    pub fn year_end_rate(&self, year: i32) -> InvestResult<f64> {
        self.rows
            .iter()
            .rev()
            .find(|(date, _)| date.year() == year)
            .map(|(_, rate)| *rate)
            .ok_or(InvestError::MissingYear(year))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRow {
    pub date: NaiveDate,
    pub close: f64,
    pub beta: Option<f64>,
}

/// 基准指数表
#[derive(Debug, Clone)]
pub struct BenchmarkTable {
    rows: Vec<BenchmarkRow>,
}

impl BenchmarkTable {
    pub fn parse(content: &str) -> InvestResult<Self> {
        let mut rdr = reader(content);
        let headers = rdr.headers()?.clone();
        let date = column(&headers, DATE_COLUMN)?;
        let close = column(&headers, CLOSE_COLUMN)?;
        let beta = headers.iter().position(|h| h.trim() == BETA_COLUMN);

        let rows = rdr
            .records()
            .map(|record| {
                let record = record?;
                let beta = match beta.and_then(|i| record.get(i)).map(str::trim) {
                    Some(value) if !value.is_empty() => Some(parse_number(value)?),
                    _ => None,
                };
                Ok(BenchmarkRow {
                    date: parse_date(field(&record, date)?)?,
                    close: parse_number(field(&record, close)?)?,
                    beta,
                })
            })
            .collect::<InvestResult<Vec<_>>>()?;
        Ok(Self { rows })
    }

    pub fn from_rows(rows: Vec<BenchmarkRow>) -> Self {
        Self { rows }
    }

    fn in_year(&self, year: i32) -> impl Iterator<Item = &BenchmarkRow> {
        self.rows.iter().filter(move |row| row.date.year() == year)
    }

    pub fn closes_in_year(&self, year: i32) -> Vec<f64> {
        self.in_year(year).map(|row| row.close).collect()
    }

    pub fn betas_in_year(&self, year: i32) -> Vec<f64> {
        self.in_year(year).filter_map(|row| row.beta).collect()
    }
}

/// 读取方阵，第一列为行名，表头为列名
pub fn parse_matrix(content: &str) -> InvestResult<(Vec<String>, Array2<f64>)> {
    let mut rdr = reader(content);
    let headers = rdr.headers()?.clone();
    let names: Vec<String> = headers.iter().skip(1).map(|h| h.trim().to_string()).collect();

    let mut values = Vec::new();
    let mut rows = 0;
    for record in rdr.records() {
        let record = record?;
        for value in record.iter().skip(1) {
            values.push(parse_number(value)?);
        }
        rows += 1;
    }

    let matrix = Array2::from_shape_vec((rows, names.len()), values)
        .map_err(|e| InvestError::Data(format!("矩阵行长度不一致: {}", e)))?;
    Ok((names, matrix))
}

/// 写出方阵，行名与列名相同
pub fn write_matrix(path: &Path, names: &[String], matrix: &Array2<f64>) -> InvestResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    wtr.write_record(std::iter::once("").chain(names.iter().map(String::as_str)))?;
    for (name, row) in names.iter().zip(matrix.rows()) {
        let mut record = vec![name.clone()];
        record.extend(row.iter().map(|v| v.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// 数据源接口
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// 数据集的每日价格
    async fn prices(&self, dataset: &str) -> InvestResult<PriceTable>;

    /// 无风险利率
    async fn risk_free(&self) -> InvestResult<RiskFreeTable>;

    /// 基准指数
    async fn benchmark(&self, index_code: &str) -> InvestResult<BenchmarkTable>;
}

/// 从本地 CSV 目录读取
pub struct CsvSource {
    data_dir: PathBuf,
    risk_free_file: String,
}

impl CsvSource {
    pub fn new(data_dir: impl Into<PathBuf>, risk_free_file: impl Into<String>) -> Self {
        Self { data_dir: data_dir.into(), risk_free_file: risk_free_file.into() }
    }

    pub fn from_config(config: &InvestConfig) -> Self {
        Self::new(config.data_dir.clone(), config.risk_free_file.clone())
    }

    async fn read(&self, file: &str) -> InvestResult<String> {
        let path = self.data_dir.join(file);
        tracing::debug!("读取 {}", path.display());
        Ok(tokio::fs::read_to_string(&path).await?)
    }
}

#[async_trait]
impl PriceSource for CsvSource {
    async fn prices(&self, dataset: &str) -> InvestResult<PriceTable> {
        let table = PriceTable::parse(&self.read(&format!("{}.csv", dataset)).await?)?;
        tracing::info!("{}: {} 天, {} 个资产", dataset, table.num_days(), table.names.len());
        Ok(table)
    }

    async fn risk_free(&self) -> InvestResult<RiskFreeTable> {
        RiskFreeTable::parse(&self.read(&self.risk_free_file).await?)
    }

    async fn benchmark(&self, index_code: &str) -> InvestResult<BenchmarkTable> {
        BenchmarkTable::parse(&self.read(&format!("{}.csv", index_code)).await?)
    }
}
