//! 组合与基准的业绩验证
//!
//! 按日历年 `[start_year, end_year)` 计算年度收益、复合收益（CR）、
//! 平均年度收益（AAR）以及 Treynor / Sharpe 比率。

use crate::data::{BenchmarkTable, RiskFreeTable};
use crate::metrics;
use crate::types::{InvestError, InvestResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 业绩报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    /// 例如 `IP.JSE` 或 `Benchmark.J200`
    pub label: String,
    pub start_year: i32,
    pub annual_returns: Vec<f64>,
    pub compound_return: f64,
    pub average_annual_return: f64,
    pub treynor_ratio: f64,
    pub sharpe_ratio: f64,
}

impl PerformanceReport {
    pub fn print_report(&self) {
        let annual: Vec<String> = self
            .annual_returns
            .iter()
            .map(|r| format!("{:.2}%", r * 100.0))
            .collect();

        println!("========== {} ==========", self.label);
        println!("年度收益率 (自 {} 年): [{}]", self.start_year, annual.join(", "));
        println!(
            "{} | CR {:5.2}% | AAR {:5.2}%",
            self.label,
            self.compound_return * 100.0,
            self.average_annual_return * 100.0
        );
        println!(
            "{} | Treynor Ratio {:5.2} | Sharpe Ratio {:5.2}",
            self.label, self.treynor_ratio, self.sharpe_ratio
        );
        println!("==============================");
    }
}

/// 组合每年年初/年末的持仓价值与各股 beta
#[derive(Debug, Clone, Default)]
pub struct YearlyHoldings {
    pub initial: BTreeMap<i32, Vec<f64>>,
    pub current: BTreeMap<i32, Vec<f64>>,
    pub betas: BTreeMap<i32, Vec<f64>>,
}

impl YearlyHoldings {
    fn get(map: &BTreeMap<i32, Vec<f64>>, year: i32) -> InvestResult<&[f64]> {
        map.get(&year).map(Vec::as_slice).ok_or(InvestError::MissingYear(year))
    }

    fn initial_sum(&self, year: i32) -> InvestResult<f64> {
        Ok(Self::get(&self.initial, year)?.iter().sum())
    }
}

fn check_years(start_year: i32, end_year: i32) -> InvestResult<u32> {
    if end_year <= start_year {
        return Err(InvestError::InvalidConfig(format!(
            "结束年份 {} 必须大于开始年份 {}",
            end_year, start_year
        )));
    }
    Ok((end_year - start_year) as u32)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// 每年年末无风险利率（小数）
fn risk_free_rates(rf_table: &RiskFreeTable, start_year: i32, end_year: i32) -> InvestResult<Vec<f64>> {
    (start_year..end_year)
        .map(|year| Ok(rf_table.year_end_rate(year)? / 100.0))
        .collect()
}

/// 超额收益的离差: sqrt(Σ(annual_i - rf_i - δ)^2)，δ = AAR - mean(rf)
fn excess_return_deviation(annual_returns: &[f64], rf: &[f64], average_annual_return: f64) -> f64 {
    let delta = average_annual_return - mean(rf);
    annual_returns
        .iter()
        .zip(rf)
        .map(|(annual, rate)| (annual - rate - delta).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// 组合的 CR / AAR 及风险调整指标
pub fn process_metrics(
    rf_table: &RiskFreeTable,
    holdings: &YearlyHoldings,
    start_year: i32,
    end_year: i32,
    index_code: &str,
) -> InvestResult<PerformanceReport> {
    let years = check_years(start_year, end_year)?;

    let mut annual_returns = Vec::with_capacity(years as usize);
    let mut total_return = 0.0;
    for year in start_year..end_year {
        let initial = YearlyHoldings::get(&holdings.initial, year)?;
        let current = YearlyHoldings::get(&holdings.current, year)?;
        let value = current.iter().sum::<f64>() - initial.iter().sum::<f64>();
        total_return += value;
        annual_returns.push(if value.abs() > 0.0 { metrics::annual_return(initial, current) } else { 0.0 });
    }

    // 第一个有持仓的年份作为初始价值
    let mut pv = holdings.initial_sum(start_year)?;
    let mut year = start_year;
    while pv == 0.0 && year != end_year - 1 {
        year += 1;
        pv = holdings.initial_sum(year)?;
    }
    let fv = pv + total_return;
    let compound_return = if (fv - pv).abs() > 0.0 { metrics::compound_return(pv, fv, years) } else { 0.0 };
    let average_annual_return = metrics::average_annual_return(&annual_returns);

    let (treynor_ratio, sharpe_ratio) = process_risk_adjusted_return_metrics(
        rf_table,
        &holdings.betas,
        start_year,
        end_year,
        compound_return,
        average_annual_return,
        &annual_returns,
    )?;

    let report = PerformanceReport {
        label: format!("IP.{}", index_code),
        start_year,
        annual_returns,
        compound_return,
        average_annual_return,
        treynor_ratio,
        sharpe_ratio,
    };
    tracing::info!(
        "{} | CR {:.4} | AAR {:.4} | Treynor {:.4} | Sharpe {:.4}",
        report.label,
        report.compound_return,
        report.average_annual_return,
        report.treynor_ratio,
        report.sharpe_ratio
    );
    Ok(report)
}

/// 组合的 Treynor / Sharpe 比率
///
/// 组合收益取 CR 的百分数；beta 为所有年份所有个股 beta 的均值，不为正时
/// Treynor 记为 0。
pub fn process_risk_adjusted_return_metrics(
    rf_table: &RiskFreeTable,
    betas: &BTreeMap<i32, Vec<f64>>,
    start_year: i32,
    end_year: i32,
    compound_return: f64,
    average_annual_return: f64,
    annual_returns: &[f64],
) -> InvestResult<(f64, f64)> {
    let portfolio_return = compound_return * 100.0;

    let mut all_betas = Vec::new();
    for year in start_year..end_year {
        all_betas.extend_from_slice(YearlyHoldings::get(betas, year)?);
    }
    let rf = risk_free_rates(rf_table, start_year, end_year)?;
    let beta = mean(&all_betas);
    let risk_free_rate = mean(&rf);

    let treynor = if beta > 0.0 { metrics::treynor_ratio(portfolio_return, risk_free_rate, beta) } else { 0.0 };
    let deviation = excess_return_deviation(annual_returns, &rf, average_annual_return);
    let sharpe = metrics::sharpe_ratio(portfolio_return, risk_free_rate, deviation);

    Ok((treynor, sharpe))
}

/// `holding_period` 为负时从年末倒数（-1 为最后一个交易日）
fn holding_index(len: usize, holding_period: i64) -> Option<usize> {
    if holding_period < 0 {
        len.checked_sub(holding_period.unsigned_abs() as usize)
    } else {
        let index = holding_period as usize;
        (index < len).then_some(index)
    }
}

fn first_close(benchmark: &BenchmarkTable, year: i32) -> InvestResult<f64> {
    benchmark
        .closes_in_year(year)
        .first()
        .copied()
        .ok_or(InvestError::MissingYear(year))
}

/// 基准指数的 CR / AAR 及风险调整指标
pub fn process_benchmark_metrics(
    benchmark: &BenchmarkTable,
    rf_table: &RiskFreeTable,
    start_year: i32,
    end_year: i32,
    index_code: &str,
    holding_period: i64,
) -> InvestResult<PerformanceReport> {
    let years = check_years(start_year, end_year)?;

    let mut annual_returns = Vec::with_capacity(years as usize);
    let mut total_return = 0.0;
    for year in start_year..end_year {
        let closes = benchmark.closes_in_year(year);
        let pv = *closes.first().ok_or(InvestError::MissingYear(year))?;
        let fv = holding_index(closes.len(), holding_period)
            .map(|i| closes[i])
            .ok_or_else(|| {
                InvestError::Data(format!("{} 年只有 {} 个交易日, 持有期 {}", year, closes.len(), holding_period))
            })?;

        let value = fv - pv;
        total_return += value;
        annual_returns.push(if value.abs() > 0.0 { metrics::annual_return(&[pv], &[fv]) } else { 0.0 });
    }

    let mut pv = first_close(benchmark, start_year)?;
    let mut year = start_year;
    while pv == 0.0 && year != end_year {
        year += 1;
        pv = first_close(benchmark, year)?;
    }
    let fv = pv + total_return;
    let compound_return = metrics::compound_return(pv, fv, years);
    let average_annual_return = metrics::average_annual_return(&annual_returns);

    let rf = risk_free_rates(rf_table, start_year, end_year)?;
    let beta = mean(&benchmark.betas_in_year(start_year));
    let portfolio_return = compound_return * 100.0;
    let risk_free_rate = mean(&rf);

    let treynor_ratio = if beta == 0.0 { 0.0 } else { metrics::treynor_ratio(portfolio_return, risk_free_rate, beta) };
    let deviation = excess_return_deviation(&annual_returns, &rf, average_annual_return);
    let sharpe_ratio = metrics::sharpe_ratio(portfolio_return, risk_free_rate, deviation);

    let report = PerformanceReport {
        label: format!("Benchmark.{}", index_code),
        start_year,
        annual_returns,
        compound_return,
        average_annual_return,
        treynor_ratio,
        sharpe_ratio,
    };
    tracing::info!(
        "{} | CR {:.4} | AAR {:.4} | Treynor {:.4} | Sharpe {:.4}",
        report.label,
        report.compound_return,
        report.average_annual_return,
        report.treynor_ratio,
        report.sharpe_ratio
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::BenchmarkRow;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rf_table() -> RiskFreeTable {
        RiskFreeTable::from_rows(vec![
            (date(2015, 6, 30), 4.0),
            (date(2015, 12, 31), 5.0),
            (date(2016, 12, 30), 7.0),
        ])
    }

    fn holdings() -> YearlyHoldings {
        let mut h = YearlyHoldings::default();
        h.initial.insert(2015, vec![100.0, 100.0]);
        h.current.insert(2015, vec![110.0, 100.0]);
        h.initial.insert(2016, vec![105.0, 105.0]);
        h.current.insert(2016, vec![105.0, 105.0]);
        h.betas.insert(2015, vec![1.0, 2.0]);
        h.betas.insert(2016, vec![1.5]);
        h
    }

    #[test]
    fn test_process_metrics() {
        let report = process_metrics(&rf_table(), &holdings(), 2015, 2017, "JSE").unwrap();

        assert_eq!(report.label, "IP.JSE");
        assert_eq!(report.annual_returns, vec![0.05, 0.0]);
        let cr = 1.05f64.sqrt() - 1.0;
        assert!((report.compound_return - cr).abs() < 1e-12);
        assert!((report.average_annual_return - 0.025).abs() < 1e-12);

        // beta = mean(1, 2, 1.5)，rf = (0.05, 0.07)
        let treynor = (cr * 100.0 - 0.06) / 1.5;
        assert!((report.treynor_ratio - treynor).abs() < 1e-9);
        let sd = (2.0 * 0.035f64.powi(2)).sqrt();
        assert!((report.sharpe_ratio - (cr * 100.0 - 0.06) / sd).abs() < 1e-6);
    }

    #[test]
    fn test_initial_value_skips_empty_years() {
        let mut h = holdings();
        h.initial.insert(2015, vec![0.0, 0.0]);
        h.current.insert(2015, vec![0.0, 0.0]);

        let report = process_metrics(&rf_table(), &h, 2015, 2017, "JSE").unwrap();
        assert_eq!(report.annual_returns, vec![0.0, 0.0]);
        assert_eq!(report.compound_return, 0.0);
    }

    #[test]
    fn test_non_positive_beta_gives_zero_treynor() {
        let mut h = holdings();
        h.betas.insert(2015, vec![-1.0, -2.0]);
        h.betas.insert(2016, vec![1.5]);

        let report = process_metrics(&rf_table(), &h, 2015, 2017, "JSE").unwrap();
        assert_eq!(report.treynor_ratio, 0.0);
        assert!(report.sharpe_ratio > 0.0);
    }

    #[test]
    fn test_missing_year_is_an_error() {
        let mut h = holdings();
        h.current.remove(&2016);
        assert!(matches!(
            process_metrics(&rf_table(), &h, 2015, 2017, "JSE"),
            Err(InvestError::MissingYear(2016))
        ));
        assert!(process_metrics(&rf_table(), &holdings(), 2017, 2015, "JSE").is_err());
    }

    fn benchmark() -> BenchmarkTable {
        let row = |y, m, d, close, beta| BenchmarkRow { date: date(y, m, d), close, beta };
        BenchmarkTable::from_rows(vec![
            row(2015, 1, 2, 100.0, Some(0.8)),
            row(2015, 6, 1, 105.0, Some(1.2)),
            row(2015, 12, 31, 110.0, None),
            row(2016, 1, 4, 110.0, Some(3.0)),
            row(2016, 12, 30, 99.0, None),
        ])
    }

    #[test]
    fn test_benchmark_metrics() {
        let report = process_benchmark_metrics(&benchmark(), &rf_table(), 2015, 2017, "J200", -1).unwrap();

        assert_eq!(report.label, "Benchmark.J200");
        assert!((report.annual_returns[0] - 0.1).abs() < 1e-12);
        assert!((report.annual_returns[1] + 0.1).abs() < 1e-12);
        let cr = 0.99f64.sqrt() - 1.0;
        assert!((report.compound_return - cr).abs() < 1e-12);
        assert!(report.average_annual_return.abs() < 1e-12);
        // beta 只取开始年份: mean(0.8, 1.2) = 1
        assert!((report.treynor_ratio - (cr * 100.0 - 0.06)).abs() < 1e-9);
    }

    #[test]
    fn test_benchmark_without_start_year_betas() {
        let row = |y, m, d, close, beta| BenchmarkRow { date: date(y, m, d), close, beta };
        let benchmark = BenchmarkTable::from_rows(vec![
            row(2015, 1, 2, 100.0, None),
            row(2015, 12, 31, 110.0, None),
            row(2016, 1, 4, 110.0, Some(2.0)),
            row(2016, 12, 30, 121.0, Some(2.0)),
        ]);

        let report = process_benchmark_metrics(&benchmark, &rf_table(), 2015, 2017, "J200", -1).unwrap();
        assert_eq!(report.treynor_ratio, 0.0);
        // 100 -> 121, 两年
        assert!((report.compound_return - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_benchmark_initial_value_skips_zero_close() {
        let row = |y, m, d, close, beta| BenchmarkRow { date: date(y, m, d), close, beta };
        let benchmark = BenchmarkTable::from_rows(vec![
            row(2015, 1, 2, 0.0, Some(1.0)),
            row(2015, 12, 31, 0.0, None),
            row(2016, 1, 4, 100.0, None),
            row(2016, 12, 30, 110.0, None),
        ]);

        let report = process_benchmark_metrics(&benchmark, &rf_table(), 2015, 2017, "J200", -1).unwrap();
        assert_eq!(report.annual_returns[0], 0.0);
        assert!((report.annual_returns[1] - 0.1).abs() < 1e-12);
        // pv 取 2016 年的 100, fv = 100 + 10
        assert!((report.compound_return - (1.1f64.sqrt() - 1.0)).abs() < 1e-12);
        assert!((report.treynor_ratio - (report.compound_return * 100.0 - 0.06)).abs() < 1e-9);
    }

    #[test]
    fn test_benchmark_holding_period() {
        let report = process_benchmark_metrics(&benchmark(), &rf_table(), 2015, 2016, "J200", 1).unwrap();
        assert!((report.annual_returns[0] - 0.05).abs() < 1e-12);

        assert!(process_benchmark_metrics(&benchmark(), &rf_table(), 2015, 2016, "J200", -4).is_err());
        assert_eq!(holding_index(3, -1), Some(2));
        assert_eq!(holding_index(3, 3), None);
    }
}
