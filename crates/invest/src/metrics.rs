//! 收益与风险调整收益指标
//!
//! 收益以小数表示（0.05 = 5%）。

/// 年度收益率: (Σcurrent - Σinitial) / Σinitial
pub fn annual_return(initial: &[f64], current: &[f64]) -> f64 {
    let initial: f64 = initial.iter().sum();
    let current: f64 = current.iter().sum();
    (current - initial) / initial
}

/// 复合收益率: (fv / pv)^(1/n) - 1
pub fn compound_return(pv: f64, fv: f64, years: u32) -> f64 {
    (fv / pv).powf(1.0 / years as f64) - 1.0
}

/// 平均年度收益率（算术平均），空序列为 0
pub fn average_annual_return(returns: &[f64]) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    returns.iter().sum::<f64>() / returns.len() as f64
}

/// Treynor 比率: (rp - rf) / beta
pub fn treynor_ratio(portfolio_return: f64, risk_free_rate: f64, beta: f64) -> f64 {
    (portfolio_return - risk_free_rate) / beta
}

/// Sharpe 比率: (rp - rf) / sd，sd 为 0 时为 0
pub fn sharpe_ratio(portfolio_return: f64, risk_free_rate: f64, std_dev: f64) -> f64 {
    if std_dev == 0.0 {
        return 0.0;
    }
    (portfolio_return - risk_free_rate) / std_dev
}
