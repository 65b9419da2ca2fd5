use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// # Summary
/// 单行技术指标实体，对应一根已完成预热的 K 线。
///
/// # Invariants
/// - 所有指标字段均已完成各自的预热期，不包含未定义值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRow {
    // 对应 K 线的开始时间
    pub time: DateTime<Utc>,
    // 收盘价
    pub close: f64,
    // 14 周期相对强弱指数
    pub rsi_14: f64,
    // MACD 快慢线差值 (12/26)
    pub macd: f64,
    // MACD 信号线 (9)
    pub macd_signal: f64,
    // 14 周期平均真实波幅
    pub atr_14: f64,
    // 14 周期平均趋向指数
    pub adx: f64,
    // 能量潮 (累计成交量流向)
    pub obv: f64,
}

/// # Summary
/// 交易建议动作枚举。
///
/// # Invariants
/// - 序列化形式必须与数据库 `recommendation` 列的 CHECK 约束一致。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecAction {
    Buy,
    Sell,
    Hold,
}

impl FromStr for RecAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "buy" => Ok(RecAction::Buy),
            "sell" => Ok(RecAction::Sell),
            "hold" => Ok(RecAction::Hold),
            _ => Err(format!("Unknown recommendation: {}", s)),
        }
    }
}

impl fmt::Display for RecAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecAction::Buy => write!(f, "buy"),
            RecAction::Sell => write!(f, "sell"),
            RecAction::Hold => write!(f, "hold"),
        }
    }
}

/// # Summary
/// 单行交易信号实体：指标行叠加规则层产出的信号标志与综合评分。
///
/// # Invariants
/// - `score` 恒等于三个信号分量之和。
/// - `recommendation` 由 `score` 的符号唯一确定。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    // 对应 K 线的开始时间
    pub time: DateTime<Utc>,
    // 收盘价
    pub close: f64,
    // 14 周期相对强弱指数
    pub rsi_14: f64,
    // MACD 快慢线差值
    pub macd: f64,
    // MACD 信号线
    pub macd_signal: f64,
    // 14 周期平均真实波幅
    pub atr_14: f64,
    // 14 周期平均趋向指数
    pub adx: f64,
    // 能量潮
    pub obv: f64,
    // 动量趋势信号 (0/1)
    pub sig_momentum_trend: i64,
    // 均值回归信号 (-1/0/1)
    pub sig_mean_reversion: i64,
    // 量能信号 (0/1)
    pub sig_volume: i64,
    // 综合评分 (信号分量之和)
    pub score: i64,
    // 由评分映射出的建议动作
    pub recommendation: RecAction,
}
