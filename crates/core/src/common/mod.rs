use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod time;

/// # Summary
/// 行情数据来源枚举，标识 K 线数据由哪个外部提供商抓取。
///
/// # Invariants
/// - 序列化形式必须与数据库 `source` 列及配置文件中的小写字符串一致。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    // 币安 (加密货币现货)
    Binance,
    // Yahoo Finance (股票/ETF)
    Yahoo,
    // Finnhub (股票)
    Finnhub,
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "binance" => Ok(Source::Binance),
            "yahoo" => Ok(Source::Yahoo),
            "finnhub" => Ok(Source::Finnhub),
            _ => Err(format!("Unknown source: {}", s)),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Binance => write!(f, "binance"),
            Source::Yahoo => write!(f, "yahoo"),
            Source::Finnhub => write!(f, "finnhub"),
        }
    }
}

/// # Summary
/// 交易时间周期枚举，定义 K 线的时间跨度。
///
/// # Invariants
/// - 序列化形式必须与数据库 `interval` 列中的字符串一致。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Interval {
    // 1分钟
    #[serde(rename = "1m")]
    Minute1,
    // 5分钟
    #[serde(rename = "5m")]
    Minute5,
    // 15分钟
    #[serde(rename = "15m")]
    Minute15,
    // 30分钟
    #[serde(rename = "30m")]
    Minute30,
    // 1小时
    #[serde(rename = "1h")]
    Hour1,
    // 1日
    #[serde(rename = "1d")]
    Day1,
    // 1周
    #[serde(rename = "1w")]
    Week1,
    // 1月
    #[serde(rename = "1mo")]
    Month1,
}

impl Interval {
    /// # Summary
    /// 返回该周期单根 K 线覆盖的时间跨度。
    ///
    /// # Logic
    /// 月线按 30 天近似处理，其余周期为精确值。
    ///
    /// # Returns
    /// 对应的 `chrono::Duration`。
    pub fn period(self) -> Duration {
        match self {
            Interval::Minute1 => Duration::minutes(1),
            Interval::Minute5 => Duration::minutes(5),
            Interval::Minute15 => Duration::minutes(15),
            Interval::Minute30 => Duration::minutes(30),
            Interval::Hour1 => Duration::hours(1),
            Interval::Day1 => Duration::days(1),
            Interval::Week1 => Duration::weeks(1),
            Interval::Month1 => Duration::days(30),
        }
    }
}

impl FromStr for Interval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" | "minute1" => Ok(Interval::Minute1),
            "5m" | "minute5" => Ok(Interval::Minute5),
            "15m" | "minute15" => Ok(Interval::Minute15),
            "30m" | "minute30" => Ok(Interval::Minute30),
            "60m" | "1h" | "hour1" => Ok(Interval::Hour1),
            "1d" | "day1" => Ok(Interval::Day1),
            "1w" | "week1" => Ok(Interval::Week1),
            "1mo" | "month1" => Ok(Interval::Month1),
            _ => Err(format!("Unknown interval: {}", s)),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interval::Minute1 => write!(f, "1m"),
            Interval::Minute5 => write!(f, "5m"),
            Interval::Minute15 => write!(f, "15m"),
            Interval::Minute30 => write!(f, "30m"),
            Interval::Hour1 => write!(f, "1h"),
            Interval::Day1 => write!(f, "1d"),
            Interval::Week1 => write!(f, "1w"),
            Interval::Month1 => write!(f, "1mo"),
        }
    }
}

/// # Summary
/// 时间序列身份实体，唯一标识一条逻辑 K 线序列。
///
/// # Invariants
/// - 三元组 `(symbol, source, interval)` 在存储层与缓存层中作为主键使用，
///   构造后不可变更。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    // 资产代码 (例如: BTCUSDT, AAPL)
    pub symbol: String,
    // 数据来源
    pub source: Source,
    // K 线周期
    pub interval: Interval,
}

impl SeriesKey {
    /// 构造一个新的序列身份。
    pub fn new(symbol: impl Into<String>, source: Source, interval: Interval) -> Self {
        Self {
            symbol: symbol.into(),
            source,
            interval,
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.symbol, self.source, self.interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_round_trips_through_str() {
        for s in ["1m", "5m", "15m", "30m", "1h", "1d", "1w", "1mo"] {
            let interval: Interval = s.parse().unwrap();
            assert_eq!(interval.to_string(), s);
        }
        // 兼容别名
        assert_eq!("60m".parse::<Interval>().unwrap(), Interval::Hour1);
    }

    #[test]
    fn interval_period_is_proportional() {
        assert_eq!(Interval::Minute5.period(), Duration::minutes(5));
        assert_eq!(Interval::Day1.period(), Duration::days(1));
        assert!(Interval::Week1.period() > Interval::Day1.period());
    }

    #[test]
    fn source_serde_uses_lowercase() {
        let json = serde_json::to_string(&Source::Binance).unwrap();
        assert_eq!(json, "\"binance\"");
        assert_eq!("finnhub".parse::<Source>().unwrap(), Source::Finnhub);
    }

    #[test]
    fn series_key_display_is_stable() {
        let key = SeriesKey::new("BTCUSDT", Source::Binance, Interval::Day1);
        assert_eq!(key.to_string(), "BTCUSDT:binance:1d");
    }
}
