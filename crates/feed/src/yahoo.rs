use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use stocklens_core::common::{Interval, SeriesKey};
use stocklens_core::market::entity::Candle;
use stocklens_core::market::error::FetchError;
use stocklens_core::market::port::MarketDataProvider;
use tracing::debug;

const YAHOO_BASE: &str = "https://query1.finance.yahoo.com";

/// # Summary
/// Yahoo Finance 行情提供者实现，走 v8 chart 接口。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端进行通讯，设置伪装浏览器 User-Agent
///   以减少被拦截风险。
pub struct YahooProvider {
    // 内部使用的 HTTP 客户端
    client: Client,
    // 接口基地址
    base_url: String,
}

impl YahooProvider {
    /// # Summary
    /// 创建一个新的 YahooProvider 实例。
    ///
    /// # Logic
    /// 1. 配置 10 秒超时。
    /// 2. 设置浏览器 User-Agent Header。
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(YAHOO_BASE)
    }

    /// 使用自定义基地址创建实例。
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
            ),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// 周期到 chart 接口 interval 参数的映射。
    fn interval_code(interval: Interval) -> &'static str {
        match interval {
            Interval::Minute1 => "1m",
            Interval::Minute5 => "5m",
            Interval::Minute15 => "15m",
            Interval::Minute30 => "30m",
            Interval::Hour1 => "60m",
            Interval::Day1 => "1d",
            Interval::Week1 => "1wk",
            Interval::Month1 => "1mo",
        }
    }
}

/// Yahoo chart 接口响应顶层结构。
#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: Chart,
}

#[derive(Deserialize, Debug)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Deserialize, Debug)]
struct ChartError {
    description: String,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
}

/// OHLCV 列数组，Yahoo 用 null 表示停牌等缺失点
#[derive(Deserialize, Debug)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// # Summary
/// 将 chart 响应压成标准 Candle 序列。
///
/// # Logic
/// 1. 接口自报错误时映射为 `NotFound`。
/// 2. 按索引对齐时间戳与五个列数组，任一缺失的行整体丢弃。
/// 3. 升序排列后截取最近 `limit` 根。
fn chart_to_candles(response: ChartResponse, limit: usize) -> Result<Vec<Candle>, FetchError> {
    if let Some(error) = response.chart.error {
        return Err(FetchError::Parse(error.description));
    }

    let result = response
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
        .ok_or(FetchError::NotFound)?;

    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or(FetchError::NotFound)?;

    let mut candles = Vec::with_capacity(result.timestamp.len());
    for (i, ts) in result.timestamp.iter().enumerate() {
        let row = (
            quote.open.get(i).copied().flatten(),
            quote.high.get(i).copied().flatten(),
            quote.low.get(i).copied().flatten(),
            quote.close.get(i).copied().flatten(),
            quote.volume.get(i).copied().flatten(),
        );
        if let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = row {
            let time = Utc
                .timestamp_opt(*ts, 0)
                .single()
                .ok_or_else(|| FetchError::Parse(format!("invalid timestamp: {}", ts)))?;
            candles.push(Candle {
                time,
                open,
                high,
                low,
                close,
                volume,
            });
        }
    }

    candles.sort_by_key(|c| c.time);
    candles.dedup_by_key(|c| c.time);
    if candles.len() > limit {
        candles.drain(..candles.len() - limit);
    }
    Ok(candles)
}

#[async_trait]
impl MarketDataProvider for YahooProvider {
    /// # Summary
    /// 抓取 K 线数据。
    ///
    /// # Logic
    /// 1. `from` 存在时以其为 `period1`，否则按 `limit × 周期` 回溯。
    /// 2. 执行请求并按状态码映射错误。
    /// 3. 解析 chart 响应并规范化输出。
    async fn fetch_candles(
        &self,
        key: &SeriesKey,
        from: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        let now = Utc::now();
        let lookback = key.interval.period() * i32::try_from(limit.clamp(1, 10_000)).unwrap_or(10_000);
        let period1 = from.unwrap_or(now - lookback).timestamp();
        let period2 = now.timestamp();

        let url = format!("{}/v8/finance/chart/{}", self.base_url, key.symbol);
        let response = self
            .client
            .get(url)
            .query(&[
                ("interval", Self::interval_code(key.interval).to_string()),
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FetchError::RateLimited);
        }
        if status.as_u16() == 404 {
            return Err(FetchError::NotFound);
        }
        if !status.is_success() {
            return Err(FetchError::Network(format!("HTTP {}", status)));
        }

        let parsed: ChartResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;
        let candles = chart_to_candles(parsed, limit)?;
        debug!(symbol = %key.symbol, rows = candles.len(), "yahoo chart fetched");
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [1704067200, 1704153600, 1704240000],
                "indicators": {
                    "quote": [{
                        "open":   [185.0, null, 187.2],
                        "high":   [186.5, 188.0, 189.0],
                        "low":    [184.0, 185.5, 186.8],
                        "close":  [186.0, 187.1, 188.4],
                        "volume": [52000000.0, 48000000.0, 61000000.0]
                    }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn rows_with_null_points_are_dropped() {
        let parsed: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        let candles = chart_to_candles(parsed, 100).unwrap();
        // 中间一行 open 为 null，被整体丢弃
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 186.0);
        assert_eq!(candles[1].close, 188.4);
        assert!(candles[0].time < candles[1].time);
    }

    #[test]
    fn result_is_truncated_to_most_recent_limit() {
        let parsed: ChartResponse = serde_json::from_str(SAMPLE).unwrap();
        let candles = chart_to_candles(parsed, 1).unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 188.4);
    }

    #[test]
    fn api_error_surfaces_description() {
        let body = r#"{
            "chart": { "result": null,
                       "error": { "code": "Not Found", "description": "No data found" } }
        }"#;
        let parsed: ChartResponse = serde_json::from_str(body).unwrap();
        let err = chart_to_candles(parsed, 10).unwrap_err();
        assert!(matches!(err, FetchError::Parse(desc) if desc == "No data found"));
    }

    #[test]
    fn empty_result_is_not_found() {
        let body = r#"{ "chart": { "result": [], "error": null } }"#;
        let parsed: ChartResponse = serde_json::from_str(body).unwrap();
        assert!(matches!(
            chart_to_candles(parsed, 10),
            Err(FetchError::NotFound)
        ));
    }

    #[test]
    fn hourly_interval_maps_to_60m() {
        assert_eq!(YahooProvider::interval_code(Interval::Hour1), "60m");
        assert_eq!(YahooProvider::interval_code(Interval::Week1), "1wk");
    }
}
