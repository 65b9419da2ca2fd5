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

const FINNHUB_BASE: &str = "https://finnhub.io/api/v1";

/// # Summary
/// Finnhub 行情提供者实现，走 `/stock/candle` REST 接口。
///
/// # Invariants
/// - 每个请求携带 `token` 鉴权参数。
/// - 接口以列数组返回 OHLCV，`s` 字段标记请求状态。
pub struct FinnhubProvider {
    // 内部使用的 HTTP 客户端
    client: Client,
    // 接口基地址
    base_url: String,
    // API 鉴权密钥
    api_key: String,
}

impl FinnhubProvider {
    /// # Summary
    /// 创建一个新的 FinnhubProvider 实例。
    ///
    /// # Arguments
    /// * `api_key`: Finnhub API 密钥。
    pub fn new(api_key: impl Into<String>) -> Result<Self, FetchError> {
        Self::with_base_url(FINNHUB_BASE, api_key)
    }

    /// 使用自定义基地址创建实例。
    pub fn with_base_url(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// 周期到 Finnhub resolution 参数的映射。
    fn resolution_code(interval: Interval) -> &'static str {
        match interval {
            Interval::Minute1 => "1",
            Interval::Minute5 => "5",
            Interval::Minute15 => "15",
            Interval::Minute30 => "30",
            Interval::Hour1 => "60",
            Interval::Day1 => "D",
            Interval::Week1 => "W",
            Interval::Month1 => "M",
        }
    }
}

/// `/stock/candle` 响应：列数组形态的 OHLCV。
#[derive(Deserialize, Debug)]
struct CandleResponse {
    // 请求状态: "ok" / "no_data"
    s: String,
    #[serde(default)]
    t: Vec<i64>,
    #[serde(default)]
    o: Vec<f64>,
    #[serde(default)]
    h: Vec<f64>,
    #[serde(default)]
    l: Vec<f64>,
    #[serde(default)]
    c: Vec<f64>,
    #[serde(default)]
    v: Vec<f64>,
}

/// # Summary
/// 将列数组响应压成标准 Candle 序列。
///
/// # Logic
/// 1. `s != "ok"`（含 `no_data`）一律视为空结果，与上游约定一致。
/// 2. 按索引对齐六个列数组，长度不齐的尾部丢弃。
/// 3. 升序排列后截取最近 `limit` 根。
fn candle_response_to_candles(
    response: CandleResponse,
    limit: usize,
) -> Result<Vec<Candle>, FetchError> {
    if response.s != "ok" {
        return Ok(Vec::new());
    }

    let rows = response
        .t
        .len()
        .min(response.o.len())
        .min(response.h.len())
        .min(response.l.len())
        .min(response.c.len())
        .min(response.v.len());

    let mut candles = Vec::with_capacity(rows);
    for i in 0..rows {
        let time = Utc
            .timestamp_opt(response.t[i], 0)
            .single()
            .ok_or_else(|| FetchError::Parse(format!("invalid timestamp: {}", response.t[i])))?;
        candles.push(Candle {
            time,
            open: response.o[i],
            high: response.h[i],
            low: response.l[i],
            close: response.c[i],
            volume: response.v[i],
        });
    }

    candles.sort_by_key(|c| c.time);
    candles.dedup_by_key(|c| c.time);
    if candles.len() > limit {
        candles.drain(..candles.len() - limit);
    }
    Ok(candles)
}

#[async_trait]
impl MarketDataProvider for FinnhubProvider {
    /// # Summary
    /// 抓取 K 线数据。
    ///
    /// # Logic
    /// 1. `from` 存在时以其为起点，否则按 `limit × 周期` 回溯；
    ///    终点为当前时间。
    /// 2. 执行请求，429 映射为限流，401/403 映射为鉴权错误。
    /// 3. 解析列数组响应并规范化输出。
    async fn fetch_candles(
        &self,
        key: &SeriesKey,
        from: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        let now = Utc::now();
        let lookback = key.interval.period() * i32::try_from(limit.clamp(1, 10_000)).unwrap_or(10_000);
        let start = from.unwrap_or(now - lookback).timestamp();
        let end = now.timestamp();

        let response = self
            .client
            .get(format!("{}/stock/candle", self.base_url))
            .query(&[
                ("symbol", key.symbol.to_uppercase()),
                ("resolution", Self::resolution_code(key.interval).to_string()),
                ("from", start.to_string()),
                ("to", end.to_string()),
                ("token", self.api_key.clone()),
            ])
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(FetchError::RateLimited);
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(FetchError::Auth(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(FetchError::Network(format!("HTTP {}", status)));
        }

        let parsed: CandleResponse = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;
        let candles = candle_response_to_candles(parsed, limit)?;
        debug!(symbol = %key.symbol, rows = candles.len(), "finnhub candles fetched");
        Ok(candles)
    }
}
