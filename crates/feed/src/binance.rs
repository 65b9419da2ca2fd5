use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use std::time::Duration;
use stocklens_core::common::{Interval, SeriesKey};
use stocklens_core::market::entity::Candle;
use stocklens_core::market::error::FetchError;
use stocklens_core::market::port::MarketDataProvider;
use tracing::debug;

const BINANCE_BASE: &str = "https://api.binance.com";
// 币安 klines 接口单次请求上限
const MAX_KLINES: usize = 1000;

/// 币安 kline 的原始行形态：混合类型 JSON 数组。
/// [开盘时间, 开, 高, 低, 收, 量, 收盘时间, 成交额, 笔数, 主买量, 主买额, 忽略]
type RawKline = (
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    String,
    i64,
    String,
    String,
    String,
);

/// # Summary
/// 币安行情提供者实现，走 `/api/v3/klines` REST 接口。
///
/// # Invariants
/// - 使用 `reqwest` 异步客户端进行通讯，单请求 10 秒超时。
/// - 单次请求行数不超过接口上限 1000。
pub struct BinanceProvider {
    // 内部使用的 HTTP 客户端
    client: Client,
    // 接口基地址，测试时可替换
    base_url: String,
}

impl BinanceProvider {
    /// # Summary
    /// 创建一个新的 BinanceProvider 实例。
    ///
    /// # Returns
    /// 返回初始化后的实例，HTTP 客户端构建失败时返回 `FetchError`。
    pub fn new() -> Result<Self, FetchError> {
        Self::with_base_url(BINANCE_BASE)
    }

    /// 使用自定义基地址创建实例。
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// 周期到币安 interval 参数的映射。
    fn interval_code(interval: Interval) -> &'static str {
        match interval {
            Interval::Minute1 => "1m",
            Interval::Minute5 => "5m",
            Interval::Minute15 => "15m",
            Interval::Minute30 => "30m",
            Interval::Hour1 => "1h",
            Interval::Day1 => "1d",
            Interval::Week1 => "1w",
            Interval::Month1 => "1M",
        }
    }
}

/// 将原始 kline 行解析为标准 Candle。
fn kline_to_candle(raw: &RawKline) -> Result<Candle, FetchError> {
    let time = Utc
        .timestamp_millis_opt(raw.0)
        .single()
        .ok_or_else(|| FetchError::Parse(format!("invalid open time: {}", raw.0)))?;

    fn price(value: &str, field: &str) -> Result<f64, FetchError> {
        value
            .parse::<f64>()
            .map_err(|_| FetchError::Parse(format!("invalid {}: {}", field, value)))
    }

    Ok(Candle {
        time,
        open: price(&raw.1, "open")?,
        high: price(&raw.2, "high")?,
        low: price(&raw.3, "low")?,
        close: price(&raw.4, "close")?,
        volume: price(&raw.5, "volume")?,
    })
}

/// # Summary
/// 解析整批 kline 并规范化为升序无重复序列。
fn decode_klines(raw: Vec<RawKline>) -> Result<Vec<Candle>, FetchError> {
    let mut candles = raw
        .iter()
        .map(kline_to_candle)
        .collect::<Result<Vec<_>, _>>()?;
    candles.sort_by_key(|c| c.time);
    candles.dedup_by_key(|c| c.time);
    Ok(candles)
}

#[async_trait]
impl MarketDataProvider for BinanceProvider {
    /// # Summary
    /// 抓取 K 线数据。
    ///
    /// # Logic
    /// 1. 构造查询参数：`from` 存在时映射为 `startTime`（毫秒）。
    /// 2. 执行请求，按状态码映射鉴权/限流/网络错误。
    /// 3. 解析混合类型 JSON 数组并规范化输出。
    async fn fetch_candles(
        &self,
        key: &SeriesKey,
        from: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        let mut params = vec![
            ("symbol", key.symbol.to_uppercase()),
            ("interval", Self::interval_code(key.interval).to_string()),
            ("limit", limit.min(MAX_KLINES).to_string()),
        ];
        if let Some(from) = from {
            params.push(("startTime", from.timestamp_millis().to_string()));
        }

        let response = self
            .client
            .get(format!("{}/api/v3/klines", self.base_url))
            .query(&params)
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(FetchError::RateLimited);
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(FetchError::Auth(format!("HTTP {}", status)));
        }
        if !status.is_success() {
            return Err(FetchError::Network(format!("HTTP {}", status)));
        }

        let raw: Vec<RawKline> = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;
        debug!(symbol = %key.symbol, rows = raw.len(), "binance klines fetched");
        decode_klines(raw)
    }
}
