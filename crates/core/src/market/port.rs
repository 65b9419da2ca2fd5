use crate::common::SeriesKey;
use crate::market::entity::Candle;
use crate::market::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// # Summary
/// 市场行情数据提供者接口（原始数据源）。
///
/// # Invariants
/// - 返回的 K 线必须按时间升序排列且无重复时间戳。
/// - 分页、限流退避等提供商协议细节由实现者自行处理。
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// # Summary
    /// 获取特定序列的 K 线数据。
    ///
    /// # Logic
    /// 1. 构建数据源请求：`from` 存在时表示从该时间（含）向后增量抓取，
    ///    否则回溯最近 `limit` 根。
    /// 2. 执行网络请求并解析响应数据为标准 Candle 形态。
    ///
    /// # Arguments
    /// * `key`: 序列身份。
    /// * `from`: 可选的起始时间（包含）。
    /// * `limit`: 请求的数量上限。
    ///
    /// # Returns
    /// 成功返回升序 K 线列表，失败返回 `FetchError`。
    async fn fetch_candles(
        &self,
        key: &SeriesKey,
        from: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError>;
}
