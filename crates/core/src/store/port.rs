use crate::agent::entity::{AgentRun, Recommendation};
use crate::common::SeriesKey;
use crate::market::entity::{Candle, SeriesMeta};
use crate::signal::entity::{IndicatorRow, SignalRow};
use crate::store::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 缓存库整体统计快照。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStats {
    // K 线总行数
    pub total_rows: u64,
    // 去重后的资产数量
    pub unique_symbols: u64,
    // 库中最早的 K 线时间
    pub oldest: Option<DateTime<Utc>>,
    // 库中最新的 K 线时间
    pub newest: Option<DateTime<Utc>>,
}

/// # Summary
/// 持久化后的建议记录（含执行上下文），供历史回看查询使用。
#[derive(Debug, Clone)]
pub struct StoredRecommendation {
    // 原始建议内容
    pub recommendation: Recommendation,
    // 产出该建议的代理类型标签
    pub agent_kind: String,
    // LLM 提供商 (本地代理为 None)
    pub llm_provider: Option<String>,
    // LLM 模型标识
    pub llm_model: Option<String>,
    // 记录写入时间
    pub created_at: DateTime<Utc>,
}

/// # Summary
/// 时间序列存储接口，负责 K 线数据的持久化与读取。
///
/// # Invariants
/// - `latest_meta` 不得通过全表扫描回答，必须走索引或元数据表。
/// - `write_candles` 为按 `(key, time)` 的幂等 Upsert：重复写入同一根
///   K 线覆盖旧值，绝不产生重复行。
/// - 写操作返回前必须完成持久化提交（调用方可在其后立即崩溃）。
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// # Summary
    /// 读取某序列的元数据（最新时间戳、行数、最近刷新时间）。
    ///
    /// # Arguments
    /// * `key`: 序列身份。
    ///
    /// # Returns
    /// 从未抓取过的序列返回 `None`。
    async fn latest_meta(&self, key: &SeriesKey) -> Result<Option<SeriesMeta>, StoreError>;

    /// # Summary
    /// 区间查询 K 线。
    ///
    /// # Logic
    /// 1. `from`/`to` 为闭区间过滤条件，均可缺省。
    /// 2. 无区间且给定 `limit` 时，返回最近的 `limit` 行。
    /// 3. 结果一律按时间升序。
    ///
    /// # Arguments
    /// * `key`: 序列身份。
    /// * `from`: 起始时间（含）。
    /// * `to`: 截止时间（含）。
    /// * `limit`: 行数上限。
    ///
    /// # Returns
    /// 升序 K 线列表。
    async fn read_candles(
        &self,
        key: &SeriesKey,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>, StoreError>;

    /// # Summary
    /// 批量写入（Upsert）K 线并刷新序列元数据。
    ///
    /// # Arguments
    /// * `key`: 序列身份。
    /// * `candles`: 待写入数据，按时间升序。
    ///
    /// # Returns
    /// 本次受影响的行数。
    async fn write_candles(&self, key: &SeriesKey, candles: &[Candle])
    -> Result<u64, StoreError>;
}

/// # Summary
/// 分析结果存储接口，负责指标、信号与代理产出的持久化，
/// 以及缓存库的统计与管理操作。
///
/// # Invariants
/// - 指标与信号行按 `(key, time)` Upsert，与 K 线写入语义一致。
/// - 序列删除只能由此接口显式触发，缓存自身永不淘汰数据。
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// 批量写入（Upsert）指标行。
    async fn save_indicators(
        &self,
        key: &SeriesKey,
        rows: &[IndicatorRow],
    ) -> Result<(), StoreError>;

    /// 批量写入（Upsert）信号行。
    async fn save_signals(&self, key: &SeriesKey, rows: &[SignalRow]) -> Result<(), StoreError>;

    /// 记录一次代理执行，返回分配的运行 ID。
    async fn record_agent_run(&self, run: &AgentRun) -> Result<i64, StoreError>;

    /// 写入某次代理执行产出的全部建议。
    async fn save_recommendations(
        &self,
        run_id: i64,
        recs: &[Recommendation],
    ) -> Result<(), StoreError>;

    /// # Summary
    /// 查询最近的建议历史。
    ///
    /// # Arguments
    /// * `symbol`: 可选的资产过滤条件。
    /// * `limit`: 返回条数上限，按写入时间倒序。
    async fn recent_recommendations(
        &self,
        symbol: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredRecommendation>, StoreError>;

    /// 汇总缓存库统计信息。
    async fn cache_stats(&self) -> Result<CacheStats, StoreError>;

    /// 删除单个序列的 K 线、指标与信号数据，返回删除的 K 线行数。
    async fn purge_series(&self, key: &SeriesKey) -> Result<u64, StoreError>;

    /// 清空全部市场数据表，返回删除的 K 线行数。
    async fn purge_all(&self) -> Result<u64, StoreError>;
}
