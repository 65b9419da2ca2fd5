use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// # Summary
/// 单根 K 线数据实体，记录特定时段内的行情波动。
///
/// # Invariants
/// - `high` 必须大于或等于 `open`, `close`；`low` 必须小于或等于两者。
/// - 同一序列内 `time` 严格递增，且对齐到周期边界。
/// - 所有价格与成交量非负。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    // K 线开始时间
    pub time: DateTime<Utc>,
    // 开盘价
    pub open: f64,
    // 最高价
    pub high: f64,
    // 最低价
    pub low: f64,
    // 收盘价
    pub close: f64,
    // 成交量
    pub volume: f64,
}

/// # Summary
/// 已缓存序列的元数据快照，由存储层独占维护。
///
/// # Invariants
/// - `latest` 等于该序列在库中的最大时间戳。
/// - `row_count` 等于该序列在库中的实际行数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMeta {
    // 最新一根 K 线的时间戳
    pub latest: DateTime<Utc>,
    // 序列当前总行数
    pub row_count: u64,
    // 最近一次写入刷新时间
    pub last_refreshed: DateTime<Utc>,
}
