use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use stocklens_core::market::entity::Candle;

/// # Summary
/// 合并缓存序列与新抓取序列：按时间戳取并集，冲突时新抓取的
/// K 线覆盖缓存值（处理交易所对未收盘 K 线的修订）。
///
/// # Logic
/// 1. 先以缓存序列填充按时间戳排序的映射。
/// 2. 再写入新序列，同时间戳直接覆盖。
/// 3. 按键序导出，天然升序且无重复时间戳。
///
/// # Invariants
/// - 不编造缺失的 K 线：序列内部的空洞原样保留，补齐是调用方的事。
/// - 任一侧为空时退化为返回另一侧。
///
/// # Arguments
/// * `existing`: 已缓存的序列。
/// * `incoming`: 新抓取的序列。
///
/// # Returns
/// 升序、无重复时间戳的合并结果。
pub fn merge_candles(existing: Vec<Candle>, incoming: Vec<Candle>) -> Vec<Candle> {
    let mut by_time: BTreeMap<DateTime<Utc>, Candle> = BTreeMap::new();
    for candle in existing {
        by_time.insert(candle.time, candle);
    }
    for candle in incoming {
        // 新值覆盖旧值
        by_time.insert(candle.time, candle);
    }
    by_time.into_values().collect()
}
