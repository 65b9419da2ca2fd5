use crate::market::entity::Candle;
use crate::store::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// # Summary
/// 缓存判定动作枚举，描述一次序列访问应当如何获取数据。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FetchAction {
    // 缓存新鲜且充足，直接复用
    UseCache,
    // 缓存过期，从最后一根 K 线起增量抓取
    IncrementalFetch,
    // 无缓存或缓存行数不足，全量抓取
    FullFetch,
}

impl fmt::Display for FetchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchAction::UseCache => write!(f, "use_cache"),
            FetchAction::IncrementalFetch => write!(f, "incremental_fetch"),
            FetchAction::FullFetch => write!(f, "full_fetch"),
        }
    }
}

/// # Summary
/// 新鲜度判定结果，每次缓存访问时重新计算，不做持久化。
///
/// # Invariants
/// - `from` 仅在 `IncrementalFetch` 时为 Some，指向缓存最后一根 K 线
///   （含），以便覆盖交易所对未收盘 K 线的修订。
#[derive(Debug, Clone, PartialEq)]
pub struct FetchDecision {
    // 判定出的获取动作
    pub action: FetchAction,
    // 增量抓取的起始时间（包含）
    pub from: Option<DateTime<Utc>>,
    // 本次应向提供商请求的行数
    pub request_limit: usize,
}

/// # Summary
/// 一次序列访问的完整结果：数据本体加上可供调用方断言的决策元数据。
///
/// # Invariants
/// - `candles` 按时间严格升序且无重复时间戳。
/// - `write_error` 为 Some 时，`candles` 仍然是合并后的完整内存结果；
///   持久化失败不得污染已返回的读侧数据。
#[derive(Debug)]
pub struct SeriesOutcome {
    // 满足请求条数的最终序列切片
    pub candles: Vec<Candle>,
    // 本次访问实际执行的动作
    pub action: FetchAction,
    // 抓取失败后降级返回了过期缓存
    pub served_stale: bool,
    // 本次写回存储的行数
    pub rows_written: u64,
    // 合并成功但写回失败时的存储错误
    pub write_error: Option<StoreError>,
}
