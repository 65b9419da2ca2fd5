use crate::market::error::FetchError;
use crate::store::error::StoreError;
use thiserror::Error;

/// # Summary
/// 缓存编排层错误枚举，聚合读写存储与外部抓取两侧的失败。
///
/// # Invariants
/// - 存储读取失败永远是致命的；抓取失败仅在无可用缓存时致命。
#[derive(Error, Debug)]
pub enum CacheError {
    // 外部提供商抓取失败且无可降级缓存
    #[error(transparent)]
    Fetch(#[from] FetchError),
    // 本地存储读写失败
    #[error(transparent)]
    Store(#[from] StoreError),
    // 缓存行数无法满足请求且策略禁止补抓
    #[error("Insufficient history: requested {requested}, cached {available}")]
    InsufficientHistory { requested: usize, available: u64 },
}
