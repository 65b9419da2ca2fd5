use thiserror::Error;

/// # Summary
/// 信号域错误枚举，处理指标计算的数据量不足等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum SignalError {
    // K 线数量不足以完成全部指标的预热
    #[error("Insufficient candles for indicator warmup: need {required}, got {available}")]
    InsufficientData { required: usize, available: usize },
}
