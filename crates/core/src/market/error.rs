use thiserror::Error;

/// # Summary
/// 外部行情提供商错误枚举，处理网络、鉴权、限流及解析等问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum FetchError {
    // 网络层错误，包含底层 HTTP 客户端错误信息
    #[error("Network error: {0}")]
    Network(String),
    // 鉴权失败 (缺少或无效的 API Key)
    #[error("Auth error: {0}")]
    Auth(String),
    // 提供商限流 (HTTP 429)
    #[error("Rate limited by provider")]
    RateLimited,
    // 数据解析错误，如 JSON 格式不匹配
    #[error("Parse error: {0}")]
    Parse(String),
    // 请求的数据未找到 (404 或内容为空)
    #[error("Data not found")]
    NotFound,
    // 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}
