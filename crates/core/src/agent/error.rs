use thiserror::Error;

/// # Summary
/// 推荐代理域错误枚举，处理密钥缺失、外部调用及响应解析问题。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum AgentError {
    // LLM 代理缺少 API Key
    #[error("Missing API key: {0}")]
    MissingApiKey(String),
    // 调用 LLM 提供商的网络错误
    #[error("Network error: {0}")]
    Network(String),
    // 提供商返回错误响应
    #[error("Provider error: {0}")]
    Provider(String),
    // LLM 回复无法解析为建议列表
    #[error("Parse error: {0}")]
    Parse(String),
    // 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}
