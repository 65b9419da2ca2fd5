use crate::signal::entity::{RecAction, SignalRow};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// # Summary
/// LLM 提供商枚举。
///
/// # Invariants
/// - 序列化形式与配置文件及数据库 `llm_provider` 列一致。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
}

impl FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "anthropic" => Ok(LlmProvider::Anthropic),
            _ => Err(format!("Unknown LLM provider: {}", s)),
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmProvider::OpenAi => write!(f, "openai"),
            LlmProvider::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// # Summary
/// 推荐代理类型的标签化枚举：本地规则代理或挂接某个 LLM 提供商。
/// 通过单一能力接口分发，不使用继承层次。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    // 本地规则代理，离线可用
    Local,
    // LLM 代理，绑定具体提供商
    Llm(LlmProvider),
}

impl AgentKind {
    /// 返回用于持久化的代理类型标签。
    pub fn label(self) -> &'static str {
        match self {
            AgentKind::Local => "local",
            AgentKind::Llm(_) => "llm",
        }
    }

    /// 返回绑定的 LLM 提供商（本地代理为 None）。
    pub fn provider(self) -> Option<LlmProvider> {
        match self {
            AgentKind::Local => None,
            AgentKind::Llm(p) => Some(p),
        }
    }
}

/// # Summary
/// 代理输入快照：单个资产最近若干行信号数据。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSnapshot {
    // 资产代码
    pub symbol: String,
    // 最近的信号行，按时间升序
    pub rows: Vec<SignalRow>,
}

impl AssetSnapshot {
    /// 返回快照中最新的一行信号。
    pub fn latest(&self) -> Option<&SignalRow> {
        self.rows.last()
    }
}

/// # Summary
/// 单条交易建议实体，由代理针对一个资产产出。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    // 资产代码
    pub symbol: String,
    // 建议动作
    pub action: RecAction,
    // 人类可读的理由说明
    pub rationale: String,
    // 置信度 (0.0 - 1.0，可选)
    pub confidence: Option<f64>,
    // 建议产出时的参考价格
    pub price: Option<f64>,
    // 建议对应的数据时间
    pub time: DateTime<Utc>,
}

/// # Summary
/// 代理执行结果状态。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::Partial => write!(f, "partial"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// # Summary
/// 一次代理执行的簿记记录。
#[derive(Debug, Clone)]
pub struct AgentRun {
    // 执行发起时间
    pub run_at: DateTime<Utc>,
    // 代理类型
    pub kind: AgentKind,
    // LLM 模型标识 (本地代理为 None)
    pub model: Option<String>,
    // 成功处理的资产数
    pub assets_processed: u32,
    // 处理失败的资产数
    pub assets_failed: u32,
    // 执行耗时（秒）
    pub duration_secs: f64,
    // 执行结果状态
    pub status: RunStatus,
    // 失败时的错误描述
    pub error: Option<String>,
}
