use crate::agent::entity::{AgentKind, AssetSnapshot, Recommendation};
use crate::agent::error::AgentError;
use async_trait::async_trait;

/// # Summary
/// 推荐代理能力接口。本地规则代理与各 LLM 代理均实现此契约，
/// 上层仅依赖该抽象做分发。
///
/// # Invariants
/// - 实现者对每个输入快照至多产出一条建议。
/// - 代理失败不得让数据管道的前序阶段失效。
#[async_trait]
pub trait RecommendationAgent: Send + Sync {
    /// # Summary
    /// 返回代理类型，用于执行簿记。
    fn kind(&self) -> AgentKind;

    /// # Summary
    /// 返回模型标识（本地代理为 None）。
    fn model(&self) -> Option<String>;

    /// # Summary
    /// 针对一批资产快照产出交易建议。
    ///
    /// # Logic
    /// 1. 读取每个快照中最近的信号行。
    /// 2. 按自身策略（规则或 LLM）生成建议与理由。
    ///
    /// # Arguments
    /// * `snapshots`: 各资产最近的信号快照。
    ///
    /// # Returns
    /// 成功返回建议列表，失败返回 `AgentError`。
    async fn recommend(
        &self,
        snapshots: &[AssetSnapshot],
    ) -> Result<Vec<Recommendation>, AgentError>;
}
