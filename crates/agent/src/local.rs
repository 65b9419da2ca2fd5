use async_trait::async_trait;
use stocklens_core::agent::entity::{AgentKind, AssetSnapshot, Recommendation};
use stocklens_core::agent::error::AgentError;
use stocklens_core::agent::port::RecommendationAgent;
use stocklens_core::signal::entity::{RecAction, SignalRow};
use tracing::info;

// 强趋势门槛，仅用于理由陈述
const ADX_STRONG_TREND: f64 = 25.0;

/// # Summary
/// 本地规则代理：直接采用信号层对最新一行的结论，并把各指标状态
/// 拼为人类可读的理由。完全离线，不依赖任何外部服务。
pub struct LocalAgent;

/// 由最新信号行生成建议理由。
fn rationale(row: &SignalRow) -> String {
    let mut reasons = Vec::new();

    reasons.push(match row.recommendation {
        RecAction::Buy => "Buy signal".to_string(),
        RecAction::Sell => "Sell signal".to_string(),
        RecAction::Hold => "Hold".to_string(),
    });

    if row.macd > row.macd_signal {
        reasons.push("MACD > signal (bullish momentum)".to_string());
    } else if row.macd < row.macd_signal {
        reasons.push("MACD < signal (bearish momentum)".to_string());
    }

    if row.rsi_14 < 30.0 {
        reasons.push("RSI < 30 (oversold)".to_string());
    } else if row.rsi_14 > 70.0 {
        reasons.push("RSI > 70 (overbought)".to_string());
    }

    if row.adx >= ADX_STRONG_TREND {
        reasons.push("Strong trend (ADX >= 25)".to_string());
    }

    reasons.join("; ")
}

#[async_trait]
impl RecommendationAgent for LocalAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Local
    }

    fn model(&self) -> Option<String> {
        None
    }

    /// # Summary
    /// 针对每个快照的最新信号行产出建议。
    ///
    /// # Logic
    /// 1. 取快照末行（最新），无数据的快照跳过。
    /// 2. 动作沿用规则层结论，理由由指标状态拼接。
    async fn recommend(
        &self,
        snapshots: &[AssetSnapshot],
    ) -> Result<Vec<Recommendation>, AgentError> {
        info!(assets = snapshots.len(), "running local rule-based agent");

        Ok(snapshots
            .iter()
            .filter_map(|snapshot| {
                snapshot.latest().map(|row| Recommendation {
                    symbol: snapshot.symbol.clone(),
                    action: row.recommendation,
                    rationale: rationale(row),
                    confidence: None,
                    price: Some(row.close),
                    time: row.time,
                })
            })
            .collect())
    }
}
