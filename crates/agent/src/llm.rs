use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use stocklens_core::agent::entity::{AgentKind, AssetSnapshot, LlmProvider, Recommendation};
use stocklens_core::agent::error::AgentError;
use stocklens_core::agent::port::RecommendationAgent;
use tracing::{info, warn};

const OPENAI_BASE: &str = "https://api.openai.com";
const ANTHROPIC_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 4000;

// 内置的基础提示词，可被配置覆盖
const DEFAULT_PROMPT: &str = "You are a trading analysis assistant. For each asset you receive \
the most recent technical signal rows (RSI, MACD, ATR, ADX, OBV, rule flags and a composite \
score). Weigh momentum, mean reversion and volume evidence, then give one recommendation per \
asset.";

// 强约束的回复格式说明
const JSON_INSTRUCTION: &str = "\n\nRespond ONLY with a valid JSON array containing objects \
with 'symbol', 'recommendation', and 'rationale' fields. 'recommendation' must be one of \
'buy', 'sell' or 'hold'. Do not include any other text or explanations outside the JSON.";

/// 各提供商的默认密钥环境变量。
pub fn api_key_env(provider: LlmProvider) -> &'static str {
    match provider {
        LlmProvider::OpenAi => "OPENAI_API_KEY",
        LlmProvider::Anthropic => "ANTHROPIC_STOCK_LENS",
    }
}

/// # Summary
/// LLM 推荐代理：把信号快照序列化进提示词，调用所配置提供商的
/// 对话接口，并把严格 JSON 回复解析为建议列表。
///
/// # Invariants
/// - 提供商差异只体现在请求形态上，对上层完全透明。
/// - 缺少 API Key 时 `recommend` 直接失败，不发出网络请求。
pub struct LlmAgent {
    // 绑定的提供商
    provider: LlmProvider,
    // 模型标识
    model: String,
    // API 密钥
    api_key: Option<String>,
    // 基础提示词
    prompt: String,
    // 内部使用的 HTTP 客户端
    client: Client,
    // 接口基地址，测试时可替换
    base_url: String,
}

impl LlmAgent {
    /// # Summary
    /// 创建 LLM 代理实例。
    ///
    /// # Arguments
    /// * `provider`: LLM 提供商。
    /// * `model`: 模型标识。
    /// * `api_key`: API 密钥，缺省时 `recommend` 会报错。
    /// * `prompt`: 可选的基础提示词覆盖。
    pub fn new(
        provider: LlmProvider,
        model: impl Into<String>,
        api_key: Option<String>,
        prompt: Option<String>,
    ) -> Result<Self, AgentError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| AgentError::Network(e.to_string()))?;
        let base_url = match provider {
            LlmProvider::OpenAi => OPENAI_BASE,
            LlmProvider::Anthropic => ANTHROPIC_BASE,
        };
        Ok(Self {
            provider,
            model: model.into(),
            api_key,
            prompt: prompt.unwrap_or_else(|| DEFAULT_PROMPT.to_string()),
            client,
            base_url: base_url.to_string(),
        })
    }

    fn build_prompt(&self, snapshots: &[AssetSnapshot]) -> Result<String, AgentError> {
        let assets_json =
            serde_json::to_string(snapshots).map_err(|e| AgentError::Unknown(e.to_string()))?;
        Ok(format!(
            "{}{}\n\nHere is the data:\n{}",
            self.prompt, JSON_INSTRUCTION, assets_json
        ))
    }

    async fn call_openai(&self, api_key: &str, prompt: &str) -> Result<String, AgentError> {
        #[derive(Serialize)]
        struct ChatMessage<'a> {
            role: &'static str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
            temperature: f64,
        }
        #[derive(Deserialize)]
        struct ChatContent {
            content: String,
        }
        #[derive(Deserialize)]
        struct ChatChoice {
            message: ChatContent,
        }
        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<ChatChoice>,
        }

        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::Provider(format!(
                "openai HTTP {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AgentError::Parse("openai response had no choices".to_string()))
    }

    async fn call_anthropic(&self, api_key: &str, prompt: &str) -> Result<String, AgentError> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'static str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct MessagesRequest<'a> {
            model: &'a str,
            max_tokens: u32,
            messages: Vec<Message<'a>>,
        }
        #[derive(Deserialize)]
        struct ContentBlock {
            #[serde(default)]
            text: Option<String>,
        }
        #[derive(Deserialize)]
        struct MessagesResponse {
            content: Vec<ContentBlock>,
        }

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            messages: vec![Message {
                role: "user",
                content: prompt,
            }],
        };

        let response = self
            .client
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AgentError::Provider(format!(
                "anthropic HTTP {}",
                response.status()
            )));
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Parse(e.to_string()))?;
        parsed
            .content
            .into_iter()
            .find_map(|block| block.text)
            .ok_or_else(|| AgentError::Parse("anthropic response had no text block".to_string()))
    }
}

/// LLM 回复中的单条建议。
#[derive(Deserialize, Debug)]
struct LlmReply {
    symbol: String,
    recommendation: String,
    #[serde(default)]
    rationale: String,
    #[serde(default)]
    confidence: Option<f64>,
}

/// # Summary
/// 从 LLM 回复中提取 JSON 数组文本。容忍 Markdown 代码块围栏
/// 与数组前后的多余文字。
fn extract_json(text: &str) -> Result<&str, AgentError> {
    let start = text.find('[');
    let end = text.rfind(']');
    match (start, end) {
        (Some(start), Some(end)) if end > start => Ok(&text[start..=end]),
        _ => Err(AgentError::Parse(format!(
            "no JSON array found in response: {}",
            text.chars().take(120).collect::<String>()
        ))),
    }
}

/// 把回复条目映射回建议实体，价格与时间取自对应快照的最新行。
fn replies_to_recommendations(
    replies: Vec<LlmReply>,
    snapshots: &[AssetSnapshot],
) -> Vec<Recommendation> {
    let mut out = Vec::with_capacity(replies.len());
    for reply in replies {
        let Some(snapshot) = snapshots.iter().find(|s| s.symbol == reply.symbol) else {
            warn!(symbol = %reply.symbol, "LLM replied for an unknown symbol, skipping");
            continue;
        };
        let Some(latest) = snapshot.latest() else {
            continue;
        };
        let Ok(action) = reply.recommendation.parse() else {
            warn!(symbol = %reply.symbol, value = %reply.recommendation,
                  "LLM replied with an invalid action, skipping");
            continue;
        };
        out.push(Recommendation {
            symbol: reply.symbol,
            action,
            rationale: reply.rationale,
            confidence: reply.confidence,
            price: Some(latest.close),
            time: latest.time,
        });
    }
    out
}

#[async_trait]
impl RecommendationAgent for LlmAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Llm(self.provider)
    }

    fn model(&self) -> Option<String> {
        Some(self.model.clone())
    }

    /// # Summary
    /// 调用 LLM 产出建议。
    ///
    /// # Logic
    /// 1. 校验 API Key，缺失直接失败（不发网络请求）。
    /// 2. 组装提示词并按提供商调用对话接口。
    /// 3. 提取并解析 JSON 数组，映射回建议实体。
    async fn recommend(
        &self,
        snapshots: &[AssetSnapshot],
    ) -> Result<Vec<Recommendation>, AgentError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AgentError::MissingApiKey(api_key_env(self.provider).to_string()))?;

        info!(provider = %self.provider, model = %self.model, assets = snapshots.len(),
              "running LLM agent");

        let prompt = self.build_prompt(snapshots)?;
        let raw = match self.provider {
            LlmProvider::OpenAi => self.call_openai(api_key, &prompt).await?,
            LlmProvider::Anthropic => self.call_anthropic(api_key, &prompt).await?,
        };

        let replies: Vec<LlmReply> = serde_json::from_str(extract_json(&raw)?)
            .map_err(|e| AgentError::Parse(e.to_string()))?;
        Ok(replies_to_recommendations(replies, snapshots))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stocklens_core::signal::entity::{RecAction, SignalRow};

    fn snapshot(symbol: &str, close: f64) -> AssetSnapshot {
        AssetSnapshot {
            symbol: symbol.to_string(),
            rows: vec![SignalRow {
                time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                close,
                rsi_14: 50.0,
                macd: 0.0,
                macd_signal: 0.0,
                atr_14: 1.0,
                adx: 10.0,
                obv: 0.0,
                sig_momentum_trend: 0,
                sig_mean_reversion: 0,
                sig_volume: 0,
                score: 0,
                recommendation: RecAction::Hold,
            }],
        }
    }

    #[test]
    fn extract_json_tolerates_markdown_fences() {
        let fenced = "Here you go:\n```json\n[{\"symbol\": \"BTCUSDT\"}]\n```\nThanks!";
        assert_eq!(extract_json(fenced).unwrap(), "[{\"symbol\": \"BTCUSDT\"}]");

        let bare = r#"[{"symbol": "AAPL"}]"#;
        assert_eq!(extract_json(bare).unwrap(), bare);

        assert!(extract_json("no array here").is_err());
    }

    #[test]
    fn replies_map_back_to_snapshot_price_and_time() {
        let replies = vec![
            LlmReply {
                symbol: "BTCUSDT".to_string(),
                recommendation: "buy".to_string(),
                rationale: "momentum building".to_string(),
                confidence: Some(0.7),
            },
            LlmReply {
                symbol: "UNKNOWN".to_string(),
                recommendation: "sell".to_string(),
                rationale: String::new(),
                confidence: None,
            },
            LlmReply {
                symbol: "AAPL".to_string(),
                recommendation: "go-long".to_string(),
                rationale: String::new(),
                confidence: None,
            },
        ];
        let snapshots = vec![snapshot("BTCUSDT", 42000.0), snapshot("AAPL", 180.0)];

        let recs = replies_to_recommendations(replies, &snapshots);
        // 未知资产与非法动作都被丢弃
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].symbol, "BTCUSDT");
        assert_eq!(recs[0].action, RecAction::Buy);
        assert_eq!(recs[0].price, Some(42000.0));
        assert_eq!(recs[0].confidence, Some(0.7));
    }

    #[tokio::test]
    async fn missing_api_key_fails_without_network() {
        let agent =
            LlmAgent::new(LlmProvider::Anthropic, "claude-opus-4-1-20250805", None, None).unwrap();
        let err = agent.recommend(&[snapshot("BTCUSDT", 1.0)]).await.unwrap_err();
        assert!(matches!(err, AgentError::MissingApiKey(env) if env == "ANTHROPIC_STOCK_LENS"));
    }

    #[test]
    fn prompt_embeds_snapshot_json_and_contract() {
        let agent = LlmAgent::new(
            LlmProvider::OpenAi,
            "gpt-4o-mini",
            Some("key".to_string()),
            None,
        )
        .unwrap();
        let prompt = agent.build_prompt(&[snapshot("BTCUSDT", 1.0)]).unwrap();
        assert!(prompt.contains("BTCUSDT"));
        assert!(prompt.contains("Respond ONLY with a valid JSON array"));
    }
}
