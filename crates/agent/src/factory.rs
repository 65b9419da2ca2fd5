use crate::llm::{LlmAgent, api_key_env};
use crate::local::LocalAgent;
use stocklens_core::agent::entity::LlmProvider;
use stocklens_core::agent::error::AgentError;
use stocklens_core::agent::port::RecommendationAgent;
use stocklens_core::config::AgentConfig;

/// # Summary
/// 推荐代理工厂：根据配置的模式与提供商构建具体代理实例。
/// App 层持有具体实现的知识，管道层只拿到 trait 对象。
pub struct AgentFactory;

impl AgentFactory {
    /// # Summary
    /// 按配置构建代理。
    ///
    /// # Logic
    /// 1. `mode = "local"`：构建离线规则代理。
    /// 2. `mode = "llm"`：解析提供商，密钥按「配置优先、环境变量兜底」
    ///    解析后构建 LLM 代理。
    /// 3. 其余模式为配置错误。
    ///
    /// # Arguments
    /// * `config`: 代理配置节。
    ///
    /// # Returns
    /// 成功返回装箱的 `RecommendationAgent`。
    pub fn build(config: &AgentConfig) -> Result<Box<dyn RecommendationAgent>, AgentError> {
        match config.mode.to_lowercase().as_str() {
            "local" => Ok(Box::new(LocalAgent)),
            "llm" => {
                let provider: LlmProvider =
                    config.provider.parse().map_err(AgentError::Unknown)?;
                let api_key = config
                    .api_key
                    .clone()
                    .or_else(|| std::env::var(api_key_env(provider)).ok());
                let agent = LlmAgent::new(
                    provider,
                    config.model.clone(),
                    api_key,
                    config.prompt.clone(),
                )?;
                Ok(Box::new(agent))
            }
            other => Err(AgentError::Unknown(format!(
                "Unsupported agent mode: {}. Use 'local' or 'llm'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stocklens_core::agent::entity::AgentKind;

    #[test]
    fn local_mode_builds_the_rule_agent() {
        let config = AgentConfig {
            mode: "local".to_string(),
            ..AgentConfig::default()
        };
        let agent = AgentFactory::build(&config).unwrap();
        assert_eq!(agent.kind(), AgentKind::Local);
        assert!(agent.model().is_none());
    }

    #[test]
    fn llm_mode_dispatches_on_provider() {
        let config = AgentConfig {
            mode: "llm".to_string(),
            provider: "openai".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key: Some("test-key".to_string()),
            prompt: None,
        };
        let agent = AgentFactory::build(&config).unwrap();
        assert_eq!(agent.kind(), AgentKind::Llm(LlmProvider::OpenAi));
        assert_eq!(agent.model().as_deref(), Some("gpt-4o-mini"));
    }

    #[test]
    fn unknown_mode_and_provider_are_config_errors() {
        let bad_mode = AgentConfig {
            mode: "oracle".to_string(),
            ..AgentConfig::default()
        };
        assert!(AgentFactory::build(&bad_mode).is_err());

        let bad_provider = AgentConfig {
            mode: "llm".to_string(),
            provider: "skynet".to_string(),
            ..AgentConfig::default()
        };
        assert!(AgentFactory::build(&bad_provider).is_err());
    }
}
