use crate::common::{Interval, Source};
use serde::{Deserialize, Serialize};

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub pipeline: PipelineConfig,
    pub agent: AgentConfig,
    pub dashboard: DashboardConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            cache: CacheConfig::default(),
            pipeline: PipelineConfig::default(),
            agent: AgentConfig::default(),
            dashboard: DashboardConfig::default(),
        }
    }
}

/// 数据库配置。路径由此显式注入存储层构造函数，不使用进程级全局状态。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/stocklens.db".to_string(),
        }
    }
}

/// 缓存新鲜度策略配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    // 过期阈值下限（秒），防止分钟级序列在阈值附近反复补抓
    pub stale_floor_secs: i64,
    // 单次增量抓取的行数上限
    pub fetch_ceiling: usize,
    // 增量窗口在覆盖缺口之外追加的余量根数
    pub margin_bars: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_floor_secs: 300,
            fetch_ceiling: 1000,
            margin_bars: 1,
        }
    }
}

/// 单个资产的抓取配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSpec {
    pub symbol: String,
    pub source: Source,
    pub interval: Option<Interval>,
    pub limit: Option<usize>,
}

/// 管道执行配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub assets: Vec<AssetSpec>,
    pub default_interval: Interval,
    pub default_limit: usize,
    // 提交给代理的每资产信号行数
    pub snapshot_rows: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            assets: Vec::new(),
            default_interval: Interval::Day1,
            default_limit: 1000,
            snapshot_rows: 5,
        }
    }
}

/// 推荐代理配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    // 代理模式: "local" 或 "llm"
    pub mode: String,
    // LLM 提供商: "openai" 或 "anthropic"
    pub provider: String,
    // LLM 模型标识
    pub model: String,
    // API Key（缺省时按提供商从环境变量读取）
    pub api_key: Option<String>,
    // 可选的基础提示词覆盖
    pub prompt: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            mode: "local".to_string(),
            provider: "anthropic".to_string(),
            model: "claude-opus-4-1-20250805".to_string(),
            api_key: None,
            prompt: None,
        }
    }
}

/// 静态看板输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub output_path: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            output_path: "dashboard/index.html".to_string(),
        }
    }
}
