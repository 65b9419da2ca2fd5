mod dashboard;
mod pipeline;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use stocklens_core::common::{Interval, SeriesKey, Source};
use stocklens_core::config::AppConfig;
use stocklens_core::store::port::{AnalysisStore, MarketStore};
use stocklens_store::market::SqliteMarketStore;
use tracing::info;

/// StockLens：带增量缓存的行情分析管道
#[derive(Parser)]
#[command(name = "stocklens", version)]
struct Cli {
    /// 配置文件路径（缺失时使用内置默认值）
    #[arg(long, default_value = "stocklens.toml")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 对全部配置资产执行 抓取->指标->信号->代理 管道
    Run,
    /// 显示缓存库统计信息
    Stats,
    /// 查看某序列最近缓存的 K 线
    Data {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        interval: String,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// 查看最近的建议历史
    Recs {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// 管理操作：清空整个缓存，或删除指定的单个序列
    Reset {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        source: Option<String>,
        #[arg(long)]
        interval: Option<String>,
    },
}

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责加载配置、实例化具体实现组件并按子命令派发。
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let store = Arc::new(
        SqliteMarketStore::open(&config.database.path)
            .await
            .context("failed to open market store")?,
    );

    match cli.command {
        Command::Run => {
            let pipeline = pipeline::Pipeline::new(config, store);
            pipeline.run().await?;
            info!("pipeline execution completed");
        }
        Command::Stats => {
            let stats = store.cache_stats().await?;
            println!("Cache statistics");
            println!("  total rows:     {}", stats.total_rows);
            println!("  unique symbols: {}", stats.unique_symbols);
            println!(
                "  oldest data:    {}",
                stats.oldest.map_or("-".to_string(), |t| t.to_rfc3339())
            );
            println!(
                "  newest data:    {}",
                stats.newest.map_or("-".to_string(), |t| t.to_rfc3339())
            );
        }
        Command::Data {
            symbol,
            source,
            interval,
            limit,
        } => {
            let key = parse_key(&symbol, &source, &interval)?;
            let candles = store.read_candles(&key, None, None, Some(limit)).await?;
            if candles.is_empty() {
                println!("No cached data for {}", key);
            }
            for candle in candles {
                println!(
                    "{}  O {:>12.4}  H {:>12.4}  L {:>12.4}  C {:>12.4}  V {:>14.2}",
                    candle.time.to_rfc3339(),
                    candle.open,
                    candle.high,
                    candle.low,
                    candle.close,
                    candle.volume
                );
            }
        }
        Command::Recs { symbol, limit } => {
            let recs = store.recent_recommendations(symbol.as_deref(), limit).await?;
            if recs.is_empty() {
                println!("No recommendations recorded yet");
            }
            for rec in recs {
                let agent = match (&rec.llm_provider, &rec.llm_model) {
                    (Some(provider), Some(model)) => format!("{} ({}/{})", rec.agent_kind, provider, model),
                    _ => rec.agent_kind.clone(),
                };
                println!(
                    "{}  {:<10} {:<4} {}  [{}]",
                    rec.created_at.to_rfc3339(),
                    rec.recommendation.symbol,
                    rec.recommendation.action,
                    rec.recommendation
                        .price
                        .map_or("-".to_string(), |p| format!("{:.2}", p)),
                    agent
                );
                if !rec.recommendation.rationale.is_empty() {
                    println!("    {}", rec.recommendation.rationale);
                }
            }
        }
        Command::Reset {
            symbol,
            source,
            interval,
        } => match (symbol, source, interval) {
            (Some(symbol), Some(source), Some(interval)) => {
                let key = parse_key(&symbol, &source, &interval)?;
                let deleted = store.purge_series(&key).await?;
                println!("Deleted {} cached candles for {}", deleted, key);
            }
            (None, None, None) => {
                let deleted = store.purge_all().await?;
                println!("Deleted {} cached candles (all series)", deleted);
            }
            _ => {
                anyhow::bail!(
                    "reset needs either no filters (wipe everything) or all of \
                     --symbol, --source and --interval"
                );
            }
        },
    }

    Ok(())
}

/// 加载配置：TOML 文件（可缺省）+ STOCKLENS_ 前缀环境变量覆盖。
fn load_config(path: &str) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(config::Environment::with_prefix("STOCKLENS").separator("__"))
        .build()
        .context("failed to read configuration")?;
    settings
        .try_deserialize::<AppConfig>()
        .context("invalid configuration")
}

fn parse_key(symbol: &str, source: &str, interval: &str) -> anyhow::Result<SeriesKey> {
    let source: Source = source.parse().map_err(anyhow::Error::msg)?;
    let interval: Interval = interval.parse().map_err(anyhow::Error::msg)?;
    Ok(SeriesKey::new(symbol.to_uppercase(), source, interval))
}
