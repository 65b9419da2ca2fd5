use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use std::time::Instant;
use stocklens_agent::factory::AgentFactory;
use stocklens_cache::freshness::FreshnessPolicy;
use stocklens_cache::series::SeriesCache;
use stocklens_core::agent::entity::{AgentKind, AgentRun, AssetSnapshot, Recommendation, RunStatus};
use stocklens_core::common::time::RealTimeProvider;
use stocklens_core::common::{SeriesKey, Source};
use stocklens_core::config::AppConfig;
use stocklens_core::market::port::MarketDataProvider;
use stocklens_core::store::port::{AnalysisStore, MarketStore};
use stocklens_feed::binance::BinanceProvider;
use stocklens_feed::finnhub::FinnhubProvider;
use stocklens_feed::yahoo::YahooProvider;
use stocklens_signals::{indicators, rules};
use stocklens_store::market::SqliteMarketStore;
use tracing::{info, warn};

use crate::dashboard;

/// # Summary
/// 分析管道：对每个配置资产依次执行 缓存获取 -> 指标 -> 信号 -> 落库，
/// 再以全部信号快照驱动推荐代理，最后渲染静态看板。
///
/// # Invariants
/// - 单个资产失败不终止整体执行（计入 failed，继续处理其余资产）。
/// - 代理失败也会留下 Failed 状态的运行记录，便于事后排查。
pub struct Pipeline {
    config: AppConfig,
    store: Arc<SqliteMarketStore>,
    cache: SeriesCache,
}

impl Pipeline {
    /// # Summary
    /// 构造管道，把配置翻译成缓存策略并装配编排器。
    pub fn new(config: AppConfig, store: Arc<SqliteMarketStore>) -> Self {
        let policy = FreshnessPolicy {
            stale_floor: Duration::seconds(config.cache.stale_floor_secs),
            fetch_ceiling: config.cache.fetch_ceiling,
            margin_bars: config.cache.margin_bars,
        };
        let cache = SeriesCache::new(
            store.clone() as Arc<dyn MarketStore>,
            Arc::new(RealTimeProvider),
            policy,
        );
        Self {
            config,
            store,
            cache,
        }
    }

    /// # Summary
    /// 执行完整管道。
    ///
    /// # Logic
    /// 1. 为三个数据源各实例化一个提供商。
    /// 2. 逐资产执行数据阶段，收集信号快照。
    /// 3. 构建代理产出建议，连同执行簿记一并落库。
    /// 4. 渲染静态 HTML 看板。
    pub async fn run(&self) -> anyhow::Result<()> {
        if self.config.pipeline.assets.is_empty() {
            warn!("no assets configured; nothing to do");
            return Ok(());
        }

        let binance = BinanceProvider::new().context("binance provider")?;
        let yahoo = YahooProvider::new().context("yahoo provider")?;
        let finnhub = FinnhubProvider::new(
            std::env::var("FINNHUB_API_KEY").unwrap_or_default(),
        )
        .context("finnhub provider")?;

        let mut snapshots: Vec<AssetSnapshot> = Vec::new();
        let mut processed = 0u32;
        let mut failed = 0u32;

        for asset in &self.config.pipeline.assets {
            let interval = asset.interval.unwrap_or(self.config.pipeline.default_interval);
            let limit = asset.limit.unwrap_or(self.config.pipeline.default_limit);
            let key = SeriesKey::new(asset.symbol.clone(), asset.source, interval);
            let provider: &dyn MarketDataProvider = match asset.source {
                Source::Binance => &binance,
                Source::Yahoo => &yahoo,
                Source::Finnhub => &finnhub,
            };

            info!(key = %key, limit, "processing asset");
            match self.process_asset(&key, limit, provider).await {
                Ok(Some(snapshot)) => {
                    snapshots.push(snapshot);
                    processed += 1;
                }
                Ok(None) => {
                    processed += 1;
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "asset pipeline failed, continuing");
                    failed += 1;
                }
            }
        }

        let recommendations = self.run_agent(&snapshots, processed, failed).await;
        self.render_dashboard(&recommendations, &snapshots)?;
        Ok(())
    }

    /// # Summary
    /// 单资产数据阶段：缓存获取、指标、信号、落库、快照截取。
    ///
    /// # Returns
    /// 指标预热不足时返回 `Ok(None)`（数据已缓存，信号阶段跳过）。
    async fn process_asset(
        &self,
        key: &SeriesKey,
        limit: usize,
        provider: &dyn MarketDataProvider,
    ) -> anyhow::Result<Option<AssetSnapshot>> {
        let outcome = self.cache.get_series(key, limit, true, provider).await?;
        info!(
            key = %key,
            action = %outcome.action,
            stale = outcome.served_stale,
            rows = outcome.candles.len(),
            written = outcome.rows_written,
            "series ready"
        );
        if let Some(err) = &outcome.write_error {
            warn!(key = %key, error = %err,
                  "write-back failed; next run will refetch more than strictly necessary");
        }

        let indicator_rows = match indicators::compute(&outcome.candles) {
            Ok(rows) => rows,
            Err(err) => {
                warn!(key = %key, error = %err, "skipping signal stage");
                return Ok(None);
            }
        };
        self.store.save_indicators(key, &indicator_rows).await?;

        let signal_rows = rules::generate(&indicator_rows);
        self.store.save_signals(key, &signal_rows).await?;

        let tail = signal_rows
            .len()
            .saturating_sub(self.config.pipeline.snapshot_rows);
        Ok(Some(AssetSnapshot {
            symbol: key.symbol.clone(),
            rows: signal_rows[tail..].to_vec(),
        }))
    }

    /// # Summary
    /// 代理阶段：构建代理、产出建议并写入执行簿记。
    /// 任何失败都只记录，不向上传播。
    async fn run_agent(
        &self,
        snapshots: &[AssetSnapshot],
        processed: u32,
        failed: u32,
    ) -> Vec<Recommendation> {
        let started = Instant::now();
        let run_at = Utc::now();

        let (kind, model, result) = match AgentFactory::build(&self.config.agent) {
            Ok(agent) => {
                let result = agent.recommend(snapshots).await;
                (agent.kind(), agent.model(), result)
            }
            Err(err) => (AgentKind::Local, None, Err(err)),
        };

        let (status, error, recommendations) = match result {
            Ok(recs) => {
                let status = if failed == 0 {
                    RunStatus::Success
                } else if processed > 0 {
                    RunStatus::Partial
                } else {
                    RunStatus::Failed
                };
                (status, None, recs)
            }
            Err(err) => {
                warn!(error = %err, "agent run failed");
                (RunStatus::Failed, Some(err.to_string()), Vec::new())
            }
        };

        let run = AgentRun {
            run_at,
            kind,
            model,
            assets_processed: processed,
            assets_failed: failed,
            duration_secs: started.elapsed().as_secs_f64(),
            status,
            error,
        };

        match self.store.record_agent_run(&run).await {
            Ok(run_id) => {
                if let Err(err) = self.store.save_recommendations(run_id, &recommendations).await {
                    warn!(error = %err, "failed to persist recommendations");
                }
            }
            Err(err) => warn!(error = %err, "failed to record agent run"),
        }

        info!(
            status = %run.status,
            recommendations = recommendations.len(),
            "agent stage finished"
        );
        recommendations
    }

    fn render_dashboard(
        &self,
        recommendations: &[Recommendation],
        snapshots: &[AssetSnapshot],
    ) -> anyhow::Result<()> {
        let html = dashboard::render(Utc::now(), recommendations, snapshots);
        dashboard::write_report(&self.config.dashboard.output_path, &html)
            .context("failed to write dashboard")?;
        info!(path = %self.config.dashboard.output_path, "dashboard rendered");
        Ok(())
    }
}
