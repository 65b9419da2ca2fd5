use crate::freshness::{self, FreshnessPolicy};
use crate::merge::merge_candles;
use dashmap::DashMap;
use std::sync::Arc;
use stocklens_core::cache::entity::{FetchAction, FetchDecision, SeriesOutcome};
use stocklens_core::cache::error::CacheError;
use stocklens_core::common::SeriesKey;
use stocklens_core::common::time::TimeProvider;
use stocklens_core::market::port::MarketDataProvider;
use stocklens_core::store::port::MarketStore;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// # Summary
/// 序列缓存编排器：串联存储读取、新鲜度判定、外部抓取、合并与写回，
/// 是获取 K 线序列的唯一公共入口。
///
/// # Invariants
/// - 同一 SeriesKey 的 fetch+merge+write 全程互斥，至多一个在途，
///   以保证存储层 Upsert 幂等语义不被交错写破坏。
/// - 存储读取失败永远向上传播；抓取失败仅在无可用缓存时致命。
/// - 缓存数据永不自动淘汰，删除只走存储层的管理接口。
pub struct SeriesCache {
    // 持久化存储驱动
    store: Arc<dyn MarketStore>,
    // 时间供给器，新鲜度判定的 now 来源
    clock: Arc<dyn TimeProvider>,
    // 新鲜度策略参数
    policy: FreshnessPolicy,
    // 每序列一把的互斥锁表
    locks: DashMap<SeriesKey, Arc<Mutex<()>>>,
}

impl SeriesCache {
    /// # Summary
    /// 构造序列缓存编排器。
    ///
    /// # Arguments
    /// * `store`: 存储驱动。
    /// * `clock`: 时间供给器。
    /// * `policy`: 新鲜度策略。
    pub fn new(
        store: Arc<dyn MarketStore>,
        clock: Arc<dyn TimeProvider>,
        policy: FreshnessPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            policy,
            locks: DashMap::new(),
        }
    }

    /// # Summary
    /// 获取一条最新的 K 线序列。
    ///
    /// # Logic
    /// 1. 取得该序列的互斥锁，串行化并发访问。
    /// 2. O(1) 读取缓存元数据。
    /// 3. `use_cache` 为 false 时无条件全量抓取；否则交由新鲜度判定。
    /// 4. 判定为复用缓存时直接按 `requested_limit` 读取返回（热路径，
    ///    零外部调用）。
    /// 5. 否则调用提供商抓取、与缓存合并、写回存储，返回满足
    ///    `requested_limit` 的最终切片。
    ///
    /// # Arguments
    /// * `key`: 序列身份。
    /// * `requested_limit`: 请求的总行数。
    /// * `use_cache`: 是否允许走缓存判定；false 则强制全量刷新。
    /// * `provider`: 数据抓取协作者。
    ///
    /// # Returns
    /// 成功返回 `SeriesOutcome`（数据 + 决策元数据），失败返回
    /// `CacheError`。
    pub async fn get_series(
        &self,
        key: &SeriesKey,
        requested_limit: usize,
        use_cache: bool,
        provider: &dyn MarketDataProvider,
    ) -> Result<SeriesOutcome, CacheError> {
        let lock = {
            let entry = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            entry.clone()
        };
        let _guard = lock.lock().await;

        let meta = self.store.latest_meta(key).await?;

        let decision = if use_cache {
            freshness::decide(
                meta.as_ref(),
                self.clock.now(),
                key.interval,
                requested_limit,
                &self.policy,
            )
        } else {
            FetchDecision {
                action: FetchAction::FullFetch,
                from: None,
                request_limit: requested_limit,
            }
        };
        debug!(key = %key, action = %decision.action, "cache decision");

        if decision.action == FetchAction::UseCache {
            let candles = self
                .store
                .read_candles(key, None, None, Some(requested_limit))
                .await?;
            return Ok(SeriesOutcome {
                candles,
                action: FetchAction::UseCache,
                served_stale: false,
                rows_written: 0,
                write_error: None,
            });
        }

        self.refresh(key, requested_limit, decision, meta.is_some(), provider)
            .await
    }

    /// # Summary
    /// 执行一次抓取-合并-写回循环。
    ///
    /// # Logic
    /// 1. 按判定参数调用提供商。
    /// 2. 抓取失败且存在非空缓存时降级：返回过期数据并打上
    ///    `served_stale` 标记；无缓存则传播 `FetchError`。
    /// 3. 将新数据与缓存合并（新值覆盖旧值），仅写回新抓取的行。
    /// 4. 写回失败不丢弃内存中的合并结果，错误随结果一并上交。
    async fn refresh(
        &self,
        key: &SeriesKey,
        requested_limit: usize,
        decision: FetchDecision,
        have_cache: bool,
        provider: &dyn MarketDataProvider,
    ) -> Result<SeriesOutcome, CacheError> {
        let fetched = match provider
            .fetch_candles(key, decision.from, decision.request_limit)
            .await
        {
            Ok(candles) => candles,
            Err(err) => {
                if have_cache {
                    let candles = self
                        .store
                        .read_candles(key, None, None, Some(requested_limit))
                        .await?;
                    if !candles.is_empty() {
                        warn!(key = %key, error = %err, "fetch failed, serving stale cache");
                        return Ok(SeriesOutcome {
                            candles,
                            action: decision.action,
                            served_stale: true,
                            rows_written: 0,
                            write_error: None,
                        });
                    }
                }
                return Err(CacheError::Fetch(err));
            }
        };

        let existing = if have_cache {
            self.store.read_candles(key, None, None, None).await?
        } else {
            Vec::new()
        };
        let merged = merge_candles(existing, fetched.clone());

        // 仅写回新抓取的行；Upsert 幂等，覆盖被修订的旧行
        let (rows_written, write_error) = match self.store.write_candles(key, &fetched).await {
            Ok(rows) => (rows, None),
            Err(err) => {
                warn!(key = %key, error = %err, "write-back failed, returning in-memory merge");
                (0, Some(err))
            }
        };

        let candles = if merged.len() > requested_limit {
            merged[merged.len() - requested_limit..].to_vec()
        } else {
            merged
        };

        Ok(SeriesOutcome {
            candles,
            action: decision.action,
            served_stale: false,
            rows_written,
            write_error,
        })
    }
}
