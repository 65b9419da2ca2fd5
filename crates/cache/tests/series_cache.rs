use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use stocklens_cache::freshness::FreshnessPolicy;
use stocklens_cache::series::SeriesCache;
use stocklens_core::cache::entity::FetchAction;
use stocklens_core::cache::error::CacheError;
use stocklens_core::common::time::{FakeClockProvider, TimeProvider};
use stocklens_core::common::{Interval, SeriesKey, Source};
use stocklens_core::market::entity::Candle;
use stocklens_core::market::error::FetchError;
use stocklens_core::market::port::MarketDataProvider;
use stocklens_core::store::port::MarketStore;
use stocklens_store::market::SqliteMarketStore;
use tempfile::tempdir;

/// # Summary
/// 为测试提供的脚本化行情驱动：按预设队列出队响应，并记录调用参数。
struct ScriptedProvider {
    // 预设的响应队列
    responses: tokio::sync::Mutex<VecDeque<Result<Vec<Candle>, FetchError>>>,
    // 抓取调用计数
    calls: AtomicUsize,
    // 最近一次调用的 (from, limit)
    last_args: std::sync::Mutex<Option<(Option<DateTime<Utc>>, usize)>>,
    // 模拟网络延迟
    delay_ms: u64,
}

impl ScriptedProvider {
    fn new(responses: Vec<Result<Vec<Candle>, FetchError>>) -> Self {
        Self {
            responses: tokio::sync::Mutex::new(responses.into_iter().collect()),
            calls: AtomicUsize::new(0),
            last_args: std::sync::Mutex::new(None),
            delay_ms: 0,
        }
    }

    fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn last_args(&self) -> Option<(Option<DateTime<Utc>>, usize)> {
        *self.last_args.lock().unwrap()
    }
}

#[async_trait]
impl MarketDataProvider for ScriptedProvider {
    async fn fetch_candles(
        &self,
        _key: &SeriesKey,
        from: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Candle>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_args.lock().unwrap() = Some((from, limit));
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        self.responses
            .lock()
            .await
            .pop_front()
            .unwrap_or(Err(FetchError::Unknown("script exhausted".to_string())))
    }
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

fn daily_candle(time: DateTime<Utc>, close: f64) -> Candle {
    Candle {
        time,
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 100.0,
    }
}

/// 生成 `count` 根日线，最后一根的时间为 `latest`。
fn daily_series(latest: DateTime<Utc>, count: usize) -> Vec<Candle> {
    (0..count)
        .map(|i| {
            let offset = i64::try_from(count - 1 - i).unwrap();
            daily_candle(latest - Duration::days(offset), 100.0 + i as f64)
        })
        .collect()
}

fn btc_daily() -> SeriesKey {
    SeriesKey::new("BTCUSDT", Source::Binance, Interval::Day1)
}

async fn setup(now: DateTime<Utc>) -> (tempfile::TempDir, Arc<SqliteMarketStore>, Arc<FakeClockProvider>, SeriesCache) {
    let tmp = tempdir().expect("temp dir");
    let store = Arc::new(
        SqliteMarketStore::open(tmp.path().join("cache.db"))
            .await
            .expect("open store"),
    );
    let clock = Arc::new(FakeClockProvider::new(now));
    let cache = SeriesCache::new(
        store.clone() as Arc<dyn MarketStore>,
        clock.clone() as Arc<dyn TimeProvider>,
        FreshnessPolicy::default(),
    );
    (tmp, store, clock, cache)
}

#[tokio::test]
async fn test_empty_store_full_fetches_and_writes_through() {
    let now = base_time();
    let (_tmp, store, _clock, cache) = setup(now).await;
    let key = btc_daily();

    let provider = ScriptedProvider::new(vec![Ok(daily_series(now, 1000))]);
    let outcome = cache
        .get_series(&key, 1000, true, &provider)
        .await
        .expect("get_series");

    assert_eq!(outcome.action, FetchAction::FullFetch);
    assert_eq!(outcome.candles.len(), 1000);
    assert!(!outcome.served_stale);
    assert!(outcome.write_error.is_none());
    assert_eq!(outcome.rows_written, 1000);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(provider.last_args(), Some((None, 1000)));

    // 写穿：崩溃后下一次读取必须能看到本次写入
    let meta = store.latest_meta(&key).await.unwrap().expect("meta");
    assert_eq!(meta.row_count, 1000);
    assert_eq!(meta.latest, now);
}

#[tokio::test]
async fn test_fresh_cache_is_served_without_fetch() {
    // 日线，最新一根是昨天，now 在 max_age 之内
    let latest = base_time();
    let now = latest + Duration::hours(12);
    let (_tmp, store, _clock, cache) = setup(now).await;
    let key = btc_daily();

    store
        .write_candles(&key, &daily_series(latest, 1000))
        .await
        .unwrap();

    let provider = ScriptedProvider::new(vec![]);
    let outcome = cache
        .get_series(&key, 1000, true, &provider)
        .await
        .expect("get_series");

    assert_eq!(outcome.action, FetchAction::UseCache);
    assert_eq!(outcome.candles.len(), 1000);
    // 热路径：零外部调用
    assert_eq!(provider.call_count(), 0);
    assert!(outcome.candles.windows(2).all(|w| w[0].time < w[1].time));
}

#[tokio::test]
async fn test_stale_cache_incremental_merge_supersedes_last_bar() {
    // 最新一根是 3 天前，缓存过期
    let latest = base_time();
    let now = latest + Duration::days(3);
    let (_tmp, store, _clock, cache) = setup(now).await;
    let key = btc_daily();

    store
        .write_candles(&key, &daily_series(latest, 1000))
        .await
        .unwrap();

    // 抓回 3 根：与最后一根缓存重叠的修订值 + 2 根新 K 线
    let incoming = vec![
        daily_candle(latest, 999.0),
        daily_candle(latest + Duration::days(1), 1001.0),
        daily_candle(latest + Duration::days(2), 1002.0),
    ];
    let provider = ScriptedProvider::new(vec![Ok(incoming)]);

    let outcome = cache
        .get_series(&key, 1000, true, &provider)
        .await
        .expect("get_series");

    assert_eq!(outcome.action, FetchAction::IncrementalFetch);
    // 增量起点 = 最后一根缓存（含）
    let (from, limit) = provider.last_args().expect("provider called");
    assert_eq!(from, Some(latest));
    // 缺口 3 根 + 重抓的最后一根 + 1 根余量
    assert_eq!(limit, 5);

    // 1000 + 3 - 1 个重叠 = 1002 个不同时间戳
    let meta = store.latest_meta(&key).await.unwrap().expect("meta");
    assert_eq!(meta.row_count, 1002);

    // 返回切片满足请求条数，且重叠的 K 线被新值覆盖
    assert_eq!(outcome.candles.len(), 1000);
    let revised = outcome
        .candles
        .iter()
        .find(|c| c.time == latest)
        .expect("revised bar in slice");
    assert_eq!(revised.close, 999.0);
}

#[tokio::test]
async fn test_fetch_failure_degrades_to_stale_cache() {
    let latest = base_time();
    let now = latest + Duration::days(10);
    let (_tmp, store, _clock, cache) = setup(now).await;
    let key = btc_daily();

    store
        .write_candles(&key, &daily_series(latest, 50))
        .await
        .unwrap();

    let provider = ScriptedProvider::new(vec![Err(FetchError::Network(
        "connection refused".to_string(),
    ))]);
    let outcome = cache
        .get_series(&key, 50, true, &provider)
        .await
        .expect("degraded result is not an error");

    assert!(outcome.served_stale);
    assert_eq!(outcome.candles.len(), 50);
    assert_eq!(outcome.rows_written, 0);
}

#[tokio::test]
async fn test_fetch_failure_without_cache_is_fatal() {
    let (_tmp, _store, _clock, cache) = setup(base_time()).await;
    let key = btc_daily();

    let provider = ScriptedProvider::new(vec![Err(FetchError::RateLimited)]);
    let err = cache
        .get_series(&key, 100, true, &provider)
        .await
        .expect_err("no cache to degrade to");
    assert!(matches!(err, CacheError::Fetch(FetchError::RateLimited)));
}

#[tokio::test]
async fn test_use_cache_false_bypasses_evaluator() {
    // 缓存新鲜且充足，但调用方强制刷新
    let latest = base_time();
    let now = latest + Duration::hours(1);
    let (_tmp, store, _clock, cache) = setup(now).await;
    let key = btc_daily();

    store
        .write_candles(&key, &daily_series(latest, 100))
        .await
        .unwrap();

    let provider = ScriptedProvider::new(vec![Ok(daily_series(now, 100))]);
    let outcome = cache
        .get_series(&key, 100, false, &provider)
        .await
        .expect("get_series");

    assert_eq!(outcome.action, FetchAction::FullFetch);
    assert_eq!(provider.call_count(), 1);
    assert_eq!(provider.last_args(), Some((None, 100)));
}

#[tokio::test]
async fn test_fresh_but_short_cache_refetches_to_requested_size() {
    // 100 根新鲜缓存，但调用方要 300 根：充足性优先于新鲜度
    let latest = base_time();
    let now = latest + Duration::hours(2);
    let (_tmp, store, _clock, cache) = setup(now).await;
    let key = btc_daily();

    store
        .write_candles(&key, &daily_series(latest, 100))
        .await
        .unwrap();

    let provider = ScriptedProvider::new(vec![Ok(daily_series(latest, 300))]);
    let outcome = cache
        .get_series(&key, 300, true, &provider)
        .await
        .expect("get_series");

    assert_eq!(outcome.action, FetchAction::FullFetch);
    assert_eq!(provider.last_args(), Some((None, 300)));
    assert_eq!(outcome.candles.len(), 300);

    let meta = store.latest_meta(&key).await.unwrap().expect("meta");
    assert_eq!(meta.row_count, 300);
}

#[tokio::test]
async fn test_concurrent_access_to_same_key_fetches_once() {
    let now = base_time();
    let (_tmp, _store, _clock, cache) = setup(now).await;
    let cache = Arc::new(cache);
    let key = btc_daily();

    // 第一个调用在抓取中挂起时，第二个调用必须等锁；
    // 等到锁后缓存已新鲜，直接复用
    let provider = ScriptedProvider::new(vec![Ok(daily_series(now, 10))]).with_delay(50);

    let first = cache.get_series(&key, 10, true, &provider);
    let second = cache.get_series(&key, 10, true, &provider);
    let (a, b) = tokio::join!(first, second);

    let a = a.expect("first call");
    let b = b.expect("second call");
    assert_eq!(provider.call_count(), 1);
    assert_eq!(a.candles.len(), 10);
    assert_eq!(b.candles.len(), 10);
    assert!(
        (a.action == FetchAction::FullFetch && b.action == FetchAction::UseCache)
            || (a.action == FetchAction::UseCache && b.action == FetchAction::FullFetch)
    );
}
