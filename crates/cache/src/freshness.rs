use chrono::{DateTime, Duration, Utc};
use stocklens_core::cache::entity::{FetchAction, FetchDecision};
use stocklens_core::common::Interval;
use stocklens_core::market::entity::SeriesMeta;

/// # Summary
/// 新鲜度策略参数。阈值与周期成正比，并带一个常量下限，
/// 避免分钟级序列在每次访问时都触发补抓。
///
/// # Invariants
/// - `fetch_ceiling >= 1`，增量窗口永不超过该上限。
#[derive(Debug, Clone)]
pub struct FreshnessPolicy {
    // 过期阈值下限
    pub stale_floor: Duration,
    // 单次抓取的行数上限
    pub fetch_ceiling: usize,
    // 增量窗口的余量根数
    pub margin_bars: usize,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            stale_floor: Duration::minutes(5),
            fetch_ceiling: 1000,
            margin_bars: 1,
        }
    }
}

impl FreshnessPolicy {
    /// 某周期允许的最大缓存年龄：一个完整周期，且不低于下限。
    pub fn max_age(&self, interval: Interval) -> Duration {
        let period = interval.period();
        if period > self.stale_floor {
            period
        } else {
            self.stale_floor
        }
    }
}

/// # Summary
/// 核心新鲜度判定：给定缓存元数据与当前时间，决定是直接复用缓存、
/// 增量补抓还是全量抓取。每次访问重新计算，结果不持久化。
///
/// # Logic
/// 1. 无缓存：全量抓取 `requested_limit` 根。
/// 2. 缓存行数不足：即便新鲜也按 `requested_limit` 全量抓取
///    （新鲜度与充足性是两个正交维度）。
/// 3. 年龄超过 `max_age`：从最后一根 K 线（含）起增量抓取，
///    窗口为覆盖缺口所需根数加余量，封顶 `fetch_ceiling`。
/// 4. 其余情况复用缓存，零外部调用。
///
/// # Arguments
/// * `meta`: 序列元数据，从未抓取过时为 None。
/// * `now`: 判定时刻（由 TimeProvider 注入）。
/// * `interval`: 序列周期。
/// * `requested_limit`: 调用方请求的总行数。
/// * `policy`: 策略参数。
///
/// # Returns
/// 本次访问的 `FetchDecision`。
pub fn decide(
    meta: Option<&SeriesMeta>,
    now: DateTime<Utc>,
    interval: Interval,
    requested_limit: usize,
    policy: &FreshnessPolicy,
) -> FetchDecision {
    let Some(meta) = meta else {
        return FetchDecision {
            action: FetchAction::FullFetch,
            from: None,
            request_limit: requested_limit,
        };
    };

    if meta.row_count < requested_limit as u64 {
        return FetchDecision {
            action: FetchAction::FullFetch,
            from: None,
            request_limit: requested_limit,
        };
    }

    let age = now - meta.latest;
    if age <= policy.max_age(interval) {
        return FetchDecision {
            action: FetchAction::UseCache,
            from: None,
            request_limit: 0,
        };
    }

    // 覆盖缺口所需的根数：经过的完整周期数，外加被重抓的最后一根
    let period_secs = interval.period().num_seconds().max(1);
    let gap_bars = age.num_seconds().max(0) / period_secs + 1;
    let window = usize::try_from(gap_bars)
        .unwrap_or(policy.fetch_ceiling)
        .saturating_add(policy.margin_bars)
        .clamp(1, policy.fetch_ceiling.max(1));

    FetchDecision {
        action: FetchAction::IncrementalFetch,
        from: Some(meta.latest),
        request_limit: window,
    }
}
