use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::Path;
use stocklens_core::agent::entity::{AgentRun, Recommendation};
use stocklens_core::common::SeriesKey;
use stocklens_core::market::entity::{Candle, SeriesMeta};
use stocklens_core::signal::entity::{IndicatorRow, SignalRow};
use stocklens_core::store::error::StoreError;
use stocklens_core::store::port::{AnalysisStore, CacheStats, MarketStore, StoredRecommendation};
use tracing::debug;

// 建库语句，按依赖顺序执行
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS candles (
        symbol TEXT NOT NULL,
        source TEXT NOT NULL,
        interval TEXT NOT NULL,
        time DATETIME NOT NULL,
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        volume REAL NOT NULL,
        PRIMARY KEY (symbol, source, interval, time)
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_candles_source
    ON candles (source, symbol, interval);
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS series_meta (
        symbol TEXT NOT NULL,
        source TEXT NOT NULL,
        interval TEXT NOT NULL,
        row_count INTEGER NOT NULL,
        latest DATETIME NOT NULL,
        last_refreshed DATETIME NOT NULL,
        PRIMARY KEY (symbol, source, interval)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS indicators (
        symbol TEXT NOT NULL,
        source TEXT NOT NULL,
        interval TEXT NOT NULL,
        time DATETIME NOT NULL,
        close REAL NOT NULL,
        rsi_14 REAL NOT NULL,
        macd REAL NOT NULL,
        macd_signal REAL NOT NULL,
        atr_14 REAL NOT NULL,
        adx REAL NOT NULL,
        obv REAL NOT NULL,
        PRIMARY KEY (symbol, source, interval, time)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS signals (
        symbol TEXT NOT NULL,
        source TEXT NOT NULL,
        interval TEXT NOT NULL,
        time DATETIME NOT NULL,
        close REAL NOT NULL,
        rsi_14 REAL NOT NULL,
        macd REAL NOT NULL,
        macd_signal REAL NOT NULL,
        atr_14 REAL NOT NULL,
        adx REAL NOT NULL,
        obv REAL NOT NULL,
        sig_momentum_trend INTEGER NOT NULL DEFAULT 0,
        sig_mean_reversion INTEGER NOT NULL DEFAULT 0,
        sig_volume INTEGER NOT NULL DEFAULT 0,
        score INTEGER NOT NULL DEFAULT 0,
        recommendation TEXT NOT NULL CHECK (recommendation IN ('buy', 'sell', 'hold')),
        PRIMARY KEY (symbol, source, interval, time)
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS agent_runs (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_at DATETIME NOT NULL,
        agent_kind TEXT NOT NULL CHECK (agent_kind IN ('local', 'llm')),
        llm_provider TEXT,
        llm_model TEXT,
        assets_processed INTEGER NOT NULL DEFAULT 0,
        assets_failed INTEGER NOT NULL DEFAULT 0,
        duration_secs REAL,
        status TEXT NOT NULL CHECK (status IN ('success', 'partial', 'failed')),
        error TEXT
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS recommendations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        run_id INTEGER NOT NULL REFERENCES agent_runs(id),
        symbol TEXT NOT NULL,
        action TEXT NOT NULL CHECK (action IN ('buy', 'sell', 'hold')),
        rationale TEXT NOT NULL,
        confidence REAL,
        price REAL,
        time DATETIME NOT NULL,
        created_at DATETIME NOT NULL
    );
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_recommendations_symbol
    ON recommendations (symbol, id DESC);
    "#,
];

/// # Summary
/// `MarketStore` 与 `AnalysisStore` 的 SQLite 实现，所有序列共用一个
/// 数据库文件。
///
/// # Invariants
/// - 数据库路径由构造函数显式注入，不依赖任何进程级全局状态。
/// - `series_meta` 与 `candles` 在同一事务内维护，元数据永不漂移。
pub struct SqliteMarketStore {
    pool: SqlitePool,
}

impl SqliteMarketStore {
    /// # Summary
    /// 打开（必要时创建）数据库并初始化表结构。
    ///
    /// # Logic
    /// 1. 确保父目录存在。
    /// 2. 配置 SQLite 连接选项，开启 `create_if_missing`。
    /// 3. 依次执行建库语句。
    ///
    /// # Arguments
    /// * `path` - 数据库文件路径。
    ///
    /// # Returns
    /// * `Result<Self, StoreError>` - 存储实例或初始化错误。
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Init(e.to_string()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Init(e.to_string()))?;

        for ddl in SCHEMA {
            sqlx::query(ddl)
                .execute(&pool)
                .await
                .map_err(|e| StoreError::Init(e.to_string()))?;
        }

        debug!(path = %path.display(), "market store opened");
        Ok(Self { pool })
    }
}

#[async_trait]
impl MarketStore for SqliteMarketStore {
    /// # Summary
    /// O(1) 读取序列元数据。
    ///
    /// # Logic
    /// 直接命中 `series_meta` 主键行，不触碰 `candles` 表。
    async fn latest_meta(&self, key: &SeriesKey) -> Result<Option<SeriesMeta>, StoreError> {
        let row = sqlx::query_as::<_, (i64, DateTime<Utc>, DateTime<Utc>)>(
            r#"
            SELECT row_count, latest, last_refreshed
            FROM series_meta
            WHERE symbol = ? AND source = ? AND interval = ?
            "#,
        )
        .bind(&key.symbol)
        .bind(key.source.to_string())
        .bind(key.interval.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(row.map(|(row_count, latest, last_refreshed)| SeriesMeta {
            latest,
            row_count: u64::try_from(row_count).unwrap_or(0),
            last_refreshed,
        }))
    }

    /// # Summary
    /// 区间查询 K 线，结果升序。
    ///
    /// # Logic
    /// 1. 按给定条件拼接过滤子句。
    /// 2. 统一以 `time DESC` 取数，使 `limit` 截取最近的行。
    /// 3. 内存中反转为升序后映射为实体。
    async fn read_candles(
        &self,
        key: &SeriesKey,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
        limit: Option<usize>,
    ) -> Result<Vec<Candle>, StoreError> {
        let mut sql = String::from(
            "SELECT time, open, high, low, close, volume FROM candles \
             WHERE symbol = ? AND source = ? AND interval = ?",
        );
        if from.is_some() {
            sql.push_str(" AND time >= ?");
        }
        if to.is_some() {
            sql.push_str(" AND time <= ?");
        }
        sql.push_str(" ORDER BY time DESC");
        if limit.is_some() {
            sql.push_str(" LIMIT ?");
        }

        let mut query = sqlx::query_as::<_, (DateTime<Utc>, f64, f64, f64, f64, f64)>(&sql)
            .bind(&key.symbol)
            .bind(key.source.to_string())
            .bind(key.interval.to_string());
        if let Some(from) = from {
            query = query.bind(from);
        }
        if let Some(to) = to {
            query = query.bind(to);
        }
        if let Some(limit) = limit {
            query = query.bind(i64::try_from(limit).unwrap_or(i64::MAX));
        }

        let mut rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        rows.reverse();

        Ok(rows
            .into_iter()
            .map(|(time, open, high, low, close, volume)| Candle {
                time,
                open,
                high,
                low,
                close,
                volume,
            })
            .collect())
    }

    /// # Summary
    /// 事务内批量 Upsert K 线并重算序列元数据。
    ///
    /// # Logic
    /// 1. 逐行执行 `INSERT OR REPLACE`，按 `(key, time)` 幂等覆盖。
    /// 2. 同一事务内以 `COUNT(*)`/`MAX(time)` 重建 `series_meta` 行。
    /// 3. 提交后返回受影响行数；提交完成即持久化完成。
    async fn write_candles(
        &self,
        key: &SeriesKey,
        candles: &[Candle],
    ) -> Result<u64, StoreError> {
        if candles.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut written = 0u64;
        for candle in candles {
            let result = sqlx::query(
                r#"
                INSERT OR REPLACE INTO candles
                (symbol, source, interval, time, open, high, low, close, volume)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&key.symbol)
            .bind(key.source.to_string())
            .bind(key.interval.to_string())
            .bind(candle.time)
            .bind(candle.open)
            .bind(candle.high)
            .bind(candle.low)
            .bind(candle.close)
            .bind(candle.volume)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
            written += result.rows_affected();
        }

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO series_meta
            (symbol, source, interval, row_count, latest, last_refreshed)
            SELECT ?1, ?2, ?3, COUNT(*), MAX(time), ?4
            FROM candles
            WHERE symbol = ?1 AND source = ?2 AND interval = ?3
            "#,
        )
        .bind(&key.symbol)
        .bind(key.source.to_string())
        .bind(key.interval.to_string())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        debug!(key = %key, rows = written, "candles written");
        Ok(written)
    }
}

#[async_trait]
impl AnalysisStore for SqliteMarketStore {
    /// # Summary
    /// 批量 Upsert 指标行。
    async fn save_indicators(
        &self,
        key: &SeriesKey,
        rows: &[IndicatorRow],
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO indicators
                (symbol, source, interval, time, close, rsi_14, macd, macd_signal, atr_14, adx, obv)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&key.symbol)
            .bind(key.source.to_string())
            .bind(key.interval.to_string())
            .bind(row.time)
            .bind(row.close)
            .bind(row.rsi_14)
            .bind(row.macd)
            .bind(row.macd_signal)
            .bind(row.atr_14)
            .bind(row.adx)
            .bind(row.obv)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// # Summary
    /// 批量 Upsert 信号行。
    async fn save_signals(&self, key: &SeriesKey, rows: &[SignalRow]) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO signals
                (symbol, source, interval, time, close, rsi_14, macd, macd_signal, atr_14, adx, obv,
                 sig_momentum_trend, sig_mean_reversion, sig_volume, score, recommendation)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&key.symbol)
            .bind(key.source.to_string())
            .bind(key.interval.to_string())
            .bind(row.time)
            .bind(row.close)
            .bind(row.rsi_14)
            .bind(row.macd)
            .bind(row.macd_signal)
            .bind(row.atr_14)
            .bind(row.adx)
            .bind(row.obv)
            .bind(row.sig_momentum_trend)
            .bind(row.sig_mean_reversion)
            .bind(row.sig_volume)
            .bind(row.score)
            .bind(row.recommendation.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// # Summary
    /// 记录一次代理执行，返回自增的运行 ID。
    async fn record_agent_run(&self, run: &AgentRun) -> Result<i64, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO agent_runs
            (run_at, agent_kind, llm_provider, llm_model, assets_processed, assets_failed,
             duration_secs, status, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.run_at)
        .bind(run.kind.label())
        .bind(run.kind.provider().map(|p| p.to_string()))
        .bind(run.model.as_deref())
        .bind(i64::from(run.assets_processed))
        .bind(i64::from(run.assets_failed))
        .bind(run.duration_secs)
        .bind(run.status.to_string())
        .bind(run.error.as_deref())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    /// # Summary
    /// 事务内写入某次执行的全部建议。
    async fn save_recommendations(
        &self,
        run_id: i64,
        recs: &[Recommendation],
    ) -> Result<(), StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        for rec in recs {
            sqlx::query(
                r#"
                INSERT INTO recommendations
                (run_id, symbol, action, rationale, confidence, price, time, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(&rec.symbol)
            .bind(rec.action.to_string())
            .bind(&rec.rationale)
            .bind(rec.confidence)
            .bind(rec.price)
            .bind(rec.time)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// # Summary
    /// 按写入顺序倒序查询最近的建议历史。
    async fn recent_recommendations(
        &self,
        symbol: Option<&str>,
        limit: usize,
    ) -> Result<Vec<StoredRecommendation>, StoreError> {
        let mut sql = String::from(
            "SELECT r.symbol, r.action, r.rationale, r.confidence, r.price, r.time, r.created_at, \
                    a.agent_kind, a.llm_provider, a.llm_model \
             FROM recommendations r JOIN agent_runs a ON a.id = r.run_id",
        );
        if symbol.is_some() {
            sql.push_str(" WHERE r.symbol = ?");
        }
        sql.push_str(" ORDER BY r.id DESC LIMIT ?");

        type RecRow = (
            String,
            String,
            String,
            Option<f64>,
            Option<f64>,
            DateTime<Utc>,
            DateTime<Utc>,
            String,
            Option<String>,
            Option<String>,
        );

        let mut query = sqlx::query_as::<_, RecRow>(&sql);
        if let Some(symbol) = symbol {
            query = query.bind(symbol);
        }
        query = query.bind(i64::try_from(limit).unwrap_or(i64::MAX));

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut out = Vec::with_capacity(rows.len());
        for (
            symbol,
            action,
            rationale,
            confidence,
            price,
            time,
            created_at,
            agent_kind,
            llm_provider,
            llm_model,
        ) in rows
        {
            let action = action.parse().map_err(StoreError::Database)?;
            out.push(StoredRecommendation {
                recommendation: Recommendation {
                    symbol,
                    action,
                    rationale,
                    confidence,
                    price,
                    time,
                },
                agent_kind,
                llm_provider,
                llm_model,
                created_at,
            });
        }
        Ok(out)
    }

    /// # Summary
    /// 汇总缓存库统计信息。
    async fn cache_stats(&self) -> Result<CacheStats, StoreError> {
        let (total, symbols, oldest, newest) = sqlx::query_as::<
            _,
            (i64, i64, Option<DateTime<Utc>>, Option<DateTime<Utc>>),
        >(
            "SELECT COUNT(*), COUNT(DISTINCT symbol), MIN(time), MAX(time) FROM candles",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(CacheStats {
            total_rows: u64::try_from(total).unwrap_or(0),
            unique_symbols: u64::try_from(symbols).unwrap_or(0),
            oldest,
            newest,
        })
    }

    /// # Summary
    /// 删除单个序列的全部派生数据与元数据。
    async fn purge_series(&self, key: &SeriesKey) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut deleted = 0u64;
        for table in ["candles", "indicators", "signals", "series_meta"] {
            let sql = format!(
                "DELETE FROM {} WHERE symbol = ? AND source = ? AND interval = ?",
                table
            );
            let result = sqlx::query(&sql)
                .bind(&key.symbol)
                .bind(key.source.to_string())
                .bind(key.interval.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            if table == "candles" {
                deleted = result.rows_affected();
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(deleted)
    }

    /// # Summary
    /// 清空全部市场数据表（K 线、指标、信号、元数据）。
    async fn purge_all(&self) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut deleted = 0u64;
        for table in ["candles", "indicators", "signals", "series_meta"] {
            let sql = format!("DELETE FROM {}", table);
            let result = sqlx::query(&sql)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
            if table == "candles" {
                deleted = result.rows_affected();
            }
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(deleted)
    }
}
