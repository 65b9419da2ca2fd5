use stocklens_core::signal::entity::{IndicatorRow, RecAction, SignalRow};

// 趋势强度门槛：ADX 低于该值时动量信号不触发
const ADX_TREND_GATE: f64 = 20.0;
// RSI 超卖 / 超买边界
const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

/// # Summary
/// 规则层：把指标行翻译成信号标志、综合评分与建议动作。
///
/// # Logic
/// 1. 动量趋势：`macd > macd_signal` 且 `adx > 20` 记 1。
/// 2. 均值回归：`rsi < 30` 记 1（超卖），`rsi > 70` 记 -1（超买）。
/// 3. 量能：OBV 较上一行抬升记 1（首行无前值记 0）。
/// 4. 评分为三者之和；正分 buy、负分 sell、零分 hold。
///
/// # Arguments
/// * `rows`: 升序指标行。
///
/// # Returns
/// 与输入等长的信号行列表。
pub fn generate(rows: &[IndicatorRow]) -> Vec<SignalRow> {
    let mut out = Vec::with_capacity(rows.len());
    let mut prev_obv: Option<f64> = None;

    for row in rows {
        let sig_momentum_trend =
            i64::from(row.macd > row.macd_signal && row.adx > ADX_TREND_GATE);
        let sig_mean_reversion = if row.rsi_14 < RSI_OVERSOLD {
            1
        } else if row.rsi_14 > RSI_OVERBOUGHT {
            -1
        } else {
            0
        };
        let sig_volume = match prev_obv {
            Some(prev) if row.obv > prev => 1,
            _ => 0,
        };

        let score = sig_momentum_trend + sig_mean_reversion + sig_volume;
        let recommendation = if score > 0 {
            RecAction::Buy
        } else if score < 0 {
            RecAction::Sell
        } else {
            RecAction::Hold
        };

        out.push(SignalRow {
            time: row.time,
            close: row.close,
            rsi_14: row.rsi_14,
            macd: row.macd,
            macd_signal: row.macd_signal,
            atr_14: row.atr_14,
            adx: row.adx,
            obv: row.obv,
            sig_momentum_trend,
            sig_mean_reversion,
            sig_volume,
            score,
            recommendation,
        });
        prev_obv = Some(row.obv);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn row(n: i64, rsi: f64, macd: f64, signal: f64, adx: f64, obv: f64) -> IndicatorRow {
        IndicatorRow {
            time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n),
            close: 100.0,
            rsi_14: rsi,
            macd,
            macd_signal: signal,
            atr_14: 2.0,
            adx,
            obv,
        }
    }

    #[test]
    fn momentum_needs_both_macd_and_adx() {
        // MACD 在信号线上方但趋势弱：不触发
        let weak = generate(&[row(0, 50.0, 1.0, 0.5, 15.0, 0.0)]);
        assert_eq!(weak[0].sig_momentum_trend, 0);

        // 两个条件同时满足才记 1
        let strong = generate(&[row(0, 50.0, 1.0, 0.5, 25.0, 0.0)]);
        assert_eq!(strong[0].sig_momentum_trend, 1);
        assert_eq!(strong[0].recommendation, RecAction::Buy);
    }

    #[test]
    fn mean_reversion_is_symmetric() {
        let oversold = generate(&[row(0, 25.0, 0.0, 0.0, 10.0, 0.0)]);
        assert_eq!(oversold[0].sig_mean_reversion, 1);
        assert_eq!(oversold[0].recommendation, RecAction::Buy);

        let overbought = generate(&[row(0, 75.0, 0.0, 0.0, 10.0, 0.0)]);
        assert_eq!(overbought[0].sig_mean_reversion, -1);
        assert_eq!(overbought[0].recommendation, RecAction::Sell);

        let neutral = generate(&[row(0, 50.0, 0.0, 0.0, 10.0, 0.0)]);
        assert_eq!(neutral[0].sig_mean_reversion, 0);
        assert_eq!(neutral[0].recommendation, RecAction::Hold);
    }

    #[test]
    fn volume_signal_compares_against_previous_row() {
        let rows = vec![
            row(0, 50.0, 0.0, 0.0, 10.0, 100.0),
            row(1, 50.0, 0.0, 0.0, 10.0, 150.0),
            row(2, 50.0, 0.0, 0.0, 10.0, 120.0),
        ];
        let signals = generate(&rows);
        // 首行无前值
        assert_eq!(signals[0].sig_volume, 0);
        assert_eq!(signals[1].sig_volume, 1);
        assert_eq!(signals[2].sig_volume, 0);
    }

    #[test]
    fn score_is_the_sum_and_maps_to_action() {
        // 动量 1 + 超买 -1 + 量能 0 = 0 -> hold
        let rows = generate(&[row(0, 75.0, 2.0, 1.0, 30.0, 0.0)]);
        assert_eq!(rows[0].score, 0);
        assert_eq!(rows[0].recommendation, RecAction::Hold);

        // 动量 1 + 量能 1 = 2 -> buy
        let rows = generate(&[
            row(0, 50.0, 2.0, 1.0, 30.0, 0.0),
            row(1, 50.0, 2.0, 1.0, 30.0, 10.0),
        ]);
        assert_eq!(rows[1].score, 2);
        assert_eq!(rows[1].recommendation, RecAction::Buy);
    }
}
