use stocklens_core::market::entity::Candle;
use stocklens_core::signal::entity::IndicatorRow;
use stocklens_core::signal::error::SignalError;
use tracing::debug;

// 全部指标完成预热所需的最少 K 线数：
// MACD 信号线 (26 + 9 - 1 = 34 根起) 是最晚就绪的一项，
// 再多一根保证规则层至少能比较两行 OBV。
pub const MIN_CANDLES: usize = 35;

const RSI_PERIOD: usize = 14;
const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;
const ATR_PERIOD: usize = 14;
const ADX_PERIOD: usize = 14;

/// # Summary
/// 对一段升序 K 线计算全套技术指标，只输出所有指标均完成预热的行。
///
/// # Logic
/// 1. RSI/ATR/ADX 采用 Wilder 平滑，MACD 采用 12/26 EMA 加 9 EMA 信号线。
/// 2. 各指标独立计算为与输入对齐的可选序列。
/// 3. 按行对齐，任一指标未就绪的行整体丢弃（对应上游的 dropna 语义）。
///
/// # Arguments
/// * `candles`: 升序 K 线序列。
///
/// # Returns
/// 指标行列表；K 线不足以完成预热时返回 `SignalError::InsufficientData`。
pub fn compute(candles: &[Candle]) -> Result<Vec<IndicatorRow>, SignalError> {
    if candles.len() < MIN_CANDLES {
        return Err(SignalError::InsufficientData {
            required: MIN_CANDLES,
            available: candles.len(),
        });
    }

    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let rsi = rsi_series(&closes, RSI_PERIOD);
    let (macd, macd_signal) = macd_series(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL);
    let atr = atr_series(candles, ATR_PERIOD);
    let adx = adx_series(candles, ADX_PERIOD);
    let obv = obv_series(candles);

    let mut rows = Vec::with_capacity(candles.len());
    for (i, candle) in candles.iter().enumerate() {
        if let (Some(rsi_14), Some(macd), Some(macd_signal), Some(atr_14), Some(adx)) =
            (rsi[i], macd[i], macd_signal[i], atr[i], adx[i])
        {
            rows.push(IndicatorRow {
                time: candle.time,
                close: candle.close,
                rsi_14,
                macd,
                macd_signal,
                atr_14,
                adx,
                obv: obv[i],
            });
        }
    }

    debug!(
        input = candles.len(),
        output = rows.len(),
        "indicators computed"
    );
    Ok(rows)
}

/// 指数移动平均：以 SMA 为种子，输出与输入对齐。
fn ema_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }

    let divisor = period as f64;
    let alpha = 2.0 / (divisor + 1.0);
    let mut ema = values[..period].iter().sum::<f64>() / divisor;
    out[period - 1] = Some(ema);
    for i in period..n {
        ema = alpha * values[i] + (1.0 - alpha) * ema;
        out[i] = Some(ema);
    }
    out
}

/// Wilder RSI。
fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = closes.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
        if avg_loss == 0.0 {
            return 100.0;
        }
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }

    let divisor = period as f64;
    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let diff = closes[i] - closes[i - 1];
        if diff >= 0.0 {
            gains += diff;
        } else {
            losses -= diff;
        }
    }
    let mut avg_gain = gains / divisor;
    let mut avg_loss = losses / divisor;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for i in period + 1..n {
        let diff = closes[i] - closes[i - 1];
        let (gain, loss) = if diff >= 0.0 { (diff, 0.0) } else { (0.0, -diff) };
        avg_gain = (avg_gain * (divisor - 1.0) + gain) / divisor;
        avg_loss = (avg_loss * (divisor - 1.0) + loss) / divisor;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

/// MACD (快慢 EMA 差) 与其信号线。
fn macd_series(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = closes.len();
    let ema_fast = ema_series(closes, fast);
    let ema_slow = ema_series(closes, slow);

    let mut macd = vec![None; n];
    for i in 0..n {
        if let (Some(f), Some(s)) = (ema_fast[i], ema_slow[i]) {
            macd[i] = Some(f - s);
        }
    }

    // 信号线是 MACD 已定义后缀上的 EMA
    let mut signal_line = vec![None; n];
    let offset = macd.iter().position(|v| v.is_some());
    if let Some(offset) = offset {
        let defined: Vec<f64> = macd[offset..].iter().filter_map(|v| *v).collect();
        let smoothed = ema_series(&defined, signal);
        for (j, value) in smoothed.into_iter().enumerate() {
            signal_line[offset + j] = value;
        }
    }

    (macd, signal_line)
}

/// 真实波幅：首行无前收，从第二根起有定义。
fn true_range(candles: &[Candle], i: usize) -> f64 {
    let current = &candles[i];
    let prev_close = candles[i - 1].close;
    (current.high - current.low)
        .max((current.high - prev_close).abs())
        .max((current.low - prev_close).abs())
}

/// Wilder ATR。
fn atr_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    let divisor = period as f64;
    let mut atr = (1..=period).map(|i| true_range(candles, i)).sum::<f64>() / divisor;
    out[period] = Some(atr);
    for i in period + 1..n {
        atr = (atr * (divisor - 1.0) + true_range(candles, i)) / divisor;
        out[i] = Some(atr);
    }
    out
}

/// Wilder ADX：方向性移动平滑为 DX，再对 DX 做一次 Wilder 平均。
fn adx_series(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if period == 0 || n < 2 * period {
        return out;
    }

    let plus_dm = |i: usize| -> f64 {
        let up = candles[i].high - candles[i - 1].high;
        let down = candles[i - 1].low - candles[i].low;
        if up > down && up > 0.0 { up } else { 0.0 }
    };
    let minus_dm = |i: usize| -> f64 {
        let up = candles[i].high - candles[i - 1].high;
        let down = candles[i - 1].low - candles[i].low;
        if down > up && down > 0.0 { down } else { 0.0 }
    };
    let dx_value = |tr_sum: f64, pdm_sum: f64, mdm_sum: f64| -> f64 {
        if tr_sum == 0.0 {
            return 0.0;
        }
        let pdi = 100.0 * pdm_sum / tr_sum;
        let mdi = 100.0 * mdm_sum / tr_sum;
        if pdi + mdi == 0.0 {
            0.0
        } else {
            100.0 * (pdi - mdi).abs() / (pdi + mdi)
        }
    };

    let divisor = period as f64;
    let mut tr_sum = 0.0;
    let mut pdm_sum = 0.0;
    let mut mdm_sum = 0.0;
    for i in 1..=period {
        tr_sum += true_range(candles, i);
        pdm_sum += plus_dm(i);
        mdm_sum += minus_dm(i);
    }

    let mut dx = vec![None; n];
    dx[period] = Some(dx_value(tr_sum, pdm_sum, mdm_sum));
    for i in period + 1..n {
        tr_sum = tr_sum - tr_sum / divisor + true_range(candles, i);
        pdm_sum = pdm_sum - pdm_sum / divisor + plus_dm(i);
        mdm_sum = mdm_sum - mdm_sum / divisor + minus_dm(i);
        dx[i] = Some(dx_value(tr_sum, pdm_sum, mdm_sum));
    }

    // ADX 种子：前 period 个 DX 的算术平均
    let first_adx = 2 * period - 1;
    let mut adx = dx[period..=first_adx]
        .iter()
        .map(|v| v.unwrap_or(0.0))
        .sum::<f64>()
        / divisor;
    out[first_adx] = Some(adx);
    for i in first_adx + 1..n {
        adx = (adx * (divisor - 1.0) + dx[i].unwrap_or(0.0)) / divisor;
        out[i] = Some(adx);
    }
    out
}

/// 能量潮：逐根累计的成交量流向，从首行即有定义。
fn obv_series(candles: &[Candle]) -> Vec<f64> {
    let mut out = Vec::with_capacity(candles.len());
    let mut obv = 0.0;
    for i in 0..candles.len() {
        if i > 0 {
            if candles[i].close > candles[i - 1].close {
                obv += candles[i].volume;
            } else if candles[i].close < candles[i - 1].close {
                obv -= candles[i].volume;
            }
        }
        out.push(obv);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    /// 收盘价逐日 +1 的趋势序列，每根振幅固定
    fn trending_candles(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|i| {
                let close = 100.0 + i as f64;
                Candle {
                    time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
                        + Duration::days(i as i64),
                    open: close - 0.5,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 10.0,
                }
            })
            .collect()
    }

    #[test]
    fn too_few_candles_is_an_error() {
        let candles = trending_candles(MIN_CANDLES - 1);
        let err = compute(&candles).unwrap_err();
        assert!(matches!(
            err,
            SignalError::InsufficientData { required, available }
                if required == MIN_CANDLES && available == MIN_CANDLES - 1
        ));
    }

    #[test]
    fn rows_start_after_slowest_warmup() {
        let candles = trending_candles(60);
        let rows = compute(&candles).unwrap();
        // MACD 信号线在第 34 根 (索引 33) 就绪，是最晚的一项
        assert_eq!(rows.len(), 60 - 33);
        assert_eq!(rows[0].time, candles[33].time);
        assert!(rows.windows(2).all(|w| w[0].time < w[1].time));
    }

    #[test]
    fn monotonic_uptrend_has_known_indicator_values() {
        let candles = trending_candles(80);
        let rows = compute(&candles).unwrap();

        for row in &rows {
            // 只涨不跌：平均跌幅为 0
            assert_eq!(row.rsi_14, 100.0);
            // 振幅恒为 2 的序列，Wilder 平滑保持不变
            assert!((row.atr_14 - 2.0).abs() < 1e-9);
            // 单边趋势：-DM 恒为 0，DX 与 ADX 恒为 100
            assert!((row.adx - 100.0).abs() < 1e-9);
            // 线性序列上快慢 EMA 的差收敛为常数 (26-1)/2 - (12-1)/2 = 7
            assert!((row.macd - 7.0).abs() < 1e-6);
            assert!((row.macd_signal - 7.0).abs() < 1e-6);
        }

        // OBV 每根累加固定成交量
        assert_eq!(rows[0].obv, 330.0);
        assert!(rows.windows(2).all(|w| w[1].obv - w[0].obv == 10.0));
    }

    #[test]
    fn monotonic_downtrend_pins_rsi_to_zero() {
        let mut candles = trending_candles(60);
        candles.reverse();
        // 反转后时间也要重排成升序
        let times: Vec<_> = trending_candles(60).iter().map(|c| c.time).collect();
        for (candle, time) in candles.iter_mut().zip(times) {
            candle.time = time;
        }

        let rows = compute(&candles).unwrap();
        for row in &rows {
            assert_eq!(row.rsi_14, 0.0);
        }
        // 持续下跌时 OBV 单调下降
        assert!(rows.windows(2).all(|w| w[1].obv < w[0].obv));
    }

    #[test]
    fn ema_seed_is_simple_average() {
        let values: Vec<f64> = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let ema = ema_series(&values, 3);
        assert_eq!(ema[0], None);
        assert_eq!(ema[1], None);
        assert_eq!(ema[2], Some(2.0));
        assert!(ema[3].is_some());
    }
}
