//! Indicator feed: turns raw candle history into annotated candles.
//!
//! One stable computation path per indicator; values that have not finished
//! warming up are `None`, which downstream code treats as a normal
//! "insufficient data" outcome rather than an error. All arithmetic is in
//! `Decimal` so annotated values round-trip exactly into order prices.

use rust_decimal::Decimal;

use crate::config::StrategyConfig;
use crate::models::{Candle, Session};

/// A candle annotated with every input the signal evaluator needs.
#[derive(Debug, Clone)]
pub struct AnnotatedCandle {
    pub candle: Candle,

    /// Average true range (Wilder smoothing)
    pub atr: Option<Decimal>,

    /// Supertrend line value
    pub trend_line: Option<Decimal>,

    /// +1 uptrend, -1 downtrend
    pub trend_direction: Option<i8>,

    pub ema_fast: Option<Decimal>,
    pub ema_slow: Option<Decimal>,

    /// Momentum oscillator, 0-100
    pub rsi: Option<Decimal>,

    pub volume_sma: Option<Decimal>,

    /// Volume exceeds its moving average by the configured factor
    pub volume_spike: bool,

    pub bullish_engulfing: bool,
    pub bearish_engulfing: bool,

    /// Candle body is at least the configured multiple of ATR;
    /// false while ATR is warming up
    pub valid_body: bool,

    /// Session of the candle's open time
    pub session: Session,

    /// Session stop-distance ratio (ATR multiple)
    pub stop_ratio: Decimal,

    /// Session take-profit ratio (multiple of the stop distance)
    pub target_ratio: Decimal,
}

/// Computes annotations over a candle window each cycle.
#[derive(Debug, Clone)]
pub struct IndicatorFeed {
    cfg: StrategyConfig,
}

impl IndicatorFeed {
    pub fn new(cfg: StrategyConfig) -> Self {
        Self { cfg }
    }

    /// Candles required before the latest bar has every field populated.
    pub fn min_history(&self) -> usize {
        self.cfg.min_history()
    }

    /// Annotate a candle window, oldest first.
    pub fn annotate(&self, candles: &[Candle]) -> Vec<AnnotatedCandle> {
        let closes: Vec<Decimal> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<Decimal> = candles.iter().map(|c| c.volume).collect();

        let atr = wilder_atr(candles, self.cfg.atr_period);
        let (trend_line, trend_direction) =
            supertrend(candles, &atr, self.cfg.supertrend_factor);
        let ema_fast = ema(&closes, self.cfg.ema_fast_period);
        let ema_slow = ema(&closes, self.cfg.ema_slow_period);
        let rsi = wilder_rsi(&closes, self.cfg.rsi_period);
        let volume_sma = sma(&volumes, self.cfg.volume_sma_period);

        candles
            .iter()
            .enumerate()
            .map(|(i, candle)| {
                let session = Session::of(candle.open_time);
                let policy = self.cfg.session_policy(session);

                let volume_spike = volume_sma[i]
                    .map(|avg| candle.volume > avg * self.cfg.volume_factor)
                    .unwrap_or(false);

                let valid_body = atr[i]
                    .map(|a| candle.body() >= a * self.cfg.min_body_atr)
                    .unwrap_or(false);

                let (bullish_engulfing, bearish_engulfing) = if i > 0 {
                    engulfing(&candles[i - 1], candle)
                } else {
                    (false, false)
                };

                AnnotatedCandle {
                    candle: candle.clone(),
                    atr: atr[i],
                    trend_line: trend_line[i],
                    trend_direction: trend_direction[i],
                    ema_fast: ema_fast[i],
                    ema_slow: ema_slow[i],
                    rsi: rsi[i],
                    volume_sma: volume_sma[i],
                    volume_spike,
                    bullish_engulfing,
                    bearish_engulfing,
                    valid_body,
                    session,
                    stop_ratio: policy.stop_ratio,
                    target_ratio: policy.target_ratio,
                }
            })
            .collect()
    }
}

/// True range per candle; undefined for the first.
fn true_ranges(candles: &[Candle]) -> Vec<Option<Decimal>> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                return None;
            }
            let prev_close = candles[i - 1].close;
            let hl = c.high - c.low;
            let hc = (c.high - prev_close).abs();
            let lc = (c.low - prev_close).abs();
            Some(hl.max(hc).max(lc))
        })
        .collect()
}

/// Wilder-smoothed ATR; first value is the simple mean of the first
/// `period` true ranges.
fn wilder_atr(candles: &[Candle], period: usize) -> Vec<Option<Decimal>> {
    let tr = true_ranges(candles);
    let mut out = vec![None; candles.len()];
    if period == 0 || candles.len() <= period {
        return out;
    }

    let p = Decimal::from(period as u64);
    let seed: Decimal = tr[1..=period].iter().flatten().sum();
    let mut atr = seed / p;
    out[period] = Some(atr);

    for i in period + 1..candles.len() {
        if let Some(range) = tr[i] {
            atr = (atr * (p - Decimal::ONE) + range) / p;
            out[i] = Some(atr);
        }
    }
    out
}

/// Supertrend line and direction over precomputed ATR values.
fn supertrend(
    candles: &[Candle],
    atr: &[Option<Decimal>],
    factor: Decimal,
) -> (Vec<Option<Decimal>>, Vec<Option<i8>>) {
    let mut line = vec![None; candles.len()];
    let mut direction = vec![None; candles.len()];

    let mut prev_upper: Option<Decimal> = None;
    let mut prev_lower: Option<Decimal> = None;
    let mut prev_dir: Option<i8> = None;

    for (i, c) in candles.iter().enumerate() {
        let Some(a) = atr[i] else { continue };
        // ATR starts after index 0, so a previous close always exists here
        let prev_close = candles[i - 1].close;

        let upper = c.hl2() + factor * a;
        let lower = c.hl2() - factor * a;

        let final_upper = match prev_upper {
            Some(pu) if upper >= pu && prev_close <= pu => pu,
            _ => upper,
        };
        let final_lower = match prev_lower {
            Some(pl) if lower <= pl && prev_close >= pl => pl,
            _ => lower,
        };

        let dir = match prev_dir {
            Some(-1) => {
                if c.close > final_upper {
                    1
                } else {
                    -1
                }
            }
            _ => {
                if c.close < final_lower {
                    -1
                } else {
                    1
                }
            }
        };

        line[i] = Some(if dir == 1 { final_lower } else { final_upper });
        direction[i] = Some(dir);
        prev_upper = Some(final_upper);
        prev_lower = Some(final_lower);
        prev_dir = Some(dir);
    }

    (line, direction)
}

/// Exponential moving average seeded with the simple mean of the first
/// `period` values.
fn ema(values: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }

    let p = Decimal::from(period as u64);
    let alpha = Decimal::TWO / (p + Decimal::ONE);

    let seed: Decimal = values[..period].iter().sum();
    let mut current = seed / p;
    out[period - 1] = Some(current);

    for i in period..values.len() {
        current += alpha * (values[i] - current);
        out[i] = Some(current);
    }
    out
}

/// Wilder RSI on a close series.
fn wilder_rsi(closes: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return out;
    }

    let p = Decimal::from(period as u64);
    let mut avg_gain = Decimal::ZERO;
    let mut avg_loss = Decimal::ZERO;

    for i in 1..closes.len() {
        let delta = closes[i] - closes[i - 1];
        let gain = delta.max(Decimal::ZERO);
        let loss = (-delta).max(Decimal::ZERO);

        if i <= period {
            avg_gain += gain / p;
            avg_loss += loss / p;
            if i < period {
                continue;
            }
        } else {
            avg_gain = (avg_gain * (p - Decimal::ONE) + gain) / p;
            avg_loss = (avg_loss * (p - Decimal::ONE) + loss) / p;
        }

        out[i] = Some(if avg_loss.is_zero() {
            Decimal::ONE_HUNDRED
        } else {
            let rs = avg_gain / avg_loss;
            Decimal::ONE_HUNDRED - Decimal::ONE_HUNDRED / (Decimal::ONE + rs)
        });
    }
    out
}

/// Simple moving average over a trailing window including the current value.
fn sma(values: &[Decimal], period: usize) -> Vec<Option<Decimal>> {
    let mut out = vec![None; values.len()];
    if period == 0 {
        return out;
    }
    let p = Decimal::from(period as u64);
    for i in period - 1..values.len() {
        let sum: Decimal = values[i + 1 - period..=i].iter().sum();
        out[i] = Some(sum / p);
    }
    out
}

/// Two-candle engulfing reversal patterns: (bullish, bearish).
fn engulfing(prev: &Candle, cur: &Candle) -> (bool, bool) {
    let bullish = prev.is_bearish()
        && cur.is_bullish()
        && cur.close > prev.open
        && cur.open < prev.close;
    let bearish = prev.is_bullish()
        && cur.is_bearish()
        && cur.close < prev.open
        && cur.open > prev.close;
    (bullish, bearish)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn candle_at(i: i64, high: Decimal, low: Decimal, close: Decimal) -> Candle {
        Candle {
            open_time: Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
                + Duration::minutes(3 * i),
            open: close, // open rarely matters in these fixtures
            high,
            low,
            close,
            volume: dec!(10),
        }
    }

    #[test]
    fn ema_seeds_with_simple_mean() {
        let closes = vec![dec!(1), dec!(2), dec!(3), dec!(4), dec!(5)];
        let out = ema(&closes, 3);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(dec!(2)));
        assert_eq!(out[3], Some(dec!(3)));
        assert_eq!(out[4], Some(dec!(4)));
    }

    #[test]
    fn sma_trailing_window() {
        let vols = vec![dec!(1), dec!(2), dec!(3), dec!(4)];
        let out = sma(&vols, 2);
        assert_eq!(out, vec![None, Some(dec!(1.5)), Some(dec!(2.5)), Some(dec!(3.5))]);
    }

    #[test]
    fn rsi_extremes_and_midrange() {
        let up = vec![dec!(1), dec!(2), dec!(3)];
        assert_eq!(wilder_rsi(&up, 2)[2], Some(Decimal::ONE_HUNDRED));

        let down = vec![dec!(3), dec!(2), dec!(1)];
        assert_eq!(wilder_rsi(&down, 2)[2], Some(Decimal::ZERO));

        let mixed = vec![dec!(10), dec!(11), dec!(10.5), dec!(11.5)];
        let out = wilder_rsi(&mixed, 2);
        // avg gain 0.5 / avg loss 0.25 -> rs 2 -> rsi 66.67
        assert_eq!(out[2].unwrap().round_dp(2), dec!(66.67));
        // Wilder smoothing: gain 0.75 / loss 0.125 -> rs 6 -> rsi 85.71
        assert_eq!(out[3].unwrap().round_dp(2), dec!(85.71));
    }

    #[test]
    fn atr_wilder_smoothing() {
        let candles = vec![
            candle_at(0, dec!(10), dec!(8), dec!(9)),
            candle_at(1, dec!(11), dec!(9), dec!(10)),
            candle_at(2, dec!(12), dec!(10), dec!(11)),
            candle_at(3, dec!(13), dec!(9), dec!(12)),
        ];
        let out = wilder_atr(&candles, 2);
        assert_eq!(out[0], None);
        assert_eq!(out[1], None);
        assert_eq!(out[2], Some(dec!(2)));
        // (2 * 1 + 4) / 2
        assert_eq!(out[3], Some(dec!(3)));
    }

    #[test]
    fn supertrend_flips_on_break() {
        let candles = vec![
            candle_at(0, dec!(20), dec!(18), dec!(19)),
            candle_at(1, dec!(19), dec!(17), dec!(18)),
            candle_at(2, dec!(18), dec!(16), dec!(17)),
            candle_at(3, dec!(17), dec!(15), dec!(16)),
            // sharp drop: close breaks the lower band
            candle_at(4, dec!(13), dec!(9), dec!(10)),
            // sharp rally: close breaks the upper band
            candle_at(5, dec!(18), dec!(16), dec!(17.5)),
        ];
        let atr = wilder_atr(&candles, 2);
        let (_, dir) = supertrend(&candles, &atr, Decimal::ONE);

        assert_eq!(dir[1], None);
        assert_eq!(dir[2], Some(1));
        assert_eq!(dir[3], Some(1));
        assert_eq!(dir[4], Some(-1));
        assert_eq!(dir[5], Some(1));
    }

    #[test]
    fn engulfing_patterns() {
        let mut prev = candle_at(0, dec!(106), dec!(99), dec!(100));
        prev.open = dec!(105); // bearish
        let mut cur = candle_at(1, dec!(107), dec!(98), dec!(106));
        cur.open = dec!(99); // bullish, engulfs previous body

        let (bull, bear) = engulfing(&prev, &cur);
        assert!(bull);
        assert!(!bear);

        // mirrored
        let (bull, bear) = engulfing(&cur, &prev);
        assert!(!bull);
        assert!(!bear); // prev does not engulf cur's larger body
    }

    #[test]
    fn warmup_yields_none_not_error() {
        let cfg = StrategyConfig::default();
        let feed = IndicatorFeed::new(cfg);
        let candles: Vec<Candle> = (0..50)
            .map(|i| candle_at(i, dec!(101), dec!(99), dec!(100)))
            .collect();
        let annotated = feed.annotate(&candles);
        let last = annotated.last().unwrap();
        assert!(last.ema_slow.is_none());
        assert!(last.rsi.is_some()); // 14-period oscillator is warm by 50
        assert!(!last.valid_body);
    }

    #[test]
    fn annotation_carries_session_policy() {
        let cfg = StrategyConfig::default();
        let feed = IndicatorFeed::new(cfg);
        let mut asia = candle_at(0, dec!(101), dec!(99), dec!(100));
        asia.open_time = Utc.with_ymd_and_hms(2024, 3, 5, 3, 0, 0).unwrap();
        let annotated = feed.annotate(&[asia]);
        assert!(annotated[0].session.is_asia());
        assert_eq!(annotated[0].stop_ratio, dec!(3.0));
        assert_eq!(annotated[0].target_ratio, dec!(3.0));
    }
}
