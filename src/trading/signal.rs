//! Entry signal evaluation over the two most recent annotated candles.

use rust_decimal::Decimal;
use tracing::debug;

use crate::config::StrategyConfig;
use crate::feed::AnnotatedCandle;
use crate::models::{Session, Side};
use crate::venue::SymbolFilters;

/// Everything the orchestrator needs to act on an eligible entry.
#[derive(Debug, Clone)]
pub struct EntrySignal {
    pub side: Side,

    /// Candidate entry price: candle close rounded to the price tick
    pub entry_price: Decimal,

    /// ATR on the signal candle
    pub atr: Decimal,

    /// Session of the signal candle, captured for the life of the trade
    pub session: Session,

    /// Session stop-distance ratio
    pub stop_ratio: Decimal,

    /// Session take-profit ratio
    pub target_ratio: Decimal,
}

/// Pure evaluation of entry eligibility; no side effects.
#[derive(Debug, Clone)]
pub struct SignalEvaluator {
    rsi_midpoint: Decimal,
    filters: SymbolFilters,
}

impl SignalEvaluator {
    pub fn new(cfg: &StrategyConfig, filters: SymbolFilters) -> Self {
        Self {
            rsi_midpoint: cfg.rsi_midpoint,
            filters,
        }
    }

    /// Evaluate the latest candle against its predecessor.
    ///
    /// Returns `None` both when no condition fires and when any required
    /// indicator is still warming up; the latter is a normal outcome, not
    /// an error.
    pub fn evaluate(
        &self,
        prev: &AnnotatedCandle,
        last: &AnnotatedCandle,
    ) -> Option<EntrySignal> {
        let atr = last.atr?;
        let direction = last.trend_direction?;
        let prev_direction = prev.trend_direction?;
        let ema_fast = last.ema_fast?;
        let ema_slow = last.ema_slow?;
        let rsi = last.rsi?;
        last.volume_sma?;

        let long = direction == 1
            && prev_direction == -1
            && last.bullish_engulfing
            && ema_fast > ema_slow
            && rsi > self.rsi_midpoint
            && last.valid_body
            && last.volume_spike;

        let short = direction == -1
            && prev_direction == 1
            && last.bearish_engulfing
            && ema_fast < ema_slow
            && rsi < self.rsi_midpoint
            && last.valid_body
            && last.volume_spike;

        let side = match (long, short) {
            (true, _) => Side::Long,
            (_, true) => Side::Short,
            _ => return None,
        };

        debug!(
            side = %side,
            close = %last.candle.close,
            atr = %atr,
            session = ?last.session,
            "entry conditions met"
        );

        Some(EntrySignal {
            side,
            entry_price: self.filters.round_price(last.candle.close),
            atr,
            session: last.session,
            stop_ratio: last.stop_ratio,
            target_ratio: last.target_ratio,
        })
    }
}
