//! Engine and strategy configuration.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::models::{Session, SessionPolicy};

/// Indicator periods and signal thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// ATR period used by the trend line and stop distances
    pub atr_period: usize,

    /// ATR multiple for the trend-line bands
    pub supertrend_factor: Decimal,

    /// Fast moving-average period
    pub ema_fast_period: usize,

    /// Slow moving-average period; the longest warm-up in the feed
    pub ema_slow_period: usize,

    /// Momentum oscillator period
    pub rsi_period: usize,

    /// Oscillator midpoint separating long from short bias
    pub rsi_midpoint: Decimal,

    /// Window of the volume moving average
    pub volume_sma_period: usize,

    /// Volume must exceed its moving average by this factor to count as a spike
    pub volume_factor: Decimal,

    /// Candle body must be at least this multiple of ATR
    pub min_body_atr: Decimal,

    /// Stop and target ratio for Asia-session entries (1:1 risk-reward shape)
    pub asia_ratio: Decimal,

    /// Fixed take-profit ratio for London/NY entries
    pub fixed_target_ratio: Decimal,

    /// Stop distance and trailing ratio for London/NY entries;
    /// zero disables trailing
    pub trailing_ratio: Decimal,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            atr_period: 10,
            supertrend_factor: dec!(3.0),
            ema_fast_period: 50,
            ema_slow_period: 200,
            rsi_period: 14,
            rsi_midpoint: dec!(50),
            volume_sma_period: 10,
            volume_factor: dec!(2.0),
            min_body_atr: dec!(0.3),
            asia_ratio: dec!(3.0),
            fixed_target_ratio: dec!(10.0),
            trailing_ratio: dec!(8.0),
        }
    }
}

impl StrategyConfig {
    /// Risk-reward policy imposed by the session at entry time.
    pub fn session_policy(&self, session: Session) -> SessionPolicy {
        match session {
            Session::Asia => SessionPolicy {
                stop_ratio: self.asia_ratio,
                target_ratio: self.asia_ratio,
                trailing: false,
            },
            Session::LondonNewYork => SessionPolicy {
                stop_ratio: self.trailing_ratio,
                target_ratio: self.fixed_target_ratio,
                trailing: self.trailing_ratio > Decimal::ZERO,
            },
        }
    }

    /// Candles needed before every indicator has a value on the latest bar.
    pub fn min_history(&self) -> usize {
        self.ema_slow_period + self.atr_period + 2
    }
}

/// Everything the engine needs besides the venue handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Futures symbol, e.g. BTCUSDT
    pub symbol: String,

    /// Candle timeframe, e.g. 3m
    pub timeframe: String,

    /// Fixed monetary risk budget per trade
    pub risk_budget: Decimal,

    /// Taker fee rate, applied twice for a round trip
    pub fee_rate: Decimal,

    /// Seconds between strategy cycles
    pub cycle_interval_secs: u64,

    /// Upper bound on waiting for the entry limit order to fill
    pub entry_fill_timeout_secs: u64,

    pub strategy: StrategyConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            timeframe: "3m".to_string(),
            risk_budget: dec!(0.8),
            fee_rate: dec!(0.0004),
            cycle_interval_secs: 60,
            entry_fill_timeout_secs: 15,
            strategy: StrategyConfig::default(),
        }
    }
}

impl EngineConfig {
    /// How many candles each cycle fetches: full warm-up plus a small buffer.
    pub fn candle_limit(&self) -> usize {
        self.strategy.min_history() + 10
    }
}
