//! Raw OHLCV candle as delivered by the venue.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One closed candle of the trading timeframe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    /// Candle open time (UTC)
    pub open_time: DateTime<Utc>,

    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,

    /// Base-asset volume traded during the candle
    pub volume: Decimal,
}

impl Candle {
    /// Absolute distance between open and close.
    pub fn body(&self) -> Decimal {
        (self.close - self.open).abs()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    /// Midpoint of the candle's range, used by the trend-line bands.
    pub fn hl2(&self) -> Decimal {
        (self.high + self.low) / Decimal::TWO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn candle(open: Decimal, close: Decimal) -> Candle {
        Candle {
            open_time: Utc::now(),
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: dec!(10),
        }
    }

    #[test]
    fn body_is_absolute() {
        assert_eq!(candle(dec!(100), dec!(103)).body(), dec!(3));
        assert_eq!(candle(dec!(103), dec!(100)).body(), dec!(3));
    }

    #[test]
    fn direction_flags() {
        assert!(candle(dec!(100), dec!(103)).is_bullish());
        assert!(candle(dec!(103), dec!(100)).is_bearish());
        let flat = candle(dec!(100), dec!(100));
        assert!(!flat.is_bullish());
        assert!(!flat.is_bearish());
    }
}
