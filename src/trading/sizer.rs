//! Risk-based position sizing.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::venue::SymbolFilters;

/// Converts the fixed risk budget and a volatility-derived stop distance
/// into an order quantity.
#[derive(Debug, Clone)]
pub struct PositionSizer {
    risk_budget: Decimal,
    fee_rate: Decimal,
    filters: SymbolFilters,
}

impl PositionSizer {
    pub fn new(risk_budget: Decimal, fee_rate: Decimal, filters: SymbolFilters) -> Self {
        Self {
            risk_budget,
            fee_rate,
            filters,
        }
    }

    /// Quantity such that (stop distance + round-trip fees) x quantity stays
    /// within the risk budget. Truncated to the venue's quantity precision;
    /// zero means "do not trade".
    pub fn size(&self, entry_price: Decimal, atr: Decimal, stop_ratio: Decimal) -> Decimal {
        // floor the stop distance at one tick so degenerate volatility
        // cannot blow up the division
        let stop_distance = (atr * stop_ratio).max(self.filters.price_tick);

        let round_trip_fees = entry_price * self.fee_rate * dec!(2);
        let risk_per_unit = stop_distance + round_trip_fees;
        if risk_per_unit <= Decimal::ZERO {
            return Decimal::ZERO;
        }

        self.filters.truncate_qty(self.risk_budget / risk_per_unit)
    }
}
