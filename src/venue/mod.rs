//! Abstract trading-venue interface and the order types shared across it.
//!
//! The engine never talks to an exchange directly; everything goes through
//! the [`Venue`] trait so the same lifecycle logic runs against the live
//! futures API, the paper venue, and the scripted mock used in tests.

mod binance;
#[cfg(test)]
pub mod mock;
mod paper;

pub use binance::BinanceFutures;
pub use paper::PaperVenue;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::VenueError;
use crate::models::Candle;

/// Side of an order as the venue sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            OrderSide::Buy => OrderSide::Sell,
            OrderSide::Sell => OrderSide::Buy,
        }
    }
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-in-force for resting orders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeInForce {
    /// Good till cancelled
    #[default]
    Gtc,
}

impl TimeInForce {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeInForce::Gtc => "GTC",
        }
    }
}

/// Options recognized by limit-order placement.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderOpts {
    /// Order may only decrease net exposure
    pub reduce_only: bool,
    pub time_in_force: TimeInForce,
}

/// Opaque handle identifying an order at the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRef {
    pub symbol: String,
    pub id: String,
}

impl OrderRef {
    pub fn new(symbol: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for OrderRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}

/// Whether an order is still working at the venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderState {
    /// Resting or partially filled
    Open,
    /// No longer working: fully filled, cancelled, or expired
    Closed,
}

/// Snapshot of an order's progress.
#[derive(Debug, Clone)]
pub struct OrderReport {
    pub state: OrderState,
    pub filled_qty: Decimal,
    pub avg_fill_price: Decimal,
}

impl OrderReport {
    /// Any quantity has executed.
    pub fn has_fill(&self) -> bool {
        self.filled_qty > Decimal::ZERO
    }

    /// Fully filled for the requested quantity.
    pub fn is_filled_for(&self, qty: Decimal) -> bool {
        self.state == OrderState::Closed && self.filled_qty >= qty
    }
}

/// Price/quantity granularity for a symbol, fetched once at startup.
#[derive(Debug, Clone, Copy)]
pub struct SymbolFilters {
    /// Minimum price increment
    pub price_tick: Decimal,

    /// Decimal places allowed on order quantities
    pub qty_precision: u32,

    /// Smallest tradable quantity; doubles as the reconciliation epsilon
    pub min_qty: Decimal,
}

impl SymbolFilters {
    /// Round a price to the nearest multiple of the tick size.
    pub fn round_price(&self, price: Decimal) -> Decimal {
        if self.price_tick.is_zero() {
            return price;
        }
        (price / self.price_tick).round() * self.price_tick
    }

    /// Truncate a quantity to the allowed precision. Truncation, never
    /// rounding up, so a sized order can only shrink.
    pub fn truncate_qty(&self, qty: Decimal) -> Decimal {
        qty.trunc_with_scale(self.qty_precision)
    }

    /// A venue-reported net quantity this small counts as flat.
    pub fn is_dust(&self, qty: Decimal) -> bool {
        qty.abs() < self.min_qty
    }
}

/// A trading venue: market metadata, market data, and order operations.
///
/// Every call is a single request/response; the engine loop suspends on each
/// one and there is never more than one cycle in flight.
#[async_trait]
pub trait Venue: Send + Sync {
    /// Price/quantity granularity for the symbol. Called once at startup;
    /// failure is fatal to startup.
    async fn symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, VenueError>;

    /// Last traded price.
    async fn ticker_price(&self, symbol: &str) -> Result<Decimal, VenueError>;

    /// Closed candles, oldest first, most recent last.
    async fn candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, VenueError>;

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        price: Decimal,
        opts: OrderOpts,
    ) -> Result<OrderRef, VenueError>;

    /// Stop-triggered market order, used for protective stops.
    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        trigger_price: Decimal,
    ) -> Result<OrderRef, VenueError>;

    /// Immediate market order; `reduce_only` for closes.
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        reduce_only: bool,
    ) -> Result<OrderRef, VenueError>;

    /// Cancel an order. `Ok(false)` means the venue no longer knew the
    /// order, which callers treat as already-cancelled.
    async fn cancel_order(&self, order: &OrderRef) -> Result<bool, VenueError>;

    /// Current state of an order. Returns [`VenueError::OrderNotFound`]
    /// when the venue has no record of it, which feeds desync recovery.
    async fn order_status(&self, order: &OrderRef) -> Result<OrderReport, VenueError>;

    /// Signed net position for the symbol (positive long, negative short).
    async fn net_position(&self, symbol: &str) -> Result<Decimal, VenueError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn filters() -> SymbolFilters {
        SymbolFilters {
            price_tick: dec!(0.1),
            qty_precision: 3,
            min_qty: dec!(0.001),
        }
    }

    #[test]
    fn round_price_nearest_multiple() {
        let f = filters();
        assert_eq!(f.round_price(dec!(69000.01)), dec!(69000.0));
        assert_eq!(f.round_price(dec!(69000.07)), dec!(69000.1));
        // exactly representable: result is a multiple of the tick
        for p in [dec!(100.04), dec!(100.05), dec!(0.149), dec!(12345.678)] {
            let r = f.round_price(p);
            assert_eq!(r % f.price_tick, Decimal::ZERO, "{p} -> {r}");
            assert!((r - p).abs() <= f.price_tick / dec!(2), "{p} -> {r}");
        }
    }

    #[test]
    fn truncate_qty_never_rounds_up() {
        let f = filters();
        assert_eq!(f.truncate_qty(dec!(0.12987)), dec!(0.129));
        assert_eq!(f.truncate_qty(dec!(0.1299999)), dec!(0.129));
        assert_eq!(f.truncate_qty(dec!(1)), dec!(1));
        // idempotent
        let once = f.truncate_qty(dec!(5.4321999));
        assert_eq!(f.truncate_qty(once), once);
        // never exceeds the input
        for q in [dec!(0.0009), dec!(3.14159), dec!(42)] {
            assert!(f.truncate_qty(q) <= q);
        }
    }

    #[test]
    fn truncation_to_zero_flags_no_trade() {
        let f = filters();
        assert_eq!(f.truncate_qty(dec!(0.0004)), Decimal::ZERO);
    }

    #[test]
    fn dust_threshold_uses_min_qty() {
        let f = filters();
        assert!(f.is_dust(dec!(0.0005)));
        assert!(f.is_dust(dec!(-0.0005)));
        assert!(!f.is_dust(dec!(0.001)));
    }

    #[test]
    fn filled_for_requires_closed_and_full_qty() {
        let partial = OrderReport {
            state: OrderState::Open,
            filled_qty: dec!(0.05),
            avg_fill_price: dec!(100),
        };
        assert!(partial.has_fill());
        assert!(!partial.is_filled_for(dec!(0.1)));

        let full = OrderReport {
            state: OrderState::Closed,
            filled_qty: dec!(0.1),
            avg_fill_price: dec!(100),
        };
        assert!(full.is_filled_for(dec!(0.1)));
    }
}
