//! Paper venue: real market data, simulated order book.
//!
//! Wraps a live venue for metadata and market data while keeping all order
//! flow in memory, so a dry run exercises the full lifecycle without
//! touching the account. Entry limit orders fill immediately at their limit
//! price; protective orders fill when the last traded price crosses them.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::VenueError;
use crate::models::Candle;
use crate::venue::{
    OrderOpts, OrderRef, OrderReport, OrderSide, OrderState, SymbolFilters, Venue,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PaperKind {
    Limit,
    StopMarket,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    kind: PaperKind,
    side: OrderSide,
    qty: Decimal,
    price: Option<Decimal>,
    trigger: Option<Decimal>,
    state: OrderState,
    filled_qty: Decimal,
    fill_price: Decimal,
}

impl PaperOrder {
    fn report(&self) -> OrderReport {
        OrderReport {
            state: self.state,
            filled_qty: self.filled_qty,
            avg_fill_price: self.fill_price,
        }
    }

    /// Whether the last traded price would execute this resting order.
    fn crossed_by(&self, price: Decimal) -> bool {
        match (self.kind, self.side) {
            // reduce-only take profit
            (PaperKind::Limit, OrderSide::Sell) => {
                self.price.map_or(false, |limit| price >= limit)
            }
            (PaperKind::Limit, OrderSide::Buy) => {
                self.price.map_or(false, |limit| price <= limit)
            }
            // protective stop
            (PaperKind::StopMarket, OrderSide::Sell) => {
                self.trigger.map_or(false, |t| price <= t)
            }
            (PaperKind::StopMarket, OrderSide::Buy) => {
                self.trigger.map_or(false, |t| price >= t)
            }
        }
    }

    fn execution_price(&self) -> Decimal {
        self.price.or(self.trigger).unwrap_or_default()
    }
}

#[derive(Default)]
struct PaperBook {
    orders: HashMap<String, PaperOrder>,
    position: Decimal,
    next_id: u64,
}

impl PaperBook {
    fn apply_fill(&mut self, side: OrderSide, qty: Decimal) {
        match side {
            OrderSide::Buy => self.position += qty,
            OrderSide::Sell => self.position -= qty,
        }
    }
}

/// Simulated venue over a real market-data source.
pub struct PaperVenue<V> {
    inner: V,
    book: Mutex<PaperBook>,
}

impl<V> PaperVenue<V> {
    pub fn new(inner: V) -> Self {
        Self {
            inner,
            book: Mutex::new(PaperBook::default()),
        }
    }

    fn next_ref(book: &mut PaperBook, symbol: &str) -> OrderRef {
        book.next_id += 1;
        OrderRef::new(symbol, format!("paper-{}", book.next_id))
    }
}

#[async_trait]
impl<V: Venue> Venue for PaperVenue<V> {
    async fn symbol_filters(&self, symbol: &str) -> Result<SymbolFilters, VenueError> {
        self.inner.symbol_filters(symbol).await
    }

    async fn ticker_price(&self, symbol: &str) -> Result<Decimal, VenueError> {
        self.inner.ticker_price(symbol).await
    }

    async fn candles(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, VenueError> {
        self.inner.candles(symbol, timeframe, limit).await
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        price: Decimal,
        opts: OrderOpts,
    ) -> Result<OrderRef, VenueError> {
        let mut book = self.book.lock().unwrap();
        let order_ref = Self::next_ref(&mut book, symbol);

        let mut order = PaperOrder {
            kind: PaperKind::Limit,
            side,
            qty,
            price: Some(price),
            trigger: None,
            state: OrderState::Open,
            filled_qty: Decimal::ZERO,
            fill_price: Decimal::ZERO,
        };

        if !opts.reduce_only {
            // entries fill immediately at the limit price in simulation
            order.state = OrderState::Closed;
            order.filled_qty = qty;
            order.fill_price = price;
            book.apply_fill(side, qty);
            info!(order = %order_ref, side = %side, qty = %qty, price = %price, "[paper] entry filled");
        } else {
            info!(order = %order_ref, side = %side, price = %price, "[paper] take-profit resting");
        }

        book.orders.insert(order_ref.id.clone(), order);
        Ok(order_ref)
    }

    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        trigger_price: Decimal,
    ) -> Result<OrderRef, VenueError> {
        let mut book = self.book.lock().unwrap();
        let order_ref = Self::next_ref(&mut book, symbol);
        book.orders.insert(
            order_ref.id.clone(),
            PaperOrder {
                kind: PaperKind::StopMarket,
                side,
                qty,
                price: None,
                trigger: Some(trigger_price),
                state: OrderState::Open,
                filled_qty: Decimal::ZERO,
                fill_price: Decimal::ZERO,
            },
        );
        info!(order = %order_ref, side = %side, trigger = %trigger_price, "[paper] stop resting");
        Ok(order_ref)
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        _reduce_only: bool,
    ) -> Result<OrderRef, VenueError> {
        let price = self.inner.ticker_price(symbol).await?;
        let mut book = self.book.lock().unwrap();
        let order_ref = Self::next_ref(&mut book, symbol);
        book.apply_fill(side, qty);
        book.orders.insert(
            order_ref.id.clone(),
            PaperOrder {
                kind: PaperKind::Limit,
                side,
                qty,
                price: Some(price),
                trigger: None,
                state: OrderState::Closed,
                filled_qty: qty,
                fill_price: price,
            },
        );
        info!(order = %order_ref, side = %side, qty = %qty, price = %price, "[paper] market order filled");
        Ok(order_ref)
    }

    async fn cancel_order(&self, order: &OrderRef) -> Result<bool, VenueError> {
        let mut book = self.book.lock().unwrap();
        match book.orders.get_mut(&order.id) {
            Some(o) if o.state == OrderState::Open => {
                o.state = OrderState::Closed;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn order_status(&self, order: &OrderRef) -> Result<OrderReport, VenueError> {
        let price = self.inner.ticker_price(&order.symbol).await?;

        let mut book = self.book.lock().unwrap();
        let Some(o) = book.orders.get(&order.id).cloned() else {
            return Err(VenueError::OrderNotFound(order.id.clone()));
        };

        if o.state == OrderState::Open && o.crossed_by(price) {
            let fill_price = o.execution_price();
            if let Some(stored) = book.orders.get_mut(&order.id) {
                stored.state = OrderState::Closed;
                stored.filled_qty = stored.qty;
                stored.fill_price = fill_price;
            }
            let side = o.side;
            let qty = o.qty;
            book.apply_fill(side, qty);
            info!(order = %order, price = %fill_price, "[paper] resting order filled");
        }

        Ok(book
            .orders
            .get(&order.id)
            .map(|o| o.report())
            .unwrap_or_else(|| o.report()))
    }

    async fn net_position(&self, _symbol: &str) -> Result<Decimal, VenueError> {
        Ok(self.book.lock().unwrap().position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::venue::mock::MockVenue;
    use rust_decimal_macros::dec;

    fn paper_with_price(price: Decimal) -> PaperVenue<MockVenue> {
        let inner = MockVenue::new();
        // one ticker per status/market call in these tests
        for _ in 0..4 {
            inner.push_ticker(price);
        }
        PaperVenue::new(inner)
    }

    #[test]
    fn entry_fills_immediately_and_moves_position() {
        let paper = paper_with_price(dec!(100));
        tokio_test::block_on(async {
            let entry = paper
                .place_limit_order("BTCUSDT", OrderSide::Buy, dec!(0.5), dec!(100), OrderOpts::default())
                .await
                .unwrap();
            let report = paper.order_status(&entry).await.unwrap();
            assert!(report.is_filled_for(dec!(0.5)));
            assert_eq!(paper.net_position("BTCUSDT").await.unwrap(), dec!(0.5));
        });
    }

    #[test]
    fn stop_triggers_when_price_crosses() {
        let paper = paper_with_price(dec!(93));
        tokio_test::block_on(async {
            paper
                .place_limit_order("BTCUSDT", OrderSide::Buy, dec!(0.5), dec!(100), OrderOpts::default())
                .await
                .unwrap();
            let stop = paper
                .place_stop_market_order("BTCUSDT", OrderSide::Sell, dec!(0.5), dec!(94))
                .await
                .unwrap();

            // price 93 <= trigger 94: the stop executes
            let report = paper.order_status(&stop).await.unwrap();
            assert_eq!(report.state, OrderState::Closed);
            assert_eq!(report.avg_fill_price, dec!(94));
            assert_eq!(paper.net_position("BTCUSDT").await.unwrap(), Decimal::ZERO);
        });
    }

    #[test]
    fn take_profit_rests_until_crossed() {
        let paper = paper_with_price(dec!(110));
        tokio_test::block_on(async {
            paper
                .place_limit_order("BTCUSDT", OrderSide::Buy, dec!(0.5), dec!(100), OrderOpts::default())
                .await
                .unwrap();
            let tp = paper
                .place_limit_order(
                    "BTCUSDT",
                    OrderSide::Sell,
                    dec!(0.5),
                    dec!(118),
                    OrderOpts { reduce_only: true, ..OrderOpts::default() },
                )
                .await
                .unwrap();

            // 110 < 118: still resting
            let report = paper.order_status(&tp).await.unwrap();
            assert_eq!(report.state, OrderState::Open);
            assert!(!report.has_fill());
        });
    }

    #[test]
    fn cancel_is_idempotent() {
        let paper = paper_with_price(dec!(100));
        tokio_test::block_on(async {
            let stop = paper
                .place_stop_market_order("BTCUSDT", OrderSide::Sell, dec!(0.5), dec!(94))
                .await
                .unwrap();
            assert!(paper.cancel_order(&stop).await.unwrap());
            // already gone: reported as such, not an error
            assert!(!paper.cancel_order(&stop).await.unwrap());
        });
    }

    #[test]
    fn unknown_order_is_not_found() {
        let paper = paper_with_price(dec!(100));
        tokio_test::block_on(async {
            let ghost = OrderRef::new("BTCUSDT", "paper-404");
            let err = paper.order_status(&ghost).await.unwrap_err();
            assert!(matches!(err, VenueError::OrderNotFound(_)));
        });
    }
}
