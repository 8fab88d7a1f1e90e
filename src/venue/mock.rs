//! Scripted venue for lifecycle tests.
//!
//! Responses are queued per call type in the order the code under test will
//! ask for them; placements and cancels are recorded for assertions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::error::VenueError;
use crate::models::Candle;
use crate::venue::{
    OrderOpts, OrderRef, OrderReport, OrderSide, SymbolFilters, Venue,
};

/// What kind of order a placement was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlacedKind {
    Limit,
    StopMarket,
    Market,
}

/// Record of one order placement.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub kind: PlacedKind,
    pub side: OrderSide,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub trigger: Option<Decimal>,
    pub reduce_only: bool,
}

#[derive(Default)]
pub struct MockVenue {
    tickers: Mutex<VecDeque<Decimal>>,
    candles: Mutex<Vec<Candle>>,
    statuses: Mutex<VecDeque<Result<OrderReport, VenueError>>>,
    net_position: Mutex<Decimal>,

    placed: Mutex<Vec<PlacedOrder>>,
    cancelled: Mutex<Vec<OrderRef>>,

    // limit orders succeed this many times, then are rejected
    limit_ok_remaining: AtomicUsize,
    limit_failures_armed: AtomicBool,
    fail_stop: AtomicBool,
    fail_market: AtomicBool,

    next_id: AtomicU64,
}

impl MockVenue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_ticker(&self, price: Decimal) {
        self.tickers.lock().unwrap().push_back(price);
    }

    pub fn set_candles(&self, candles: Vec<Candle>) {
        *self.candles.lock().unwrap() = candles;
    }

    pub fn push_status(&self, status: Result<OrderReport, VenueError>) {
        self.statuses.lock().unwrap().push_back(status);
    }

    pub fn set_net_position(&self, qty: Decimal) {
        *self.net_position.lock().unwrap() = qty;
    }

    /// Reject limit orders after the first `ok` placements succeed.
    pub fn fail_limit_orders_after(&self, ok: usize) {
        self.limit_ok_remaining.store(ok, Ordering::SeqCst);
        self.limit_failures_armed.store(true, Ordering::SeqCst);
    }

    pub fn fail_stop_orders(&self) {
        self.fail_stop.store(true, Ordering::SeqCst);
    }

    pub fn fail_market_orders(&self) {
        self.fail_market.store(true, Ordering::SeqCst);
    }

    pub fn placed(&self) -> Vec<PlacedOrder> {
        self.placed.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<OrderRef> {
        self.cancelled.lock().unwrap().clone()
    }

    fn record(&self, symbol: &str, order: PlacedOrder) -> OrderRef {
        self.placed.lock().unwrap().push(order);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        OrderRef::new(symbol, format!("mock-{id}"))
    }
}

#[async_trait]
impl Venue for MockVenue {
    async fn symbol_filters(&self, _symbol: &str) -> Result<SymbolFilters, VenueError> {
        Ok(SymbolFilters {
            price_tick: dec!(0.1),
            qty_precision: 3,
            min_qty: dec!(0.001),
        })
    }

    async fn ticker_price(&self, _symbol: &str) -> Result<Decimal, VenueError> {
        self.tickers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| VenueError::Response("no scripted ticker".into()))
    }

    async fn candles(
        &self,
        _symbol: &str,
        _timeframe: &str,
        _limit: usize,
    ) -> Result<Vec<Candle>, VenueError> {
        Ok(self.candles.lock().unwrap().clone())
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        price: Decimal,
        opts: OrderOpts,
    ) -> Result<OrderRef, VenueError> {
        if self.limit_failures_armed.load(Ordering::SeqCst) {
            let remaining = self.limit_ok_remaining.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(VenueError::Rejected("scripted limit rejection".into()));
            }
            self.limit_ok_remaining.store(remaining - 1, Ordering::SeqCst);
        }
        Ok(self.record(
            symbol,
            PlacedOrder {
                kind: PlacedKind::Limit,
                side,
                qty,
                price: Some(price),
                trigger: None,
                reduce_only: opts.reduce_only,
            },
        ))
    }

    async fn place_stop_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        trigger_price: Decimal,
    ) -> Result<OrderRef, VenueError> {
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(VenueError::Rejected("scripted stop rejection".into()));
        }
        Ok(self.record(
            symbol,
            PlacedOrder {
                kind: PlacedKind::StopMarket,
                side,
                qty,
                price: None,
                trigger: Some(trigger_price),
                reduce_only: true,
            },
        ))
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        qty: Decimal,
        reduce_only: bool,
    ) -> Result<OrderRef, VenueError> {
        if self.fail_market.load(Ordering::SeqCst) {
            return Err(VenueError::Rejected("scripted market rejection".into()));
        }
        Ok(self.record(
            symbol,
            PlacedOrder {
                kind: PlacedKind::Market,
                side,
                qty,
                price: None,
                trigger: None,
                reduce_only,
            },
        ))
    }

    async fn cancel_order(&self, order: &OrderRef) -> Result<bool, VenueError> {
        self.cancelled.lock().unwrap().push(order.clone());
        Ok(true)
    }

    async fn order_status(&self, _order: &OrderRef) -> Result<OrderReport, VenueError> {
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(VenueError::Response("no scripted status".into())))
    }

    async fn net_position(&self, _symbol: &str) -> Result<Decimal, VenueError> {
        Ok(*self.net_position.lock().unwrap())
    }
}
