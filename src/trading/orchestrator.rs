//! Order orchestration: sequences entry, stop-loss, and take-profit
//! placement for a freshly signaled trade.
//!
//! The state machine is IDLE -> ENTRY_SUBMITTED -> ENTRY_FILLED -> PROTECTED,
//! with failure edges back to IDLE: an unfilled entry is cancelled, and a
//! protection failure after the fill triggers an immediate forced close. An
//! unprotected open position is the single worst state this engine can be
//! in and is never left standing on purpose.

use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::error::VenueError;
use crate::models::{ExitReason, OpenPosition, Side};
use crate::trading::close::force_close;
use crate::trading::signal::EntrySignal;
use crate::trading::CRITICAL;
use crate::venue::{OrderOpts, OrderRef, OrderReport, SymbolFilters, Venue};

const FILL_POLL_INITIAL: Duration = Duration::from_millis(500);
const FILL_POLL_MAX: Duration = Duration::from_secs(4);

/// Result of one entry attempt.
#[derive(Debug)]
pub enum EntryOutcome {
    /// Entry filled and both protective orders are live
    Opened(OpenPosition),

    /// Entry did not fill within the bounded wait and was cancelled
    NotFilled,

    /// Protection could not be placed; the position was force-closed
    EmergencyClosed(ExitReason),

    /// Protection failed and the forced close failed too. The caller must
    /// keep this position tracked so the close is retried next cycle.
    Unprotected(OpenPosition),
}

/// Sequences the orders that turn a signal into a protected position.
#[derive(Debug, Clone)]
pub struct OrderOrchestrator {
    symbol: String,
    filters: SymbolFilters,
    fill_timeout: Duration,
    risk_budget: Decimal,
}

impl OrderOrchestrator {
    pub fn new(
        symbol: impl Into<String>,
        filters: SymbolFilters,
        fill_timeout: Duration,
        risk_budget: Decimal,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            filters,
            fill_timeout,
            risk_budget,
        }
    }

    /// Protective price levels for an entry at `entry_price`.
    ///
    /// Stop sits `atr x stop_ratio` away from entry; the target multiplies
    /// that same distance by the session target ratio. Both are rounded to
    /// the price tick.
    pub fn protective_levels(&self, signal: &EntrySignal) -> (Decimal, Decimal) {
        let (stop, target) = match signal.side {
            Side::Long => {
                let stop = self
                    .filters
                    .round_price(signal.entry_price - signal.atr * signal.stop_ratio);
                let target = self
                    .filters
                    .round_price(signal.entry_price + (signal.entry_price - stop) * signal.target_ratio);
                (stop, target)
            }
            Side::Short => {
                let stop = self
                    .filters
                    .round_price(signal.entry_price + signal.atr * signal.stop_ratio);
                let target = self
                    .filters
                    .round_price(signal.entry_price - (stop - signal.entry_price) * signal.target_ratio);
                (stop, target)
            }
        };
        (stop, target)
    }

    /// Attempt to open a position for the signal at the sized quantity.
    ///
    /// A submission error propagates as `Err`; the caller logs it by class
    /// and stays flat for the cycle.
    pub async fn open<V: Venue>(
        &self,
        venue: &V,
        signal: &EntrySignal,
        qty: Decimal,
    ) -> Result<EntryOutcome, VenueError> {
        let (stop_loss, take_profit) = self.protective_levels(signal);

        // IDLE -> ENTRY_SUBMITTED
        let entry_order = venue
            .place_limit_order(
                &self.symbol,
                signal.side.entry_order_side(),
                qty,
                signal.entry_price,
                OrderOpts::default(),
            )
            .await?;
        info!(
            order = %entry_order,
            side = %signal.side,
            qty = %qty,
            price = %signal.entry_price,
            "entry limit order submitted"
        );

        // ENTRY_SUBMITTED -> ENTRY_FILLED | IDLE
        let Some(report) = self.await_fill(venue, &entry_order, qty).await? else {
            return Ok(EntryOutcome::NotFilled);
        };

        // position reflects the venue-reported fill, never the request
        let mut position = OpenPosition {
            side: signal.side,
            entry_price: self.filters.round_price(report.avg_fill_price),
            quantity: self.filters.truncate_qty(report.filled_qty),
            stop_loss,
            take_profit,
            risk_amount: self.risk_budget,
            stop_order: None,
            take_profit_order: None,
            asia_entry: signal.session.is_asia(),
            opened_at: Utc::now(),
        };
        info!(
            side = %position.side,
            entry_price = %position.entry_price,
            qty = %position.quantity,
            "entry order filled"
        );

        // ENTRY_FILLED -> PROTECTED | forced close
        match self.place_protection(venue, &mut position).await {
            Ok(()) => {
                if !position.protective_ordering_holds() {
                    warn!(
                        entry = %position.entry_price,
                        stop = %position.stop_loss,
                        target = %position.take_profit,
                        "fill slipped past a protective level"
                    );
                }
                info!(
                    stop = %position.stop_loss,
                    target = %position.take_profit,
                    "position protected"
                );
                Ok(EntryOutcome::Opened(position))
            }
            Err(e) => {
                error!(
                    target: CRITICAL,
                    error = %e,
                    "protective order placement failed after entry fill, \
                     force-closing"
                );
                match force_close(venue, &self.symbol, &position, ExitReason::ProtectionFailure)
                    .await
                {
                    Ok(_) => Ok(EntryOutcome::EmergencyClosed(ExitReason::ProtectionFailure)),
                    Err(_) => {
                        // critical event already emitted by force_close
                        position.stop_order = None;
                        position.take_profit_order = None;
                        Ok(EntryOutcome::Unprotected(position))
                    }
                }
            }
        }
    }

    /// Bounded poll for the entry fill: exponential delays up to the
    /// configured timeout, then a final status check. Anything short of a
    /// full fill cancels the order so no untracked sliver is left working.
    async fn await_fill<V: Venue>(
        &self,
        venue: &V,
        order: &OrderRef,
        qty: Decimal,
    ) -> Result<Option<OrderReport>, VenueError> {
        let deadline = tokio::time::Instant::now() + self.fill_timeout;
        let mut delay = FILL_POLL_INITIAL;

        loop {
            tokio::time::sleep(delay).await;

            match venue.order_status(order).await {
                Ok(report) if report.is_filled_for(qty) => return Ok(Some(report)),
                Ok(report) => {
                    if report.state == crate::venue::OrderState::Closed {
                        // cancelled or expired at the venue with at most a
                        // partial fill; treated as not-filled
                        if report.has_fill() {
                            warn!(
                                order = %order,
                                filled = %report.filled_qty,
                                "entry closed with partial fill, treating as not-filled"
                            );
                        }
                        break;
                    }
                }
                Err(e) if e.is_transient() => {
                    warn!(order = %order, error = %e, "fill check failed, will retry");
                }
                Err(e) => {
                    // don't leave the entry working on an unexplained error
                    self.cancel_entry(venue, order).await;
                    return Err(e);
                }
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(order = %order, "entry not filled within wait, cancelling");
                break;
            }
            delay = (delay * 2).min(FILL_POLL_MAX);
        }

        self.cancel_entry(venue, order).await;
        Ok(None)
    }

    async fn cancel_entry<V: Venue>(&self, venue: &V, order: &OrderRef) {
        match venue.cancel_order(order).await {
            Ok(_) | Err(VenueError::OrderNotFound(_)) => {}
            Err(e) => warn!(order = %order, error = %e, "entry cancel failed"),
        }
    }

    /// Place the stop-market and reduce-only take-profit orders.
    async fn place_protection<V: Venue>(
        &self,
        venue: &V,
        position: &mut OpenPosition,
    ) -> Result<(), VenueError> {
        let exit_side = position.side.exit_order_side();

        let stop_order = venue
            .place_stop_market_order(
                &self.symbol,
                exit_side,
                position.quantity,
                position.stop_loss,
            )
            .await?;
        info!(order = %stop_order, trigger = %position.stop_loss, "stop order placed");
        position.stop_order = Some(stop_order);

        let tp_order = venue
            .place_limit_order(
                &self.symbol,
                exit_side,
                position.quantity,
                position.take_profit,
                OrderOpts {
                    reduce_only: true,
                    ..OrderOpts::default()
                },
            )
            .await?;
        info!(order = %tp_order, price = %position.take_profit, "take-profit order placed");
        position.take_profit_order = Some(tp_order);

        Ok(())
    }
}
