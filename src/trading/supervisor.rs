//! Position supervision: fill detection, desync recovery, and trailing
//! stop adjustment. Runs once per cycle while a position is open.

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::error::VenueError;
use crate::models::{ExitReason, OpenPosition, Side, TradeState};
use crate::trading::close::force_close;
use crate::trading::CRITICAL;
use crate::venue::{OrderRef, SymbolFilters, Venue};

/// Supervises the open position against the venue's view of it.
#[derive(Debug, Clone)]
pub struct PositionSupervisor {
    symbol: String,
    filters: SymbolFilters,
    trailing_ratio: Decimal,
}

impl PositionSupervisor {
    pub fn new(symbol: impl Into<String>, filters: SymbolFilters, trailing_ratio: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            filters,
            trailing_ratio,
        }
    }

    /// One supervision pass. Takes the position by value and returns the
    /// trade state to carry into the next cycle.
    pub async fn supervise<V: Venue>(
        &self,
        venue: &V,
        position: OpenPosition,
        current_price: Decimal,
        current_atr: Decimal,
    ) -> Result<TradeState, VenueError> {
        // a position that lost its protection on an earlier failure gets
        // closed before anything else
        let (Some(stop_ref), Some(tp_ref)) = (
            position.stop_order.clone(),
            position.take_profit_order.clone(),
        ) else {
            return self.retry_unprotected_close(venue, position).await;
        };

        // 1. fill detection; finding one fill ends supervision for the cycle
        let checks = [
            (stop_ref.clone(), tp_ref.clone(), ExitReason::StopLoss),
            (tp_ref, stop_ref, ExitReason::TakeProfit),
        ];
        for (order, sibling, reason) in checks {
            match venue.order_status(&order).await {
                Ok(report) if report.state == crate::venue::OrderState::Closed
                    && report.has_fill() =>
                {
                    let exit_price = if report.avg_fill_price > Decimal::ZERO {
                        report.avg_fill_price
                    } else {
                        current_price
                    };
                    info!(
                        order = %order,
                        reason = %reason,
                        exit_price = %exit_price,
                        est_pnl = %position.estimated_pnl(exit_price),
                        "protective order filled, position closed"
                    );
                    // the venue may or may not cancel the sibling itself
                    self.cancel_quietly(venue, &sibling).await;
                    return Ok(TradeState::Flat);
                }
                Ok(report) if report.state == crate::venue::OrderState::Closed => {
                    // cancelled or expired at the venue without a fill;
                    // surfaced here, reconciliation picks it up once the
                    // venue forgets the order entirely
                    warn!(
                        order = %order,
                        "protective order stopped working without a fill"
                    );
                }
                Ok(_) => {}
                Err(VenueError::OrderNotFound(_)) => {
                    return self.reconcile(venue, position).await;
                }
                Err(e) => return Err(e),
            }
        }

        // 2. trailing stop, only for positions opened outside the
        // low-volatility session
        if !position.asia_entry && self.trailing_ratio > Decimal::ZERO {
            return self
                .trail_stop(venue, position, current_price, current_atr)
                .await;
        }

        Ok(TradeState::Open(position))
    }

    /// The venue lost track of one of our orders: its net position is the
    /// authority now.
    async fn reconcile<V: Venue>(
        &self,
        venue: &V,
        position: OpenPosition,
    ) -> Result<TradeState, VenueError> {
        warn!("protective order unknown at venue, reconciling against net position");

        let net = venue.net_position(&self.symbol).await?;
        if self.filters.is_dust(net) {
            info!(
                net = %net,
                reason = %ExitReason::Reconciled,
                "venue reports zero exposure, resetting to flat"
            );
            // whichever protective order still exists must not outlive the trade
            if let Some(order) = &position.stop_order {
                self.cancel_quietly(venue, order).await;
            }
            if let Some(order) = &position.take_profit_order {
                self.cancel_quietly(venue, order).await;
            }
            return Ok(TradeState::Flat);
        }

        // deliberate escape hatch: a live untracked position is an operator
        // decision, not something to resolve unilaterally
        error!(
            target: CRITICAL,
            net = %net,
            tracked_qty = %position.quantity,
            side = %position.side,
            "DESYNC: venue still holds a position but orders are untracked, \
             operator attention required"
        );
        Ok(TradeState::Open(position))
    }

    /// Tighten the stop toward the market, never loosen it.
    async fn trail_stop<V: Venue>(
        &self,
        venue: &V,
        mut position: OpenPosition,
        current_price: Decimal,
        current_atr: Decimal,
    ) -> Result<TradeState, VenueError> {
        let candidate = match position.side {
            Side::Long => self
                .filters
                .round_price(current_price - current_atr * self.trailing_ratio),
            Side::Short => self
                .filters
                .round_price(current_price + current_atr * self.trailing_ratio),
        };

        let tighter = match position.side {
            Side::Long => candidate > position.stop_loss,
            Side::Short => candidate < position.stop_loss,
        };
        if !tighter {
            return Ok(TradeState::Open(position));
        }

        info!(
            old_stop = %position.stop_loss,
            new_stop = %candidate,
            side = %position.side,
            "trailing stop"
        );

        if let Some(order) = position.stop_order.take() {
            self.cancel_quietly(venue, &order).await;
        }

        match venue
            .place_stop_market_order(
                &self.symbol,
                position.side.exit_order_side(),
                position.quantity,
                candidate,
            )
            .await
        {
            Ok(order) => {
                position.stop_order = Some(order);
                position.stop_loss = candidate;
                Ok(TradeState::Open(position))
            }
            Err(e) => {
                error!(
                    target: CRITICAL,
                    error = %e,
                    "stop replacement failed while trailing, force-closing"
                );
                match force_close(venue, &self.symbol, &position, ExitReason::TrailingFailure)
                    .await
                {
                    Ok(_) => Ok(TradeState::Flat),
                    Err(_) => Ok(TradeState::Open(position)),
                }
            }
        }
    }

    /// Retry the forced close of a position left unprotected by an earlier
    /// failure. Once per cycle keeps the retry naturally rate-limited.
    async fn retry_unprotected_close<V: Venue>(
        &self,
        venue: &V,
        position: OpenPosition,
    ) -> Result<TradeState, VenueError> {
        warn!("position is unprotected from a previous failure, retrying close");
        match force_close(venue, &self.symbol, &position, ExitReason::ProtectionFailure).await {
            Ok(_) => Ok(TradeState::Flat),
            Err(_) => Ok(TradeState::Open(position)),
        }
    }

    async fn cancel_quietly<V: Venue>(&self, venue: &V, order: &OrderRef) {
        match venue.cancel_order(order).await {
            Ok(_) | Err(VenueError::OrderNotFound(_)) => {}
            Err(e) => warn!(order = %order, error = %e, "cancel failed"),
        }
    }
}
